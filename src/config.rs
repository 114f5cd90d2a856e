use crate::{error::Error, registry::ConfigRegistry, serializer::Serializer};

/// A Rust type bound to a config name and a stock serializer.
///
/// Usually implemented with `#[derive(Config)]`:
///
/// ```rust
/// use confdir::Config;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize, Config)]
/// #[config(name = "app", format = "toml")]
/// struct AppConfig {
///     name: String,
///     debug: bool,
/// }
///
/// fn main() {
///     assert_eq!(<AppConfig as confdir::Config>::NAME, "app");
/// }
/// ```
pub trait Config: Send + Sync + 'static {
    /// File name without extension.
    const NAME: &'static str;

    type Serializer: Serializer<Value = Self> + Default;
}

/// A statically declared config, collected with `inventory`.
pub struct RegisteredConfig {
    pub name: fn() -> &'static str,
    pub load: fn(&ConfigRegistry) -> Result<(), Error>,
}

impl RegisteredConfig {
    pub const fn new<T: Config>() -> Self {
        Self {
            name: || T::NAME,
            load: |registry| registry.load_config::<T>().map(|_| ()),
        }
    }
}

inventory::collect!(RegisteredConfig);

/// Declares a [`Config`] type so that
/// [`ConfigRegistry::load_registered`] picks it up.
///
/// `#[derive(Config)]` does this automatically.
#[macro_export]
macro_rules! submit_config {
    ($config_type:ty) => {
        $crate::inventory::submit! {
            $crate::RegisteredConfig::new::<$config_type>()
        }
    };
}
