use std::{path::PathBuf, time::Duration};

use derive_builder::Builder;

/// How often registered configs are re-read when nothing else is specified.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Settings for a [`ConfigRegistry`](crate::ConfigRegistry).
///
/// ```rust
/// use confdir::RegistryOptions;
/// use std::time::Duration;
///
/// let options = RegistryOptions::builder()
///     .base_dir("./config")
///     .refresh_interval(Duration::from_secs(30))
///     .build()
///     .unwrap();
///
/// assert_eq!(options.refresh_interval, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into))]
pub struct RegistryOptions {
    /// Directory holding every managed config file. Created if missing.
    pub base_dir: PathBuf,

    /// Time between background refreshes. [`Duration::ZERO`] disables them.
    #[builder(default = "DEFAULT_REFRESH_INTERVAL")]
    pub refresh_interval: Duration,
}

impl RegistryOptions {
    pub fn builder() -> RegistryOptionsBuilder {
        RegistryOptionsBuilder::default()
    }

    pub fn refresh_enabled(&self) -> bool {
        !self.refresh_interval.is_zero()
    }
}
