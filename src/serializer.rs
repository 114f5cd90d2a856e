//! Pluggable encode/decode strategies for config files.
//!
//! A [`Serializer`] decides three things for one config type: the file
//! extension, how the value is turned into bytes and back, and which value is
//! written when the file does not exist yet.
//!
//! Two implementations are provided: [`JsonSerializer`] and
//! [`TomlSerializer`]. Both use [`Default`] for the seed value unless a custom
//! one is supplied with `with_default`.
//!
//! # Example
//!
//! ```rust
//! use confdir::{JsonSerializer, Serializer};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Entry {
//!     id: u32,
//!     name: String,
//! }
//!
//! let serializer = JsonSerializer::with_default(|| {
//!     vec![Entry { id: 0, name: "aaa".into() }]
//! });
//!
//! let bytes = serializer.encode(&serializer.default_value()).unwrap();
//! assert_eq!(bytes, br#"[{"id":0,"name":"aaa"}]"#);
//! ```
use std::{fmt, marker::PhantomData, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::Error;

/// Encode/decode contract for the value type of one config.
pub trait Serializer: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    /// Extension used to derive the file name, without the leading dot.
    fn extension(&self) -> &str;

    /// Value written to a config file that does not exist yet.
    ///
    /// Produced lazily: the registry calls this only when it has to seed a
    /// missing file, and at most once per [`load`](crate::ConfigRegistry::load).
    fn default_value(&self) -> Self::Value;

    fn encode(&self, value: &Self::Value) -> Result<Vec<u8>, Error>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Value, Error>;
}

type DefaultFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// JSON files (`.json`), compact encoding.
pub struct JsonSerializer<T> {
    default: DefaultFn<T>,
    pretty: bool,
}

impl<T> JsonSerializer<T> {
    pub fn with_default(default: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            default: Arc::new(default),
            pretty: false,
        }
    }

    /// Encode with indentation.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

impl<T: Default + 'static> JsonSerializer<T> {
    pub fn new() -> Self {
        Self::with_default(T::default)
    }
}

impl<T: Default + 'static> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerializer<T> {
    fn clone(&self) -> Self {
        Self {
            default: Arc::clone(&self.default),
            pretty: self.pretty,
        }
    }
}

impl<T> fmt::Debug for JsonSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSerializer")
            .field("pretty", &self.pretty)
            .finish_non_exhaustive()
    }
}

impl<T> Serializer for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Value = T;

    fn extension(&self) -> &str {
        "json"
    }

    fn default_value(&self) -> T {
        (self.default)()
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, Error> {
        let bytes = match self.pretty {
            true => serde_json::to_vec_pretty(value)?,
            false => serde_json::to_vec(value)?,
        };
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// TOML files (`.toml`).
///
/// The value must serialize to a table; TOML has no top-level arrays or
/// scalars.
pub struct TomlSerializer<T> {
    default: DefaultFn<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TomlSerializer<T> {
    pub fn with_default(default: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            default: Arc::new(default),
            _marker: PhantomData,
        }
    }
}

impl<T: Default + 'static> TomlSerializer<T> {
    pub fn new() -> Self {
        Self::with_default(T::default)
    }
}

impl<T: Default + 'static> Default for TomlSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TomlSerializer<T> {
    fn clone(&self) -> Self {
        Self {
            default: Arc::clone(&self.default),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TomlSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TomlSerializer").finish_non_exhaustive()
    }
}

impl<T> Serializer for TomlSerializer<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Value = T;

    fn extension(&self) -> &str {
        "toml"
    }

    fn default_value(&self) -> T {
        (self.default)()
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, Error> {
        Ok(toml::to_string_pretty(value)?.into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, Error> {
        let text = std::str::from_utf8(bytes).map_err(Error::format)?;
        Ok(toml::from_str(text)?)
    }
}
