//! Typed, cached access to a directory of named config files.
//!
//! Each config lives in its own file, `<dir>/<name>.<extension>`. A
//! [`ConfigRegistry`] owns the directory and hands out one [`ConfigHandle`]
//! per name; the handle caches the decoded value, writes changes back
//! atomically, and is refreshed from disk by a background task.
//!
//! The file format is supplied by a [`Serializer`]. [`JsonSerializer`] and
//! [`TomlSerializer`] cover the common cases.
pub mod atomic;
pub mod config;
pub mod error;
pub mod handle;
pub mod options;
mod refresh;
pub mod registry;
pub mod serializer;

pub use config::{Config, RegisteredConfig};
pub use error::{Error as ConfigError, Result};
pub use handle::ConfigHandle;
pub use options::{RegistryOptions, RegistryOptionsBuilder};
pub use registry::ConfigRegistry;
pub use serializer::{JsonSerializer, Serializer, TomlSerializer};

// re-export derive macro
pub use confdir_macros::Config;

#[doc(hidden)]
pub use inventory;
