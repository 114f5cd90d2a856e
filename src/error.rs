use std::path::PathBuf;

use thiserror::Error;

use crate::options::RegistryOptionsBuilderError;

/// Boxed source error carried by [`Error::Format`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The file content could not be decoded, or a value could not be encoded.
    ///
    /// Returned by [`Serializer::decode`](crate::Serializer::decode) and
    /// [`Serializer::encode`](crate::Serializer::encode). During
    /// [`ConfigHandle::validate`](crate::ConfigHandle::validate) this error is
    /// not propagated; the checker receives `None` instead.
    #[error("Format: {0}")]
    Format(#[source] BoxError),

    /// A path exists but is the wrong kind of filesystem entry.
    #[error("Invalid path `{}`: expected a {expected}", .path.display())]
    InvalidPath {
        path: PathBuf,
        expected: &'static str,
    },

    /// The config directory cannot be both read and written by this process.
    #[error("No read and write permissions for `{}`", .0.display())]
    Permission(PathBuf),

    /// A name was requested with a type other than the one it was first
    /// loaded with.
    #[error("Config `{name}` type mismatch: loaded as `{found}`, requested as `{expected}`")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// [`ConfigRegistry::get`](crate::ConfigRegistry::get) was called for a
    /// name that was never loaded.
    ///
    /// # How to Fix
    ///
    /// Call [`ConfigRegistry::load`](crate::ConfigRegistry::load) for the name
    /// first, usually right after building the registry.
    #[error("Config not loaded: {0}")]
    NotLoaded(String),

    /// Background refresh was requested outside of a tokio runtime.
    #[error("Refresh task requires a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Options: {0}")]
    Options(#[from] RegistryOptionsBuilderError),
}

impl Error {
    pub fn format(err: impl Into<BoxError>) -> Self {
        Error::Format(err.into())
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::format(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::format(err)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::format(err)
    }
}
