//! A single named config file and its cached value.
//!
//! A [`ConfigHandle`] is created by
//! [`ConfigRegistry::load`](crate::ConfigRegistry::load) and shared as an
//! `Arc`. The cached value can be read at any time without I/O via
//! [`cache`](ConfigHandle::cache); everything else touches the file.
//!
//! # Concurrency
//!
//! The cache is an [`ArcSwap`], so a reader always gets a complete previous
//! or new value. File operations on one handle (`read_now`, `write_now`,
//! `validate`, `modify` and the registry's refresh ticks) are serialized by a
//! per-handle lock. A refresh tick therefore never lands between the read and
//! the write of a `validate` or `modify`.
//!
//! The lock is not reentrant. The callbacks given to `validate` and `modify`
//! run while it is held, so they must not call `read_now`, `write_now`,
//! `validate` or `modify` on the same handle; doing so deadlocks. Reading
//! [`cache`](ConfigHandle::cache) from a callback is fine.
use std::{
    any::Any,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::{
    atomic::AtomicFile,
    error::{Error, Result},
    serializer::Serializer,
};

/// In-memory view of one config file.
pub struct ConfigHandle<T: Send + Sync + 'static> {
    name: String,
    file: AtomicFile,
    serializer: Arc<dyn Serializer<Value = T>>,
    cache: ArcSwap<T>,
    io_lock: Mutex<()>,
}

impl<T: Send + Sync + 'static> ConfigHandle<T> {
    /// Opens an existing file and performs the initial read.
    pub(crate) fn open(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        serializer: Arc<dyn Serializer<Value = T>>,
    ) -> Result<Self> {
        let file = AtomicFile::new(path);
        let initial = decode_file(&file, serializer.as_ref())?;

        Ok(Self {
            name: name.into(),
            file,
            serializer,
            cache: ArcSwap::from_pointee(initial),
            io_lock: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Last value read from or written to the file.
    pub fn cache(&self) -> Arc<T> {
        self.cache.load_full()
    }

    /// Reads the file now and replaces the cache with its contents.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Format`] if the contents cannot be decoded
    ///
    /// The cache is left untouched on error.
    pub fn read_now(&self) -> Result<Arc<T>> {
        let _guard = self.io_lock.lock();
        self.read_locked()
    }

    /// Writes `value` to the file and makes it the cached value.
    ///
    /// The file is replaced as a whole. If encoding or writing fails, neither
    /// the file nor the cache change.
    pub fn write_now(&self, value: T) -> Result<Arc<T>> {
        let _guard = self.io_lock.lock();
        self.write_locked(value)
    }

    /// Checks the current file contents and repairs them if needed.
    ///
    /// `checker` receives the freshly read value, or `None` if the file could
    /// not be read or decoded. Returning `None` accepts the config as it is;
    /// returning `Some(fixed)` writes `fixed` back.
    ///
    /// Returns whether a repaired value was written.
    ///
    /// `checker` runs under the handle's I/O lock and must not call back into
    /// file operations of this handle.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use confdir::{ConfigRegistry, JsonSerializer};
    /// # use std::time::Duration;
    /// # fn main() -> Result<(), confdir::ConfigError> {
    /// let registry = ConfigRegistry::new("./config", Duration::ZERO)?;
    /// let ports = registry.load("ports", JsonSerializer::<Vec<u16>>::new())?;
    ///
    /// ports.validate(|current| match current {
    ///     Some(ports) if !ports.is_empty() => None,
    ///     _ => Some(vec![8080]),
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn validate<F>(&self, checker: F) -> Result<bool>
    where
        F: FnOnce(Option<&T>) -> Option<T>,
    {
        let _guard = self.io_lock.lock();

        let current = match self.read_locked() {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(
                    name = %self.name,
                    error = %err,
                    "Current config unavailable, passing none to checker"
                );
                None
            }
        };

        match checker(current.as_deref()) {
            None => Ok(false),
            Some(fixed) => {
                tracing::info!(name = %self.name, "Config failed validation, writing corrected value");
                self.write_locked(fixed)?;
                Ok(true)
            }
        }
    }

    /// Applies `f` to a copy of the cached value and persists the result.
    ///
    /// If `f` returns an error nothing is written and the cache keeps its old
    /// value. Like the checker of [`validate`](Self::validate), `f` runs under
    /// the handle's I/O lock.
    pub fn modify<F>(&self, f: F) -> Result<Arc<T>>
    where
        T: Clone,
        F: FnOnce(&mut T) -> Result<()>,
    {
        let _guard = self.io_lock.lock();

        let mut value = T::clone(&self.cache.load());
        f(&mut value)?;

        self.write_locked(value)
    }

    /// [`read_now`](Self::read_now) on tokio's blocking pool.
    pub async fn read_async(self: &Arc<Self>) -> Result<Arc<T>> {
        let handle = Arc::clone(self);
        tokio::task::spawn_blocking(move || handle.read_now()).await?
    }

    /// [`write_now`](Self::write_now) on tokio's blocking pool.
    pub async fn write_async(self: &Arc<Self>, value: T) -> Result<Arc<T>> {
        let handle = Arc::clone(self);
        tokio::task::spawn_blocking(move || handle.write_now(value)).await?
    }

    /// [`validate`](Self::validate) on tokio's blocking pool.
    pub async fn validate_async<F>(self: &Arc<Self>, checker: F) -> Result<bool>
    where
        F: FnOnce(Option<&T>) -> Option<T> + Send + 'static,
    {
        let handle = Arc::clone(self);
        tokio::task::spawn_blocking(move || handle.validate(checker)).await?
    }

    fn read_locked(&self) -> Result<Arc<T>> {
        tracing::debug!(path = %self.path().display(), "Load data");

        let value = Arc::new(decode_file(&self.file, self.serializer.as_ref())?);
        self.cache.store(Arc::clone(&value));

        Ok(value)
    }

    fn write_locked(&self, value: T) -> Result<Arc<T>> {
        tracing::debug!(path = %self.path().display(), "Save data");

        let bytes = self.serializer.encode(&value)?;
        self.file.write(&bytes)?;

        let value = Arc::new(value);
        self.cache.store(Arc::clone(&value));

        Ok(value)
    }
}

fn decode_file<T: Send + Sync + 'static>(
    file: &AtomicFile,
    serializer: &dyn Serializer<Value = T>,
) -> Result<T> {
    let bytes = file.read()?;
    serializer.decode(&bytes)
}

impl<T: Send + Sync + 'static> fmt::Debug for ConfigHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("name", &self.name)
            .field("path", &self.file.path())
            .field("type", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a [`ConfigHandle`], as stored by the registry.
pub(crate) trait AnyHandle: Send + Sync {
    fn name(&self) -> &str;
    fn type_name(&self) -> &'static str;
    fn refresh(&self) -> Result<()>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> AnyHandle for ConfigHandle<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn refresh(&self) -> Result<()> {
        self.read_now().map(|_| ())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Recovers the typed handle behind `handle`, or reports which type it holds.
pub(crate) fn downcast<T: Send + Sync + 'static>(
    handle: &Arc<dyn AnyHandle>,
) -> Result<Arc<ConfigHandle<T>>> {
    Arc::clone(handle)
        .into_any()
        .downcast::<ConfigHandle<T>>()
        .map_err(|_| Error::TypeMismatch {
            name: handle.name().to_string(),
            expected: std::any::type_name::<T>(),
            found: handle.type_name(),
        })
}
