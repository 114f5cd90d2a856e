//! Registry of named config files in one directory.
//!
//! This module provides the [`ConfigRegistry`] type, which is the main entry
//! point for loading and accessing configuration files. The registry owns the
//! directory, one [`ConfigHandle`] per config name, and the background task
//! that keeps the cached values in sync with the files.
//!
//! # Overview
//!
//! The [`ConfigRegistry`]:
//!
//! - Creates its directory if needed and checks that it can read and write it
//! - Creates missing config files from the serializer's default value
//! - Hands out type-checked handles by name
//! - Re-reads every registered file on a fixed interval
//!
//! # Example
//!
//! ```rust,no_run
//! use confdir::{ConfigRegistry, JsonSerializer};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Debug, Default, Clone, Serialize, Deserialize)]
//! struct AppConfig {
//!     name: String,
//!     debug: bool,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Re-read every config file from disk every 30 seconds
//!     let registry = ConfigRegistry::new("./config", Duration::from_secs(30))?;
//!
//!     // Creates ./config/app.json with the default value if it is missing
//!     let app = registry.load("app", JsonSerializer::<AppConfig>::new())?;
//!     println!("App name: {}", app.cache().name);
//!
//!     // Anywhere else in the program
//!     let app = registry.get::<AppConfig>("app")?;
//!     app.modify(|cfg| {
//!         cfg.debug = true;
//!         Ok(())
//!     })?;
//!
//!     Ok(())
//! }
//! ```
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use parking_lot::RwLock;

use crate::{
    Config, RegisteredConfig,
    atomic::AtomicFile,
    error::{Error, Result},
    handle::{AnyHandle, ConfigHandle, downcast},
    options::RegistryOptions,
    refresh::RefreshTask,
    serializer::Serializer,
};

/// Owner of a config directory and every handle loaded from it.
///
/// # Lifecycle
///
/// 1. **Create**: [`new`](ConfigRegistry::new) or
///    [`with_options`](ConfigRegistry::with_options) prepare the directory
///    and start the refresh task
/// 2. **Load**: [`load`](ConfigRegistry::load) once per config name
/// 3. **Access**: [`get`](ConfigRegistry::get) from anywhere holding the
///    registry
/// 4. **Drop**: dropping the registry (or awaiting
///    [`shutdown`](ConfigRegistry::shutdown)) stops the refresh task
///
/// Handles already given out stay usable after the registry is gone; they are
/// simply no longer refreshed.
pub struct ConfigRegistry {
    inner: Arc<RegistryInner>,
    refresh: Option<RefreshTask>,
}

pub(crate) struct RegistryInner {
    /// Canonical path of the config directory.
    base_dir: PathBuf,

    refresh_interval: Duration,

    /// Map from config names to their type-erased handles.
    handles: RwLock<HashMap<String, Arc<dyn AnyHandle>>>,
}

impl ConfigRegistry {
    /// Creates a registry for `base_dir`, refreshing every `refresh_interval`.
    ///
    /// A zero interval disables background refresh. A non-zero interval
    /// requires a tokio runtime to be running.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPath`] if `base_dir` exists and is not a directory
    /// - [`Error::Permission`] if the directory cannot be read and written
    /// - [`Error::NoRuntime`] if refresh is enabled outside of tokio
    pub fn new(base_dir: impl AsRef<Path>, refresh_interval: Duration) -> Result<Self> {
        let options = RegistryOptions::builder()
            .base_dir(base_dir.as_ref())
            .refresh_interval(refresh_interval)
            .build()?;

        Self::with_options(options)
    }

    pub fn with_options(options: RegistryOptions) -> Result<Self> {
        let base_dir = prepare_dir(&options.base_dir)?;

        let inner = Arc::new(RegistryInner {
            base_dir,
            refresh_interval: options.refresh_interval,
            handles: RwLock::new(HashMap::new()),
        });

        let refresh = match options.refresh_enabled() {
            true => Some(RefreshTask::spawn(Arc::clone(&inner))?),
            false => None,
        };

        Ok(Self { inner, refresh })
    }

    pub fn base_dir(&self) -> &Path {
        &self.inner.base_dir
    }

    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    /// Loads the config `name`, creating its file if needed.
    ///
    /// The file lives at `<base_dir>/<name>.<extension>`. If it does not exist
    /// it is created containing the serializer's default value. The file is
    /// then read once and the handle is registered under `name`.
    ///
    /// Loading a name that is already registered returns the existing handle
    /// without touching the disk; `serializer` is dropped in that case.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if `name` was loaded with another value type
    /// - [`Error::InvalidPath`] if `name` is not a plain file name or the
    ///   config path is a directory
    /// - [`Error::Io`] / [`Error::Format`] if the initial read fails
    pub fn load<S: Serializer>(
        &self,
        name: &str,
        serializer: S,
    ) -> Result<Arc<ConfigHandle<S::Value>>> {
        self.inner.load::<S::Value>(name, Arc::new(serializer))
    }

    /// [`load`](Self::load) on tokio's blocking pool.
    pub async fn load_async<S: Serializer>(
        &self,
        name: &str,
        serializer: S,
    ) -> Result<Arc<ConfigHandle<S::Value>>> {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();

        tokio::task::spawn_blocking(move || inner.load::<S::Value>(&name, Arc::new(serializer)))
            .await?
    }

    /// Loads a config declared with [`Config`], using its stock serializer.
    pub fn load_config<C: Config>(&self) -> Result<Arc<ConfigHandle<C>>> {
        self.load(C::NAME, C::Serializer::default())
    }

    /// Loads every config declared with `#[derive(Config)]` or
    /// [`submit_config!`](crate::submit_config).
    ///
    /// Returns the first error encountered; configs loaded before it stay
    /// registered.
    pub fn load_registered(&self) -> Result<()> {
        for registration in inventory::iter::<RegisteredConfig> {
            let name = (registration.name)();
            tracing::debug!(name, "Loading registered config");
            (registration.load)(self)?;
        }

        Ok(())
    }

    /// Returns the handle registered under `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotLoaded`] if [`load`](Self::load) was never called for
    ///   `name`
    /// - [`Error::TypeMismatch`] if it was loaded with a different `T`
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<ConfigHandle<T>>> {
        let handles = self.inner.handles.read();
        let handle = handles
            .get(name)
            .ok_or_else(|| Error::NotLoaded(name.to_string()))?;

        downcast(handle)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.handles.read().contains_key(name)
    }

    /// Names of all loaded configs, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.handles.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-reads every registered config now.
    ///
    /// A failing config keeps its cached value and does not stop the others.
    /// The failures are returned by config name.
    pub fn refresh_all(&self) -> Vec<(String, Error)> {
        self.inner.refresh_all()
    }

    /// Stops the refresh task and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.refresh.take() {
            task.join().await;
        }
    }
}

impl Drop for ConfigRegistry {
    fn drop(&mut self) {
        if let Some(task) = self.refresh.take() {
            task.trigger();
        }
    }
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("base_dir", &self.inner.base_dir)
            .field("refresh_interval", &self.inner.refresh_interval)
            .field("names", &self.names())
            .finish()
    }
}

impl RegistryInner {
    pub(crate) fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub(crate) fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    fn load<T: Send + Sync + 'static>(
        &self,
        name: &str,
        serializer: Arc<dyn Serializer<Value = T>>,
    ) -> Result<Arc<ConfigHandle<T>>> {
        // Held across creation so that one name never gets two handles
        let mut handles = self.handles.write();

        if let Some(existing) = handles.get(name) {
            return downcast(existing);
        }

        let path = self.config_path(name, serializer.extension())?;

        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {
                tracing::error!(path = %path.display(), "Config path is a directory, expects a file");
                return Err(Error::InvalidPath {
                    path,
                    expected: "file",
                });
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file does not exist, creating");
                let bytes = serializer.encode(&serializer.default_value())?;
                AtomicFile::new(&path).write(&bytes)?;
            }
            Err(err) => return Err(err.into()),
        }

        let handle = Arc::new(ConfigHandle::open(name, path, serializer)?);
        handles.insert(name.to_string(), Arc::clone(&handle) as Arc<dyn AnyHandle>);

        Ok(handle)
    }

    fn config_path(&self, name: &str, extension: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.chars().any(std::path::is_separator);

        if !plain {
            return Err(Error::InvalidPath {
                path: self.base_dir.join(name),
                expected: "plain config name",
            });
        }

        Ok(self.base_dir.join(format!("{name}.{extension}")))
    }

    pub(crate) fn refresh_all(&self) -> Vec<(String, Error)> {
        // Snapshot so file I/O happens without holding the map lock
        let handles: Vec<_> = self.handles.read().values().cloned().collect();

        handles
            .into_iter()
            .filter_map(|handle| match handle.refresh() {
                Ok(()) => None,
                Err(err) => {
                    tracing::warn!(
                        name = handle.name(),
                        error = %err,
                        "Failed to refresh config, keeping cached value"
                    );
                    Some((handle.name().to_string(), err))
                }
            })
            .collect()
    }
}

/// Makes sure `dir` exists, is a directory, and is readable and writable.
///
/// Returns its canonical path.
fn prepare_dir(dir: &Path) -> Result<PathBuf> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            tracing::error!(path = %dir.display(), "Config path is a file, expects a directory");
            return Err(Error::InvalidPath {
                path: dir.to_path_buf(),
                expected: "directory",
            });
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %dir.display(), "Config directory does not exist, creating");
            fs::create_dir_all(dir)?;
        }
        Err(err) => return Err(err.into()),
    }

    let readable = fs::read_dir(dir).is_ok();
    let writable = tempfile::tempfile_in(dir).is_ok();

    if !(readable && writable) {
        tracing::error!(path = %dir.display(), "No read and write permissions for config directory");
        return Err(Error::Permission(dir.to_path_buf()));
    }

    Ok(dir.canonicalize()?)
}
