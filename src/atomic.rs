use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use tempfile::NamedTempFile;

/// Advisory lock on the sidecar file next to a config file.
///
/// The target itself is replaced by rename on every write, so locking it
/// would lock a different inode each time. The sidecar is never replaced.
struct FileLock {
    _file: File,
}

impl FileLock {
    fn open(lock_path: &Path) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
    }

    fn exclusive(lock_path: &Path) -> std::io::Result<Self> {
        let file = Self::open(lock_path)?;

        // Blocks until exclusive lock is acquired
        file.lock_exclusive()?;

        Ok(Self { _file: file })
    }

    fn shared(lock_path: &Path) -> std::io::Result<Self> {
        let file = Self::open(lock_path)?;
        file.lock_shared()?;

        Ok(Self { _file: file })
    }
}

/// A file whose contents are only ever replaced as a whole.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader sees either the old or the new contents and
/// never a mix of both. Writers and readers in different processes
/// coordinate through a hidden `.<file name>.lock` next to the target; a read
/// waits for a write in progress.
#[derive(Debug, Clone)]
pub struct AtomicFile {
    path: PathBuf,
    lock_path: PathBuf,
}

impl AtomicFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let mut lock_name = OsString::from(".");
        lock_name.push(path.file_name().unwrap_or_default());
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        let _lock = FileLock::shared(&self.lock_path)?;

        let mut file = OpenOptions::new().read(true).open(&self.path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        Ok(buf)
    }

    /// Replaces the file with `contents`.
    ///
    /// The target is only created by the final rename; a failed write leaves
    /// no file behind.
    pub fn write(&self, contents: &[u8]) -> std::io::Result<()> {
        let _lock = FileLock::exclusive(&self.lock_path)?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;

        tmp.write_all(contents)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;

        tmp.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}
