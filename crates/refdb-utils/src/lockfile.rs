use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// RAII guard for the lock-file update protocol.
///
/// Acquiring creates `<path>.lock` with O_CREAT|O_EXCL; the new content is
/// written into the lock file; `commit` fsyncs and atomically renames the
/// lock onto the target. Dropping an uncommitted guard removes the lock
/// file, leaving the target untouched.
pub struct LockFile {
    /// The file being replaced (no suffix).
    target: PathBuf,
    /// `<target>.lock`.
    lock_path: PathBuf,
    /// Open handle; `None` once committed or rolled back.
    inner: Option<File>,
}

impl LockFile {
    /// Take the lock for `target`, failing if another writer holds it.
    pub fn acquire(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let mut lock_os = target.clone().into_os_string();
        lock_os.push(LOCK_SUFFIX);
        let lock_path = PathBuf::from(lock_os);

        let inner = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    UtilError::Lock(LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    })
                } else {
                    UtilError::Lock(LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            })?;

        Ok(Self {
            target,
            lock_path,
            inner: Some(inner),
        })
    }

    /// The file this lock will replace on commit.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The `.lock` file itself.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, fsync, and rename the lock file onto the target.
    pub fn commit(mut self) -> Result<()> {
        let commit_err = |path: &Path, e: io::Error| {
            UtilError::Lock(LockError::Commit {
                path: path.to_path_buf(),
                source: e,
            })
        };

        if let Some(file) = self.inner.as_mut() {
            file.flush().map_err(|e| commit_err(&self.lock_path, e))?;
            file.sync_all().map_err(|e| commit_err(&self.lock_path, e))?;
        }
        // The handle must be closed before the rename on some platforms.
        self.inner.take();

        fs::rename(&self.lock_path, &self.target)
            .map_err(|e| commit_err(&self.lock_path, e))
    }

    /// Discard the lock without touching the target.
    pub fn rollback(mut self) -> Result<()> {
        self.inner.take();
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
