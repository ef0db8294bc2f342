//! Export run guard
//!
//! Provides a file-based lock so that two exports never write into the
//! same output directory at once.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::LOCK_FILE;
use crate::error::{Error, Result};

/// Lock guard that ensures exclusive access to an output directory.
pub struct ExportLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl ExportLock {
    /// Acquire an exclusive lock on `<output_dir>/.export.lock`.
    pub fn acquire(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                path,
            }),
            Err(_) => {
                tracing::error!(
                    "Another export is already writing to {}; wait for it to finish",
                    output_dir.display()
                );
                Err(Error::ExportLocked)
            }
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Drop for ExportLock {
    fn drop(&mut self) {
        self.release();
    }
}
