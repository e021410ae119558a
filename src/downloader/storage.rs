//! Scoped temporary storage for fetched bytes
//!
//! Each job owns at most one [`TempStorage`]. It is a temporary directory
//! that disappears when [`TempStorage::release`] is called or when the value
//! is dropped, whichever comes first. Release is idempotent: only the first
//! call removes anything.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const TEMP_PREFIX: &str = "media-relay-";

/// Exclusively owned temporary directory
#[derive(Debug)]
pub struct TempStorage {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl TempStorage {
    /// Allocate a fresh directory under `root` (system temp dir when `None`)
    pub fn allocate(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "Allocated temporary storage");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Directory path (stays valid as a value after release, but no longer exists)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory has been released
    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove everything inside the directory, keeping the directory itself
    pub fn clear(&self) -> io::Result<()> {
        if self.is_released() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Remove the directory and its contents
    ///
    /// Returns `true` on the call that actually released the storage,
    /// `false` on every later call.
    pub fn release(&mut self) -> bool {
        match self.dir.take() {
            Some(dir) => {
                if let Err(e) = dir.close() {
                    warn!(
                        error = %e,
                        path = %self.path.display(),
                        "Failed to remove temporary storage"
                    );
                } else {
                    debug!(path = %self.path.display(), "Released temporary storage");
                }
                true
            }
            None => false,
        }
    }
}
