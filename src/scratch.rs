use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Owner of the scratch directory for one invocation.
///
/// Construction does not touch the filesystem. The directory is created by
/// [`Scratch::reset`] when a transition needs it, and removed again by
/// [`Scratch::release`] or, failing that, on drop.
#[derive(Debug)]
pub struct Scratch {
    path: PathBuf,
    keep: Cell<bool>,
}

impl Scratch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: Cell::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Drop stale leftovers from an earlier run and create an empty directory.
    pub fn reset(&self) -> Result<()> {
        self.clear()
            .map_err(|e| Error::fs("clear scratch directory", &self.path, e))?;
        fs::create_dir_all(&self.path)
            .map_err(|e| Error::fs("create scratch directory", &self.path, e))
    }

    /// Remove the scratch directory. Absence is not an error.
    pub fn clear(&self) -> io::Result<()> {
        match fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&self.path),
            Ok(_) => fs::remove_file(&self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stop [`Scratch::release`] from deleting the directory for this invocation.
    ///
    /// Used when the scratch directory holds the only copy of an installation.
    pub fn keep(&self) {
        self.keep.set(true);
    }

    /// Clear and log instead of failing; used on every exit path.
    pub fn release(&self) {
        if self.keep.get() {
            log::warn!("leaving scratch directory {} in place", self.path.display());
            return;
        }
        if let Err(e) = self.clear() {
            log::warn!(
                "could not remove scratch directory {}: {e}",
                self.path.display()
            );
        }
    }

    /// True when the directory is missing or has no entries.
    pub fn is_clean(&self) -> bool {
        match fs::read_dir(&self.path) {
            Ok(mut rd) => rd.next().is_none(),
            Err(_) => !self.path.exists(),
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        self.release();
    }
}
