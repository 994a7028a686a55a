//! Per-package lock management
//!
//! Two invocations building the same package would race on its markers and
//! directories, so each pipeline run holds an exclusive lock on
//! `{root}/{name}.lock` for its whole duration. The lock is advisory (flock)
//! and is released by the kernel when the holder exits, so the lock file is
//! left in place. Unlinking it would let a waiter lock an orphaned inode while
//! a third process creates and locks a fresh file at the same path.

use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error(
        "package '{name}' is already being built by another process (lock: {})",
        path.display()
    )]
    Busy { name: String, path: PathBuf },

    #[error("cannot create lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Acquire the exclusive lock for `name` at `lock_path`.
///
/// Returns a guard that releases the lock when dropped.
pub fn acquire_package_lock(name: &str, lock_path: &Path) -> Result<PackageLock, LockError> {
    let io_err = |source| LockError::Io {
        path: lock_path.to_path_buf(),
        source,
    };

    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let lock_file = File::create(lock_path).map_err(io_err)?;

    if lock_file.try_lock_exclusive().is_err() {
        return Err(LockError::Busy {
            name: name.to_string(),
            path: lock_path.to_path_buf(),
        });
    }

    Ok(PackageLock { _file: lock_file })
}

/// RAII guard for a package lock
#[derive(Debug)]
pub struct PackageLock {
    _file: File,
}
