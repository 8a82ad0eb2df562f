// SPDX-License-Identifier: GPL-3.0-only

//! One operation per volume at a time
//!
//! Processes are kept apart by an exclusive `flock` on `<lock_dir>/<name>.lock`;
//! threads of this process by the mutex around the manager.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use storage_contracts::{StorageError, StorageErrorKind};
use storage_volume::VolumeManager;

use crate::error::{Result, ServiceError};

/// Held for as long as an operation runs; dropping it releases the lock file
pub struct VolumeLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl VolumeLock {
    pub fn acquire(lock_dir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            if errno == Errno::EWOULDBLOCK {
                ServiceError::Storage(StorageError::new(
                    StorageErrorKind::Busy,
                    format!("volume '{name}' is in use by another process"),
                ))
            } else {
                ServiceError::Io(std::io::Error::from(errno))
            }
        })?;
        tracing::debug!("Acquired {:?}", path);
        Ok(Self { _lock: lock, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A manager shared between the runtime and the blocking pool
#[derive(Clone)]
pub struct SharedVolume {
    inner: Arc<Mutex<VolumeManager>>,
}

impl SharedVolume {
    pub fn new(manager: VolumeManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Claim the manager, failing with `Busy` while another operation holds it
    pub fn try_claim(&self) -> std::result::Result<MutexGuard<'_, VolumeManager>, StorageError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            // a panicked operation leaves the manager in its last committed state
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(StorageError::new(
                StorageErrorKind::Busy,
                "another operation on this volume is in progress",
            )),
        }
    }
}
