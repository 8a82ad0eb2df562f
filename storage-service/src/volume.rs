// SPDX-License-Identifier: GPL-3.0-only

//! Requests the service runs against its volume

use std::sync::Arc;

use serde::Serialize;
use storage_contracts::StorageResult;
use storage_sys::{CryptsetupCli, SystemBlockDevices, SystemFilesystem};
use storage_types::{
    EraseReport, EraseRequest, FilesystemType, GeometryBounds, LockState, VolumeIdentity,
    VolumeMetadata,
};
use storage_volume::{Backends, BkopsOutcome, VolumeManager};
use zeroize::Zeroizing;

use crate::config::ServiceConfig;
use crate::error::Result;

pub type Secret = Zeroizing<Vec<u8>>;

pub enum Request {
    Status,
    Format {
        password: Secret,
        fs_type: FilesystemType,
    },
    Unlock {
        password: Secret,
    },
    Lock,
    ChangePassword {
        old_password: Secret,
        new_password: Secret,
    },
    Erase(EraseRequest),
    Bkops,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Status => "status",
            Request::Format { .. } => "format",
            Request::Unlock { .. } => "unlock",
            Request::Lock => "lock",
            Request::ChangePassword { .. } => "change-password",
            Request::Erase(_) => "erase",
            Request::Bkops => "bkops",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VolumeStatus {
    pub identity: VolumeIdentity,
    pub state: LockState,
    pub bounds: GeometryBounds,
    pub fs_type: FilesystemType,
    pub metadata: VolumeMetadata,
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Status(VolumeStatus),
    State { state: LockState },
    PasswordChanged,
    Erased(EraseReport),
    Bkops { already_enabled: bool },
}

/// Attach to the configured volume with the system backends
///
/// The lock state is taken from the device mapper: a present mapping means
/// the volume was left unlocked by an earlier run.
pub fn open_volume(config: &ServiceConfig) -> Result<VolumeManager> {
    let backends = Backends {
        crypto: Arc::new(CryptsetupCli::new()?),
        filesystem: Arc::new(SystemFilesystem::new()),
        block_io: Arc::new(SystemBlockDevices::new()),
    };
    let identity = config.identity();
    let state = if identity.mapped_device_path().exists() {
        LockState::Unlocked
    } else {
        LockState::Locked
    };
    tracing::debug!("Volume '{}' attached {:?}", identity.container_name, state);

    Ok(
        VolumeManager::new(identity, config.bounds(), backends, config.settings.clone())
            .with_metadata(config.metadata())
            .with_state(state),
    )
}

pub fn execute(manager: &mut VolumeManager, request: Request) -> StorageResult<Outcome> {
    match request {
        Request::Status => {
            if let Err(e) = manager.refresh_metadata() {
                tracing::warn!("Device health unavailable: {}", e);
            }
            Ok(Outcome::Status(VolumeStatus {
                identity: manager.identity().clone(),
                state: manager.state(),
                bounds: manager.bounds(),
                fs_type: manager.fs_type(),
                metadata: manager.metadata().clone(),
            }))
        }
        Request::Format { password, fs_type } => {
            manager.format_luks(&password, fs_type)?;
            Ok(Outcome::State {
                state: manager.state(),
            })
        }
        Request::Unlock { password } => {
            manager.unlock(&password)?;
            Ok(Outcome::State {
                state: manager.state(),
            })
        }
        Request::Lock => {
            manager.lock()?;
            Ok(Outcome::State {
                state: manager.state(),
            })
        }
        Request::ChangePassword {
            old_password,
            new_password,
        } => {
            manager.change_password(&old_password, &new_password)?;
            Ok(Outcome::PasswordChanged)
        }
        Request::Erase(request) => manager.erase(&request).map(Outcome::Erased),
        Request::Bkops => manager.enable_background_ops().map(|outcome| Outcome::Bkops {
            already_enabled: outcome == BkopsOutcome::AlreadyEnabled,
        }),
    }
}
