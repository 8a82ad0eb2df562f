// SPDX-License-Identifier: GPL-3.0-only

//! Lifecycle of one encrypted volume
//!
//! A volume starts `Locked`. Formatting or unlocking it activates the LUKS
//! mapping and mounts the cleartext filesystem; locking reverses both. The
//! in-memory state only moves once every step of an operation has succeeded,
//! and steps already taken are undone newest first when a later one fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storage_contracts::{
    BlockDeviceIo, CryptoBackend, FilesystemBackend, OpenMode, StorageError, StorageResult,
};
use storage_types::{
    EraseReport, EraseRequest, FilesystemType, GeometryBounds, LockState, VolumeIdentity,
    VolumeMetadata,
};

use crate::bkops::{BackgroundOps, BkopsOutcome};
use crate::classify;
use crate::erase::EraseEngine;
use crate::ext_csd::read_ext_csd;
use crate::rollback::{Rollback, Undo};
use crate::settings::VolumeSettings;

/// Capabilities a volume is driven through
#[derive(Clone)]
pub struct Backends {
    pub crypto: Arc<dyn CryptoBackend>,
    pub filesystem: Arc<dyn FilesystemBackend>,
    pub block_io: Arc<dyn BlockDeviceIo>,
}

pub struct VolumeManager {
    identity: VolumeIdentity,
    state: LockState,
    bounds: GeometryBounds,
    metadata: VolumeMetadata,
    settings: VolumeSettings,
    fs_type: FilesystemType,
    backends: Backends,
    engine: EraseEngine,
}

impl VolumeManager {
    pub fn new(
        identity: VolumeIdentity,
        bounds: GeometryBounds,
        backends: Backends,
        settings: VolumeSettings,
    ) -> Self {
        let engine = EraseEngine::new(
            backends.block_io.clone(),
            backends.crypto.clone(),
            identity.device_path.clone(),
            bounds,
            settings.erase.clone(),
        );
        Self {
            fs_type: settings.filesystem.fs_type,
            identity,
            state: LockState::Locked,
            bounds,
            metadata: VolumeMetadata::default(),
            settings,
            backends,
            engine,
        }
    }

    pub fn with_metadata(mut self, metadata: VolumeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach to a volume whose state was observed outside this manager
    pub fn with_state(mut self, state: LockState) -> Self {
        self.state = state;
        self
    }

    /// Write a new LUKS header, create a filesystem on it and mount it
    pub fn format_luks(&mut self, password: &[u8], fs_type: FilesystemType) -> StorageResult<()> {
        self.require_state(LockState::Locked, "format")?;

        let device = self.identity.device_path.as_path();
        let name = self.identity.container_name.as_str();
        let crypto = self.backends.crypto.as_ref();
        tracing::info!(
            "Formatting {:?} as {} with {}",
            device,
            self.settings.encryption.version,
            fs_type
        );

        crypto
            .format(device, &self.settings.encryption)
            .map_err(|error| classify::internal("format volume header", error))?;
        crypto
            .keyslot_add_by_volume_key(device, password)
            .map_err(|error| classify::internal("add keyslot", error))?;
        crypto
            .load(device)
            .map_err(|error| classify::internal("load volume header", error))?;
        crypto
            .activate_by_passphrase(device, name, password)
            .map_err(|error| classify::internal("activate volume", error))?;

        let mut rollback = Rollback::default();
        rollback.push(Undo::Deactivate {
            name: name.to_string(),
        });

        let result = self
            .make_filesystem(fs_type)
            .and_then(|()| self.mount_filesystem(fs_type, &mut rollback));
        if let Err(error) = result {
            return Err(self.unwind(error, rollback));
        }

        self.fs_type = fs_type;
        self.state = LockState::Unlocked;
        tracing::info!(
            "Volume '{}' formatted and mounted at {:?}",
            self.identity.container_name,
            self.identity.mount_point
        );
        Ok(())
    }

    /// Unmount the filesystem, remove the mount point and close the mapping
    pub fn lock(&mut self) -> StorageResult<()> {
        self.require_state(LockState::Unlocked, "lock")?;

        let mount_point = self.identity.mount_point.as_path();
        let filesystem = self.backends.filesystem.as_ref();
        filesystem
            .unmount(mount_point)
            .map_err(|error| classify::internal("unmount", error))?;
        filesystem
            .remove_directory(mount_point)
            .map_err(|error| classify::internal("remove mount point", error))?;
        self.backends
            .crypto
            .deactivate(&self.identity.container_name)
            .map_err(|error| classify::internal("deactivate volume", error))?;

        self.state = LockState::Locked;
        tracing::info!("Volume '{}' locked", self.identity.container_name);
        Ok(())
    }

    /// Open the mapping with `password` and mount the existing filesystem
    pub fn unlock(&mut self, password: &[u8]) -> StorageResult<()> {
        self.require_state(LockState::Locked, "unlock")?;

        let device = self.identity.device_path.as_path();
        let name = self.identity.container_name.as_str();
        let crypto = self.backends.crypto.as_ref();
        crypto
            .load(device)
            .map_err(|error| classify::not_found("load volume header", error))?;
        let slot = crypto
            .activate_by_passphrase(device, name, password)
            .map_err(|error| classify::internal("activate volume", error))?;
        tracing::debug!("Volume '{}' opened with keyslot {}", name, slot);

        let mut rollback = Rollback::default();
        rollback.push(Undo::Deactivate {
            name: name.to_string(),
        });
        if let Err(error) = self.mount_filesystem(self.fs_type, &mut rollback) {
            return Err(self.unwind(error, rollback));
        }

        self.state = LockState::Unlocked;
        tracing::info!(
            "Volume '{}' unlocked at {:?}",
            self.identity.container_name,
            self.identity.mount_point
        );
        Ok(())
    }

    /// Replace the passphrase in the keyslot `old_password` opens
    pub fn change_password(&self, old_password: &[u8], new_password: &[u8]) -> StorageResult<()> {
        let device = self.identity.device_path.as_path();
        let crypto = self.backends.crypto.as_ref();
        crypto
            .load(device)
            .map_err(|error| classify::internal("load volume header", error))?;
        let slot = crypto
            .keyslot_change_by_passphrase(device, old_password, new_password)
            .map_err(|error| classify::internal("change passphrase", error))?;
        tracing::info!("Passphrase changed in keyslot {} of {:?}", slot, device);
        Ok(())
    }

    pub fn erase(&self, request: &EraseRequest) -> StorageResult<EraseReport> {
        let method = request.method();
        if method.writes_raw_device()
            && self.settings.erase.require_locked_for_raw_erase
            && !self.is_locked()
        {
            return Err(StorageError::invalid_state(format!(
                "{method} erase needs the volume locked"
            )));
        }
        self.engine.execute(request)
    }

    pub fn enable_background_ops(&self) -> StorageResult<BkopsOutcome> {
        BackgroundOps::new(
            self.backends.block_io.clone(),
            self.identity.device_path.clone(),
        )
        .enable()
    }

    /// Measure the device and read its wear estimate into the metadata
    pub fn refresh_metadata(&mut self) -> StorageResult<&VolumeMetadata> {
        let mut handle = self
            .backends
            .block_io
            .open(&self.identity.device_path, OpenMode::Read)
            .map_err(|error| classify::internal("open device", error))?;
        let capacity_bytes = handle
            .size_bytes()
            .map_err(|error| classify::internal("query device size", error))?;
        let ext_csd = read_ext_csd(handle.as_mut())
            .map_err(|error| classify::internal("read extended CSD", error))?;

        self.metadata.capacity_bytes = capacity_bytes;
        self.metadata.life_remaining_percent = ext_csd.life_remaining_percent();
        Ok(&self.metadata)
    }

    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn crypt_device_path(&self) -> PathBuf {
        self.identity.mapped_device_path()
    }

    pub fn mount_point(&self) -> &Path {
        &self.identity.mount_point
    }

    pub fn identity(&self) -> &VolumeIdentity {
        &self.identity
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.metadata
    }

    pub fn bounds(&self) -> GeometryBounds {
        self.bounds
    }

    pub fn fs_type(&self) -> FilesystemType {
        self.fs_type
    }

    fn require_state(&self, expected: LockState, operation: &str) -> StorageResult<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(StorageError::invalid_state(format!(
            "cannot {operation} volume '{}' while it is {:?}",
            self.identity.container_name, self.state
        )))
    }

    fn make_filesystem(&self, fs_type: FilesystemType) -> StorageResult<()> {
        let mapped = self.identity.mapped_device_path();
        let filesystem = self.backends.filesystem.as_ref();
        let options = &self.settings.filesystem;
        filesystem
            .run_mkfs(&mapped, fs_type, options.mkfs_options_for(fs_type))
            .map_err(|error| classify::internal("mkfs", error))?;
        filesystem
            .run_fsck(&mapped, fs_type, &options.fsck_options)
            .map_err(|error| classify::internal("fsck", error))
    }

    fn mount_filesystem(
        &self,
        fs_type: FilesystemType,
        rollback: &mut Rollback,
    ) -> StorageResult<()> {
        let mount_point = self.identity.mount_point.as_path();
        let filesystem = self.backends.filesystem.as_ref();
        if !filesystem.directory_exists(mount_point) {
            filesystem
                .create_directory(mount_point)
                .map_err(|error| classify::internal("create mount point", error))?;
            rollback.push(Undo::RemoveDirectory {
                path: mount_point.to_path_buf(),
            });
        }
        filesystem
            .mount(
                &self.identity.mapped_device_path(),
                mount_point,
                fs_type,
                &self.settings.filesystem.mount,
            )
            .map_err(|error| classify::internal("mount", error))
    }

    fn unwind(&self, error: StorageError, rollback: Rollback) -> StorageError {
        let failures = rollback.unwind(
            self.backends.crypto.as_ref(),
            self.backends.filesystem.as_ref(),
        );
        error.with_rollback(failures)
    }
}
