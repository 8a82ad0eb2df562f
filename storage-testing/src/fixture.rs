use std::path::{Path, PathBuf};
use std::sync::Arc;

use storage_types::{ExtCsd, GeometryBounds, VolumeIdentity};
use storage_volume::{Backends, VolumeManager, VolumeSettings};

use crate::fakes::{CallLog, DeviceRef, FakeCrypto, FakeFilesystem, MemoryBlockDevices};

pub const DEVICE_PATH: &str = "/dev/mmcblk0";
pub const CONTAINER_NAME: &str = "emmc_luks";
pub const MOUNT_POINT: &str = "/mnt/emmc_fs";

/// Fakes for one volume, sharing a call log
pub struct VolumeFixture {
    pub log: CallLog,
    pub crypto: Arc<FakeCrypto>,
    pub filesystem: Arc<FakeFilesystem>,
    pub devices: MemoryBlockDevices,
    pub device: DeviceRef,
    pub bounds: GeometryBounds,
}

impl VolumeFixture {
    /// A plain device of `size` bytes with bounds that accept exactly it
    pub fn new(size: usize) -> Self {
        Self::build(size, None, FakeCrypto::new, |filesystem| filesystem)
    }

    /// An eMMC device answering MMC commands from `ext_csd`
    pub fn emmc(size: usize, ext_csd: ExtCsd) -> Self {
        Self::build(size, Some(ext_csd), FakeCrypto::new, |filesystem| filesystem)
    }

    /// Customize the crypto fake before it is shared
    pub fn with_crypto(size: usize, configure: impl FnOnce(FakeCrypto) -> FakeCrypto) -> Self {
        Self::build(size, None, |log| configure(FakeCrypto::new(log)), |filesystem| {
            filesystem
        })
    }

    /// Start with the mount point already present
    pub fn with_existing_mount_point(size: usize) -> Self {
        Self::build(size, None, FakeCrypto::new, |filesystem| {
            filesystem.with_directory(MOUNT_POINT)
        })
    }

    fn build(
        size: usize,
        ext_csd: Option<ExtCsd>,
        crypto: impl FnOnce(CallLog) -> FakeCrypto,
        filesystem: impl FnOnce(FakeFilesystem) -> FakeFilesystem,
    ) -> Self {
        let log = CallLog::new();
        let devices = MemoryBlockDevices::new();
        let device = match ext_csd {
            Some(ext_csd) => devices.add_emmc(DEVICE_PATH, size, ext_csd),
            None => devices.add(DEVICE_PATH, size),
        };
        Self {
            crypto: Arc::new(crypto(log.clone())),
            filesystem: Arc::new(filesystem(FakeFilesystem::new(log.clone()))),
            log,
            devices,
            device,
            bounds: GeometryBounds::new(size as u64, size as u64),
        }
    }

    pub fn identity() -> VolumeIdentity {
        VolumeIdentity::new(DEVICE_PATH, CONTAINER_NAME, MOUNT_POINT)
    }

    pub fn mount_point() -> &'static Path {
        Path::new(MOUNT_POINT)
    }

    pub fn mapped_device() -> PathBuf {
        Self::identity().mapped_device_path()
    }

    pub fn backends(&self) -> Backends {
        Backends {
            crypto: self.crypto.clone(),
            filesystem: self.filesystem.clone(),
            block_io: Arc::new(self.devices.clone()),
        }
    }

    pub fn manager(&self) -> VolumeManager {
        self.manager_with(VolumeSettings::default())
    }

    pub fn manager_with(&self, settings: VolumeSettings) -> VolumeManager {
        VolumeManager::new(Self::identity(), self.bounds, self.backends(), settings)
    }

    /// A manager with the erase retry delay removed
    pub fn fast_manager(&self) -> VolumeManager {
        let mut settings = VolumeSettings::default();
        settings.erase.retry_delay_ms = 0;
        self.manager_with(settings)
    }
}
