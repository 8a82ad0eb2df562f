// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory the device mapper exposes activated mappings under
pub const DEVICE_MAPPER_DIR: &str = "/dev/mapper";

/// Lifecycle state of an encrypted volume
///
/// `Unlocked` means the mapping is active and the filesystem is mounted;
/// `Locked` means neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Locked,
    Unlocked,
}

impl LockState {
    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }
}

/// Where a volume lives: the raw device, its mapping name and its mount point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeIdentity {
    /// Raw block device holding the LUKS header (e.g. "/dev/mmcblk0")
    pub device_path: PathBuf,

    /// Device-mapper name of the opened volume (e.g. "emmc_luks")
    pub container_name: String,

    /// Directory the cleartext filesystem is mounted on
    pub mount_point: PathBuf,
}

impl VolumeIdentity {
    pub fn new(
        device_path: impl Into<PathBuf>,
        container_name: impl Into<String>,
        mount_point: impl Into<PathBuf>,
    ) -> Self {
        Self {
            device_path: device_path.into(),
            container_name: container_name.into(),
            mount_point: mount_point.into(),
        }
    }

    /// Path of the cleartext device once the mapping is active
    pub fn mapped_device_path(&self) -> PathBuf {
        Path::new(DEVICE_MAPPER_DIR).join(&self.container_name)
    }
}

/// Descriptive data about the physical part
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    /// Raw capacity in bytes, zero until measured
    #[serde(default)]
    pub capacity_bytes: u64,

    /// Estimated remaining life (0-100), when the device reports it
    #[serde(default)]
    pub life_remaining_percent: Option<u8>,

    #[serde(default)]
    pub part_number: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,
}
