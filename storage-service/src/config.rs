// SPDX-License-Identifier: GPL-3.0-only

//! Service configuration
//!
//! ```toml
//! lock_dir = "/run/emmc-storage"
//!
//! [volume]
//! device_path = "/dev/mmcblk0"
//! container_name = "emmc_luks"
//! mount_point = "/mnt/emmc_fs"
//! min_bytes = 15634268160
//! max_bytes = 15636365312
//!
//! [settings.erase]
//! transfer_attempts = 32
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storage_types::{GeometryBounds, VolumeIdentity, VolumeMetadata};
use storage_volume::VolumeSettings;

use crate::error::{Result, ServiceError};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/emmc-storage/volume.toml";
pub const DEFAULT_LOCK_DIR: &str = "/run/emmc-storage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub volume: VolumeConfig,

    #[serde(default)]
    pub settings: VolumeSettings,

    /// Directory holding the per-volume lock files
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOCK_DIR)
}

fn default_container_name() -> String {
    "emmc_luks".to_string()
}

fn default_mount_point() -> PathBuf {
    PathBuf::from("/mnt/emmc_fs")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub device_path: PathBuf,

    #[serde(default = "default_container_name")]
    pub container_name: String,

    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,

    pub min_bytes: u64,
    pub max_bytes: u64,

    #[serde(default)]
    pub part_number: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ServiceError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.bounds().is_valid() {
            return Err(ServiceError::ConfigInvalid(format!(
                "min_bytes ({}) exceeds max_bytes ({})",
                self.volume.min_bytes, self.volume.max_bytes
            )));
        }
        if self.volume.container_name.is_empty() || self.volume.container_name.contains('/') {
            return Err(ServiceError::ConfigInvalid(format!(
                "invalid container name '{}'",
                self.volume.container_name
            )));
        }
        self.settings
            .validate()
            .map_err(|e| ServiceError::ConfigInvalid(e.message))
    }

    pub fn identity(&self) -> VolumeIdentity {
        VolumeIdentity::new(
            self.volume.device_path.clone(),
            self.volume.container_name.clone(),
            self.volume.mount_point.clone(),
        )
    }

    pub fn bounds(&self) -> GeometryBounds {
        GeometryBounds::new(self.volume.min_bytes, self.volume.max_bytes)
    }

    pub fn metadata(&self) -> VolumeMetadata {
        VolumeMetadata {
            part_number: self.volume.part_number.clone(),
            serial_number: self.volume.serial_number.clone(),
            ..VolumeMetadata::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[volume]
device_path = "/dev/mmcblk0"
min_bytes = 1024
max_bytes = 4096
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = ServiceConfig::from_toml_str(MINIMAL).expect("parse config");
        assert_eq!(config.volume.container_name, "emmc_luks");
        assert_eq!(config.volume.mount_point, PathBuf::from("/mnt/emmc_fs"));
        assert_eq!(config.lock_dir, PathBuf::from(DEFAULT_LOCK_DIR));
        assert_eq!(config.settings, VolumeSettings::default());
        assert_eq!(
            config.identity().mapped_device_path(),
            PathBuf::from("/dev/mapper/emmc_luks")
        );
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let raw = MINIMAL.replace("min_bytes = 1024", "min_bytes = 8192");
        let err = ServiceConfig::from_toml_str(&raw).expect_err("bounds inverted");
        assert!(matches!(err, ServiceError::ConfigInvalid(_)));
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let raw = format!("{MINIMAL}\n[settings.erase]\ntransfer_attempts = 0\n");
        assert!(ServiceConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn missing_device_is_a_parse_error() {
        let err = ServiceConfig::from_toml_str("[volume]\nmin_bytes = 1\nmax_bytes = 2\n")
            .expect_err("device_path is required");
        assert!(matches!(err, ServiceError::ConfigInvalid(_)));
    }
}
