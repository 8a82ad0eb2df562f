// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storage_contracts::{StorageError, StorageResult};
use storage_types::{EncryptionParams, FilesystemType, MountOptions};

/// Seed of the reproducible overwrite pattern
pub const DEFAULT_PATTERN_SEED: u32 = 0x6a65_6272;

/// Block size used by the overwrite strategies
pub const DEFAULT_ERASE_BLOCK_SIZE: usize = 4096;

/// Attempts allowed per block before a zero overwrite gives up on short transfers
pub const DEFAULT_TRANSFER_ATTEMPTS: u32 = 32;

/// Tunables for a managed volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSettings {
    pub encryption: EncryptionParams,
    pub filesystem: FilesystemSettings,
    pub erase: EraseSettings,
}

impl VolumeSettings {
    pub fn validate(&self) -> StorageResult<()> {
        if self.erase.block_size == 0 {
            return Err(StorageError::internal("erase block size must be nonzero"));
        }
        if self.erase.transfer_attempts == 0 {
            return Err(StorageError::internal(
                "erase transfer attempts must be nonzero",
            ));
        }
        if self.encryption.key_size_bits == 0 || self.encryption.key_size_bits % 8 != 0 {
            return Err(StorageError::internal(format!(
                "invalid key size: {} bits",
                self.encryption.key_size_bits
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemSettings {
    /// Filesystem mounted on unlock until a format picks another
    pub fs_type: FilesystemType,

    /// Extra mkfs arguments per filesystem type
    pub mkfs_options: BTreeMap<FilesystemType, Vec<String>>,

    pub fsck_options: Vec<String>,

    pub mount: MountOptions,
}

impl FilesystemSettings {
    pub fn mkfs_options_for(&self, fs_type: FilesystemType) -> &[String] {
        self.mkfs_options
            .get(&fs_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl Default for FilesystemSettings {
    fn default() -> Self {
        // Initialize inode tables and journal up front so the first mount
        // does not kick off background writes.
        let lazy_init = vec![
            "-E".to_string(),
            "lazy_itable_init=0,lazy_journal_init=0".to_string(),
        ];
        let mut mkfs_options = BTreeMap::new();
        mkfs_options.insert(FilesystemType::Ext4, lazy_init.clone());
        mkfs_options.insert(FilesystemType::Ext3, lazy_init.clone());
        mkfs_options.insert(FilesystemType::Ext2, lazy_init);

        Self {
            fs_type: FilesystemType::Ext4,
            mkfs_options,
            fsck_options: vec!["-p".to_string()],
            mount: MountOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraseSettings {
    pub block_size: usize,
    pub transfer_attempts: u32,
    pub retry_delay_ms: u64,
    pub pattern_seed: u32,

    /// Refuse raw-device erase methods while the volume is unlocked
    pub require_locked_for_raw_erase: bool,
}

impl EraseSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for EraseSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_ERASE_BLOCK_SIZE,
            transfer_attempts: DEFAULT_TRANSFER_ATTEMPTS,
            retry_delay_ms: 1,
            pattern_seed: DEFAULT_PATTERN_SEED,
            require_locked_for_raw_erase: true,
        }
    }
}
