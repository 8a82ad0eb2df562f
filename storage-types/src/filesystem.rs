// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Filesystems the cleartext volume can be formatted with
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemType {
    #[default]
    Ext4,
    Ext3,
    Ext2,
    Xfs,
    Vfat,
}

impl FilesystemType {
    pub fn as_str(self) -> &'static str {
        match self {
            FilesystemType::Ext4 => "ext4",
            FilesystemType::Ext3 => "ext3",
            FilesystemType::Ext2 => "ext2",
            FilesystemType::Xfs => "xfs",
            FilesystemType::Vfat => "vfat",
        }
    }

    /// Name of the mkfs helper for this filesystem
    pub fn mkfs_command(self) -> String {
        format!("mkfs.{}", self.as_str())
    }
}

impl fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilesystemType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ext4" => Ok(FilesystemType::Ext4),
            "ext3" => Ok(FilesystemType::Ext3),
            "ext2" => Ok(FilesystemType::Ext2),
            "xfs" => Ok(FilesystemType::Xfs),
            "vfat" | "fat32" => Ok(FilesystemType::Vfat),
            other => Err(format!("unsupported filesystem type: {other}")),
        }
    }
}

/// Flags and data passed to the mount call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    pub read_only: bool,
    pub no_dev: bool,
    pub no_suid: bool,
    pub no_exec: bool,

    /// Filesystem-specific option string (e.g. "errors=remount-ro")
    pub data: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filesystem_names() {
        assert_eq!("EXT4".parse::<FilesystemType>(), Ok(FilesystemType::Ext4));
        assert_eq!("fat32".parse::<FilesystemType>(), Ok(FilesystemType::Vfat));
        assert!("ntfs".parse::<FilesystemType>().is_err());
    }

    #[test]
    fn mkfs_helper_name() {
        assert_eq!(FilesystemType::Xfs.mkfs_command(), "mkfs.xfs");
    }

    #[test]
    fn mount_options_default_from_empty_table() {
        let options: MountOptions = toml::from_str("").expect("parse empty options");
        assert_eq!(options, MountOptions::default());
    }
}
