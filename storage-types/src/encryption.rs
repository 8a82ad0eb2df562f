// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// On-disk LUKS header format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LuksVersion {
    Luks1,
    #[default]
    Luks2,
}

impl LuksVersion {
    /// Number of keyslots the header format provides
    pub fn max_keyslots(self) -> u32 {
        match self {
            LuksVersion::Luks1 => 8,
            LuksVersion::Luks2 => 32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LuksVersion::Luks1 => "luks1",
            LuksVersion::Luks2 => "luks2",
        }
    }
}

impl fmt::Display for LuksVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LuksVersion {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "luks1" | "1" => Ok(LuksVersion::Luks1),
            "luks2" | "2" => Ok(LuksVersion::Luks2),
            other => Err(format!("unknown LUKS version: {other}")),
        }
    }
}

/// State of a single keyslot as reported by the volume header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySlotStatus {
    /// Slot index is out of range or the header is unreadable
    Invalid,
    /// Slot is empty
    Inactive,
    Active,
    /// The only remaining active slot
    ActiveLast,
}

impl KeySlotStatus {
    /// Whether the slot holds key material that can be destroyed
    pub fn holds_key_material(self) -> bool {
        matches!(self, KeySlotStatus::Active | KeySlotStatus::ActiveLast)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySlot {
    pub index: u32,
    pub status: KeySlotStatus,
}

/// Cipher settings used when a new header is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionParams {
    pub cipher: String,
    pub cipher_mode: String,
    pub key_size_bits: u32,
    pub version: LuksVersion,
}

impl EncryptionParams {
    /// Cipher specification in the `cipher-mode` form the tooling expects
    pub fn cipher_spec(&self) -> String {
        format!("{}-{}", self.cipher, self.cipher_mode)
    }
}

impl Default for EncryptionParams {
    fn default() -> Self {
        Self {
            cipher: "aes".to_string(),
            cipher_mode: "xts-plain64".to_string(),
            key_size_bits: 512,
            version: LuksVersion::Luks2,
        }
    }
}
