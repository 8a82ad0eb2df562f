// SPDX-License-Identifier: GPL-3.0-only

//! LUKS backend driving the `cryptsetup` tool
//!
//! cryptsetup cannot write a header without a keyslot, so `format` only
//! records the parameters and the header is written together with the first
//! keyslot in `keyslot_add_by_volume_key`.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use storage_contracts::{BackendError, BackendResult, CryptoBackend};
use storage_types::{EncryptionParams, KeySlotStatus, LuksVersion};
use zeroize::Zeroizing;

use crate::command::{self, ToolOutput};
use crate::error::{Result, SysError};

const PROGRAM: &str = "cryptsetup";

pub struct CryptsetupCli {
    binary: PathBuf,
    /// Parameters of headers awaiting their first keyslot, by device
    pending: Mutex<HashMap<PathBuf, EncryptionParams>>,
}

impl CryptsetupCli {
    pub fn new() -> Result<Self> {
        let binary = command::find_tool(PROGRAM)?;
        tracing::info!("Found cryptsetup binary at {:?}", binary);
        Ok(Self::with_binary(binary))
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn run(&self, args: &[&str], input: Option<&[u8]>) -> Result<ToolOutput> {
        command::run_checked(&self.binary, args, input)
    }

    /// `isLuks` exits nonzero when the device carries no LUKS header
    fn ensure_header(&self, device: &Path) -> Result<()> {
        let device_arg = path_arg(device)?;
        let output = command::run(&self.binary, ["isLuks", device_arg], None)?;
        if output.success() {
            Ok(())
        } else {
            tracing::debug!("{:?} has no LUKS header", device);
            Err(SysError::DeviceNotFound(format!(
                "no LUKS header on {}",
                device.display()
            )))
        }
    }

    fn dump(&self, device: &Path) -> Result<LuksDump> {
        let device = path_arg(device)?;
        let output = self.run(&["luksDump", device], None)?;
        parse_luks_dump(&output.stdout).ok_or_else(|| SysError::Parse {
            program: PROGRAM.to_string(),
            message: format!("cannot read luksDump of {device}"),
        })
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| SysError::OperationFailed(format!("non UTF-8 path {path:?}")))
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(SysError::DeviceNotFound(path.display().to_string()))
    }
}

impl CryptoBackend for CryptsetupCli {
    fn format(&self, device: &Path, params: &EncryptionParams) -> BackendResult<()> {
        ensure_exists(device).map_err(|e| e.into_backend("format"))?;
        tracing::debug!("Staging {} header for {:?}", params.version, device);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.to_path_buf(), params.clone());
        Ok(())
    }

    fn keyslot_add_by_volume_key(&self, device: &Path, passphrase: &[u8]) -> BackendResult<u32> {
        let params = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(device)
            .ok_or_else(|| {
                BackendError::failed(
                    "keyslot_add_by_volume_key",
                    "no volume key available: format the device first",
                )
            })?;

        let device_arg =
            path_arg(device).map_err(|e| e.into_backend("keyslot_add_by_volume_key"))?;
        let cipher = params.cipher_spec();
        let key_size = params.key_size_bits.to_string();
        self.run(
            &[
                "luksFormat",
                "--batch-mode",
                "--type",
                params.version.as_str(),
                "--cipher",
                &cipher,
                "--key-size",
                &key_size,
                "--key-slot",
                "0",
                "--key-file",
                "-",
                device_arg,
            ],
            Some(passphrase),
        )
        .map_err(|e| e.into_backend("keyslot_add_by_volume_key"))?;
        Ok(0)
    }

    fn load(&self, device: &Path) -> BackendResult<LuksVersion> {
        ensure_exists(device).map_err(|e| e.into_backend("load"))?;
        self.ensure_header(device)
            .map_err(|e| e.into_backend("load"))?;
        self.dump(device)
            .map(|dump| dump.version)
            .map_err(|e| e.into_backend("load"))
    }

    fn activate_by_passphrase(
        &self,
        device: &Path,
        name: &str,
        passphrase: &[u8],
    ) -> BackendResult<u32> {
        let device_arg = path_arg(device).map_err(|e| e.into_backend("activate_by_passphrase"))?;
        let output = self
            .run(
                &["open", "--verbose", "--type", "luks", "--key-file", "-", device_arg, name],
                Some(passphrase),
            )
            .map_err(|e| e.into_backend("activate_by_passphrase"))?;
        Ok(reported_slot(&output, "unlocked").unwrap_or(0))
    }

    fn deactivate(&self, name: &str) -> BackendResult<()> {
        self.run(&["close", name], None)
            .map(drop)
            .map_err(|e| e.into_backend("deactivate"))
    }

    fn keyslot_destroy(&self, device: &Path, slot: u32) -> BackendResult<()> {
        let device_arg = path_arg(device).map_err(|e| e.into_backend("keyslot_destroy"))?;
        let slot = slot.to_string();
        self.run(&["luksKillSlot", "--batch-mode", device_arg, &slot], None)
            .map(drop)
            .map_err(|e| e.into_backend("keyslot_destroy"))
    }

    fn keyslot_max(&self, version: LuksVersion) -> BackendResult<u32> {
        Ok(version.max_keyslots())
    }

    fn keyslot_status(&self, device: &Path, slot: u32) -> BackendResult<KeySlotStatus> {
        let dump = self.dump(device).map_err(|e| e.into_backend("keyslot_status"))?;
        Ok(dump.status(slot))
    }

    fn keyslot_change_by_passphrase(
        &self,
        device: &Path,
        old_passphrase: &[u8],
        new_passphrase: &[u8],
    ) -> BackendResult<u32> {
        let device_arg =
            path_arg(device).map_err(|e| e.into_backend("keyslot_change_by_passphrase"))?;
        let new_key = SecretFile::create(new_passphrase)
            .map_err(|e| e.into_backend("keyslot_change_by_passphrase"))?;
        let new_key_arg =
            path_arg(&new_key.path).map_err(|e| e.into_backend("keyslot_change_by_passphrase"))?;
        let output = self
            .run(
                &["luksChangeKey", "--verbose", "--key-file", "-", device_arg, new_key_arg],
                Some(old_passphrase),
            )
            .map_err(|e| e.into_backend("keyslot_change_by_passphrase"))?;
        Ok(reported_slot(&output, "created")
            .or_else(|| reported_slot(&output, "unlocked"))
            .unwrap_or(0))
    }
}

/// Keyslot named in a verbose "Key slot N <verb>." line
fn reported_slot(output: &ToolOutput, verb: &str) -> Option<u32> {
    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .filter_map(|line| line.trim().strip_prefix("Key slot "))
        .filter_map(|rest| rest.split_once(' '))
        .filter(|(_, tail)| tail.trim_end_matches('.') == verb)
        .find_map(|(slot, _)| slot.parse().ok())
}

/// Passphrase handed to cryptsetup by path, readable only by us and removed on drop
struct SecretFile {
    path: PathBuf,
}

impl SecretFile {
    fn create(contents: &[u8]) -> Result<Self> {
        let path =
            std::env::temp_dir().join(format!("emmc-storage-{}.key", uuid::Uuid::new_v4()));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;
        let secret = Self { path };
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(secret)
    }
}

impl Drop for SecretFile {
    fn drop(&mut self) {
        if let Ok(len) = fs::metadata(&self.path).map(|m| m.len()) {
            let zeros = Zeroizing::new(vec![0u8; len as usize]);
            if let Err(e) = fs::write(&self.path, zeros.as_slice()) {
                tracing::warn!("Failed to scrub {:?}: {}", self.path, e);
            }
        }
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove {:?}: {}", self.path, e);
        }
    }
}

/// The parts of `cryptsetup luksDump` the backend needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LuksDump {
    pub version: LuksVersion,
    pub active_slots: BTreeSet<u32>,
}

impl LuksDump {
    pub(crate) fn status(&self, slot: u32) -> KeySlotStatus {
        if slot >= self.version.max_keyslots() {
            KeySlotStatus::Invalid
        } else if !self.active_slots.contains(&slot) {
            KeySlotStatus::Inactive
        } else if self.active_slots.len() == 1 {
            KeySlotStatus::ActiveLast
        } else {
            KeySlotStatus::Active
        }
    }
}

/// Parse LUKS1 ("Key Slot N: ENABLED") and LUKS2 ("Keyslots:" section) dumps
pub(crate) fn parse_luks_dump(output: &str) -> Option<LuksDump> {
    let mut version = None;
    let mut active_slots = BTreeSet::new();
    let mut section = "";

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indented = line.starts_with(char::is_whitespace);
        let line = line.trim();

        if !indented {
            if let Some(value) = line.strip_prefix("Version:") {
                version = match value.trim() {
                    "1" => Some(LuksVersion::Luks1),
                    "2" => Some(LuksVersion::Luks2),
                    _ => None,
                };
                continue;
            }
            if let Some(rest) = line.strip_prefix("Key Slot ")
                && let Some((slot, state)) = rest.split_once(':')
            {
                if state.trim() == "ENABLED"
                    && let Ok(slot) = slot.trim().parse()
                {
                    active_slots.insert(slot);
                }
                continue;
            }
            section = line.strip_suffix(':').unwrap_or("");
            continue;
        }

        // "N: luks2" opens a slot entry, its properties are named
        if section == "Keyslots"
            && let Some((slot, _)) = line.split_once(':')
            && let Ok(slot) = slot.parse()
        {
            active_slots.insert(slot);
        }
    }

    Some(LuksDump {
        version: version?,
        active_slots,
    })
}
