// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use storage_types::{EncryptionParams, KeySlotStatus, LuksVersion};

use crate::BackendResult;

/// Operations on a LUKS volume header and its device-mapper mapping
///
/// Implementations own every cryptographic primitive; callers only sequence
/// these calls. Passphrases are raw byte buffers and are passed through
/// unmodified.
pub trait CryptoBackend: Send + Sync {
    /// Write a new volume header using `params`
    fn format(&self, device: &Path, params: &EncryptionParams) -> BackendResult<()>;

    /// Add a keyslot wrapping the volume key with `passphrase`, returning the slot index
    fn keyslot_add_by_volume_key(&self, device: &Path, passphrase: &[u8]) -> BackendResult<u32>;

    /// Read and validate the header on `device`
    fn load(&self, device: &Path) -> BackendResult<LuksVersion>;

    /// Open the mapping `name`, returning the keyslot that matched
    fn activate_by_passphrase(
        &self,
        device: &Path,
        name: &str,
        passphrase: &[u8],
    ) -> BackendResult<u32>;

    fn deactivate(&self, name: &str) -> BackendResult<()>;

    /// Wipe the key material held by `slot`
    fn keyslot_destroy(&self, device: &Path, slot: u32) -> BackendResult<()>;

    fn keyslot_max(&self, version: LuksVersion) -> BackendResult<u32>;

    fn keyslot_status(&self, device: &Path, slot: u32) -> BackendResult<KeySlotStatus>;

    /// Re-wrap the slot unlocked by `old_passphrase` with `new_passphrase`
    fn keyslot_change_by_passphrase(
        &self,
        device: &Path,
        old_passphrase: &[u8],
        new_passphrase: &[u8],
    ) -> BackendResult<u32>;
}
