use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use storage_contracts::{BackendError, BackendResult, CryptoBackend};
use storage_types::{EncryptionParams, KeySlotStatus, LuksVersion};

use super::journal::{CallKind, CallLog};

/// EPERM, returned when a passphrase opens no keyslot
const WRONG_PASSPHRASE: i32 = -1;

#[derive(Debug, Default)]
struct CryptoState {
    version: LuksVersion,
    max_keyslots: Option<u32>,
    slots: BTreeMap<u32, KeySlotStatus>,
    passphrase: Option<Vec<u8>>,
    params: Option<EncryptionParams>,
    mappings: BTreeSet<String>,
    added: Vec<Vec<u8>>,
    changes: Vec<(Vec<u8>, Vec<u8>)>,
    destroyed: Vec<u32>,
}

/// In-memory LUKS header
#[derive(Debug)]
pub struct FakeCrypto {
    log: CallLog,
    state: Mutex<CryptoState>,
}

impl FakeCrypto {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            state: Mutex::new(CryptoState::default()),
        }
    }

    /// Report `max` keyslots with the given statuses from slot 0 upwards
    pub fn with_keyslots(self, max: u32, statuses: &[KeySlotStatus]) -> Self {
        {
            let mut state = self.state();
            state.max_keyslots = Some(max);
            state.slots = (0u32..).zip(statuses.iter().copied()).collect();
        }
        self
    }

    /// Only `passphrase` opens the volume
    pub fn with_passphrase(self, passphrase: &[u8]) -> Self {
        self.state().passphrase = Some(passphrase.to_vec());
        self
    }

    fn state(&self) -> MutexGuard<'_, CryptoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn params(&self) -> Option<EncryptionParams> {
        self.state().params.clone()
    }

    pub fn added_passphrases(&self) -> Vec<Vec<u8>> {
        self.state().added.clone()
    }

    pub fn changes(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.state().changes.clone()
    }

    pub fn destroyed(&self) -> Vec<u32> {
        self.state().destroyed.clone()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.state().mappings.contains(name)
    }

    pub fn passphrase(&self) -> Option<Vec<u8>> {
        self.state().passphrase.clone()
    }
}

impl CryptoBackend for FakeCrypto {
    fn format(&self, _device: &Path, params: &EncryptionParams) -> BackendResult<()> {
        self.log.record(CallKind::Format)?;
        let mut state = self.state();
        state.version = params.version;
        state.params = Some(params.clone());
        state.slots.clear();
        Ok(())
    }

    fn keyslot_add_by_volume_key(&self, _device: &Path, passphrase: &[u8]) -> BackendResult<u32> {
        self.log.record(CallKind::KeyslotAddByVolumeKey)?;
        let mut state = self.state();
        state.slots.insert(0, KeySlotStatus::ActiveLast);
        state.passphrase = Some(passphrase.to_vec());
        state.added.push(passphrase.to_vec());
        Ok(0)
    }

    fn load(&self, _device: &Path) -> BackendResult<LuksVersion> {
        self.log.record(CallKind::Load)?;
        Ok(self.state().version)
    }

    fn activate_by_passphrase(
        &self,
        _device: &Path,
        name: &str,
        passphrase: &[u8],
    ) -> BackendResult<u32> {
        self.log.record(CallKind::ActivateByPassphrase)?;
        let mut state = self.state();
        if state
            .passphrase
            .as_deref()
            .is_some_and(|known| known != passphrase)
        {
            return Err(BackendError::status(
                CallKind::ActivateByPassphrase.name(),
                WRONG_PASSPHRASE,
            ));
        }
        state.mappings.insert(name.to_string());
        Ok(0)
    }

    fn deactivate(&self, name: &str) -> BackendResult<()> {
        self.log.record(CallKind::Deactivate)?;
        self.state().mappings.remove(name);
        Ok(())
    }

    fn keyslot_destroy(&self, _device: &Path, slot: u32) -> BackendResult<()> {
        self.log.record(CallKind::KeyslotDestroy)?;
        let mut state = self.state();
        state.slots.insert(slot, KeySlotStatus::Inactive);
        state.destroyed.push(slot);
        Ok(())
    }

    fn keyslot_max(&self, version: LuksVersion) -> BackendResult<u32> {
        self.log.record(CallKind::KeyslotMax)?;
        Ok(self
            .state()
            .max_keyslots
            .unwrap_or_else(|| version.max_keyslots()))
    }

    fn keyslot_status(&self, _device: &Path, slot: u32) -> BackendResult<KeySlotStatus> {
        self.log.record(CallKind::KeyslotStatus)?;
        let state = self.state();
        let max = state
            .max_keyslots
            .unwrap_or_else(|| state.version.max_keyslots());
        if slot >= max {
            return Ok(KeySlotStatus::Invalid);
        }
        Ok(state
            .slots
            .get(&slot)
            .copied()
            .unwrap_or(KeySlotStatus::Inactive))
    }

    fn keyslot_change_by_passphrase(
        &self,
        _device: &Path,
        old_passphrase: &[u8],
        new_passphrase: &[u8],
    ) -> BackendResult<u32> {
        self.log.record(CallKind::KeyslotChangeByPassphrase)?;
        let mut state = self.state();
        state
            .changes
            .push((old_passphrase.to_vec(), new_passphrase.to_vec()));
        state.passphrase = Some(new_passphrase.to_vec());
        Ok(0)
    }
}
