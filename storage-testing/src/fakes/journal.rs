use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storage_contracts::{BackendError, BackendResult};

/// EIO, the status an injected failure reports
const INJECTED_FAILURE: i32 = -5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Format,
    KeyslotAddByVolumeKey,
    Load,
    ActivateByPassphrase,
    Deactivate,
    KeyslotDestroy,
    KeyslotMax,
    KeyslotStatus,
    KeyslotChangeByPassphrase,
    RunMkfs,
    RunFsck,
    Mount,
    Unmount,
    CreateDirectory,
    RemoveDirectory,
    DirectoryExists,
}

impl CallKind {
    pub fn name(self) -> &'static str {
        match self {
            CallKind::Format => "format",
            CallKind::KeyslotAddByVolumeKey => "keyslot_add_by_volume_key",
            CallKind::Load => "load",
            CallKind::ActivateByPassphrase => "activate_by_passphrase",
            CallKind::Deactivate => "deactivate",
            CallKind::KeyslotDestroy => "keyslot_destroy",
            CallKind::KeyslotMax => "keyslot_max",
            CallKind::KeyslotStatus => "keyslot_status",
            CallKind::KeyslotChangeByPassphrase => "keyslot_change_by_passphrase",
            CallKind::RunMkfs => "run_mkfs",
            CallKind::RunFsck => "run_fsck",
            CallKind::Mount => "mount",
            CallKind::Unmount => "unmount",
            CallKind::CreateDirectory => "create_directory",
            CallKind::RemoveDirectory => "remove_directory",
            CallKind::DirectoryExists => "directory_exists",
        }
    }
}

#[derive(Debug, Default)]
struct Journal {
    calls: Vec<CallKind>,
    failures: HashMap<CallKind, i32>,
}

/// Ordered record of backend calls shared by all fakes of one fixture
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    inner: Arc<Mutex<Journal>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `kind`, failing it when a failure was injected
    pub fn record(&self, kind: CallKind) -> BackendResult<()> {
        let mut journal = self.journal();
        journal.calls.push(kind);
        match journal.failures.get(&kind) {
            Some(code) => Err(BackendError::status(kind.name(), *code)),
            None => Ok(()),
        }
    }

    pub fn fail_on(&self, kind: CallKind) {
        self.fail_with(kind, INJECTED_FAILURE);
    }

    /// Make every later `kind` call fail with the given negative status
    pub fn fail_with(&self, kind: CallKind, code: i32) {
        self.journal().failures.insert(kind, code);
    }

    pub fn clear_failures(&self) {
        self.journal().failures.clear();
    }

    pub fn calls(&self) -> Vec<CallKind> {
        self.journal().calls.clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.journal().calls.iter().filter(|call| **call == kind).count()
    }

    /// Forget recorded calls; injected failures stay armed
    pub fn clear(&self) {
        self.journal().calls.clear();
    }
}
