// SPDX-License-Identifier: GPL-3.0-only

//! Undo log for multi-step lifecycle operations

use std::path::PathBuf;

use storage_contracts::{CryptoBackend, FilesystemBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Undo {
    Deactivate { name: String },
    RemoveDirectory { path: PathBuf },
}

/// Steps completed so far, undone newest first
#[derive(Debug, Default)]
pub(crate) struct Rollback {
    steps: Vec<Undo>,
}

impl Rollback {
    pub(crate) fn push(&mut self, step: Undo) {
        self.steps.push(step);
    }

    /// Run every recorded undo in reverse order, returning the ones that failed
    ///
    /// A failing undo does not stop the remaining ones.
    pub(crate) fn unwind(
        mut self,
        crypto: &dyn CryptoBackend,
        filesystem: &dyn FilesystemBackend,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        while let Some(step) = self.steps.pop() {
            let result = match &step {
                Undo::Deactivate { name } => {
                    tracing::warn!("Rolling back: deactivating mapping '{}'", name);
                    crypto.deactivate(name)
                }
                Undo::RemoveDirectory { path } => {
                    tracing::warn!("Rolling back: removing directory {:?}", path);
                    filesystem.remove_directory(path)
                }
            };
            if let Err(error) = result {
                tracing::error!("Rollback step {:?} failed: {error}", step);
                failures.push(error.to_string());
            }
        }
        failures
    }
}
