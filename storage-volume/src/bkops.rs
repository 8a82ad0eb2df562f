// SPDX-License-Identifier: GPL-3.0-only

//! Background operations (BKOPS) enablement
//!
//! Setting BKOPS_EN is a one-time programmable write on most parts; once set
//! it survives power cycles and cannot be cleared.

use std::path::PathBuf;
use std::sync::Arc;

use storage_contracts::{BlockDeviceIo, OpenMode, StorageError, StorageErrorKind, StorageResult};
use storage_types::MmcCommand;
use storage_types::mmc::{EXT_CSD_BKOPS_EN, EXT_CSD_MANUAL_BKOPS_MASK};

use crate::classify;
use crate::ext_csd::read_ext_csd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BkopsOutcome {
    Enabled,
    AlreadyEnabled,
}

pub struct BackgroundOps {
    block_io: Arc<dyn BlockDeviceIo>,
    device: PathBuf,
}

impl BackgroundOps {
    pub fn new(block_io: Arc<dyn BlockDeviceIo>, device: impl Into<PathBuf>) -> Self {
        Self {
            block_io,
            device: device.into(),
        }
    }

    pub fn enable(&self) -> StorageResult<BkopsOutcome> {
        let mut handle = self
            .block_io
            .open(&self.device, OpenMode::ReadWrite)
            .map_err(|error| {
                classify::classify(StorageErrorKind::BkopsIoctlFailure, "open device", error)
            })?;

        let ext_csd = read_ext_csd(handle.as_mut()).map_err(|error| {
            classify::classify(
                StorageErrorKind::BkopsIoctlFailure,
                "read extended CSD",
                error,
            )
        })?;

        if !ext_csd.bkops_supported() {
            tracing::warn!("{:?} does not support background operations", self.device);
            return Err(StorageError::new(
                StorageErrorKind::BkopsUnsupported,
                format!("{} does not support background operations", self.device.display()),
            ));
        }

        if ext_csd.manual_bkops_enabled() {
            tracing::info!("Background operations already enabled on {:?}", self.device);
            return Ok(BkopsOutcome::AlreadyEnabled);
        }

        let command = MmcCommand::switch_write_byte(EXT_CSD_BKOPS_EN, EXT_CSD_MANUAL_BKOPS_MASK);
        handle.mmc_command(&command, &mut []).map_err(|error| {
            classify::classify(
                StorageErrorKind::BkopsEnableFailure,
                "enable background operations",
                error,
            )
        })?;

        tracing::info!("Enabled background operations on {:?}", self.device);
        Ok(BkopsOutcome::Enabled)
    }
}
