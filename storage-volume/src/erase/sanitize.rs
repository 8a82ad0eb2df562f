// SPDX-License-Identifier: GPL-3.0-only

//! Hardware sanitize through the eMMC switch command
//!
//! The sanitize call blocks until the card reports completion, which can take
//! minutes, and cannot be cancelled once issued.

use storage_contracts::{OpenMode, StorageError, StorageResult};
use storage_types::mmc::{EXT_CSD_SANITIZE_START, HC_ERASE_GROUP_UNIT};
use storage_types::{EraseMethod, EraseReport, ExtCsd, MmcCommand, SECTOR_SIZE};

use super::{EraseContext, EraseStrategy, target_bytes};
use crate::classify;
use crate::ext_csd::read_ext_csd;

/// Per-erase-group timeout unit defined for ERASE_TIMEOUT_MULT
const ERASE_TIMEOUT_UNIT_MS: u64 = 300;

/// Erase geometry derived from the extended CSD for an expected capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizePlan {
    pub erase_unit_bytes: u64,
    pub erase_groups: u64,
    pub timeout_ms: u32,
}

impl SanitizePlan {
    pub fn from_ext_csd(ext_csd: &ExtCsd, expected_bytes: u64) -> StorageResult<Self> {
        let erase_unit_bytes = if ext_csd.erase_group_def() && ext_csd.hc_erase_grp_size() > 0 {
            u64::from(ext_csd.hc_erase_grp_size()) * HC_ERASE_GROUP_UNIT
        } else {
            SECTOR_SIZE
        };

        if expected_bytes < erase_unit_bytes {
            return Err(StorageError::internal(format!(
                "expected capacity of {expected_bytes} bytes is smaller than one erase unit ({erase_unit_bytes} bytes)"
            )));
        }

        let reported_bytes = u64::from(ext_csd.sec_count()) * SECTOR_SIZE;
        if reported_bytes != 0 && reported_bytes < expected_bytes {
            return Err(StorageError::internal(format!(
                "device reports {reported_bytes} bytes, less than the expected {expected_bytes}"
            )));
        }

        if !ext_csd.sanitize_supported() {
            return Err(StorageError::internal(
                "device does not advertise sanitize support",
            ));
        }

        let erase_groups = expected_bytes.div_ceil(erase_unit_bytes);
        let timeout_ms = ERASE_TIMEOUT_UNIT_MS
            .saturating_mul(u64::from(ext_csd.erase_timeout_mult()))
            .saturating_mul(erase_groups);

        Ok(Self {
            erase_unit_bytes,
            erase_groups,
            timeout_ms: u32::try_from(timeout_ms).unwrap_or(u32::MAX),
        })
    }
}

pub struct SanitizeErase<'a> {
    bytes: Option<u64>,
    ext_csd: Option<&'a ExtCsd>,
}

impl<'a> SanitizeErase<'a> {
    pub fn new(bytes: Option<u64>, ext_csd: Option<&'a ExtCsd>) -> Self {
        Self { bytes, ext_csd }
    }
}

impl EraseStrategy for SanitizeErase<'_> {
    fn method(&self) -> EraseMethod {
        EraseMethod::Sanitize
    }

    fn execute(&self, ctx: &EraseContext<'_>) -> StorageResult<EraseReport> {
        let mut handle = ctx.open(OpenMode::ReadWrite)?;

        let read_register;
        let ext_csd = match self.ext_csd {
            Some(ext_csd) => ext_csd,
            None => {
                read_register = read_ext_csd(handle.as_mut())
                    .map_err(|error| classify::internal("read extended CSD", error))?;
                &read_register
            }
        };
        let expected = target_bytes(handle.as_mut(), self.bytes)?;
        let plan = SanitizePlan::from_ext_csd(ext_csd, expected)?;

        tracing::info!(
            "Sanitizing {:?}: {} erase groups of {} bytes, timeout {} ms",
            ctx.device,
            plan.erase_groups,
            plan.erase_unit_bytes,
            plan.timeout_ms
        );
        let command =
            MmcCommand::switch_write_byte(EXT_CSD_SANITIZE_START, 1).with_timeout_ms(plan.timeout_ms);
        handle
            .mmc_command(&command, &mut [])
            .map_err(|error| classify::internal("sanitize", error))?;

        Ok(EraseReport {
            method: self.method(),
            amount: expected,
        })
    }
}
