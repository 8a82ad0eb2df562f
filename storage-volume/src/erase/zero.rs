// SPDX-License-Identifier: GPL-3.0-only

//! Zero-fill overwrite
//!
//! Raw devices may transfer less than a full block per call. Each block is
//! retried from where the last transfer stopped until the attempt budget
//! runs out.

use std::thread;
use std::time::Duration;

use storage_contracts::{BackendResult, BlockHandle, OpenMode, StorageError, StorageResult};
use storage_types::{EraseMethod, EraseReport, ErasePass};

use super::pattern::block_len;
use super::{EraseContext, EraseStrategy, target_bytes};
use crate::classify;

#[derive(Debug, Clone, Copy)]
struct RetryBudget {
    attempts: u32,
    delay: Duration,
}

pub struct ZeroErase {
    pass: ErasePass,
    bytes: Option<u64>,
}

impl ZeroErase {
    pub fn new(pass: ErasePass, bytes: Option<u64>) -> Self {
        Self { pass, bytes }
    }

    fn overwrite(
        &self,
        handle: &mut dyn BlockHandle,
        total: u64,
        block_size: usize,
        budget: RetryBudget,
    ) -> StorageResult<()> {
        let zeros = vec![0u8; block_size];
        let mut offset = 0u64;

        while offset < total {
            let len = block_len(block_size, total - offset);
            transfer(budget, offset, len, "write", |done| {
                handle.write(&zeros[done..len])
            })?;
            offset += len as u64;
        }
        handle
            .sync()
            .map_err(|error| classify::internal("flush zero writes", error))
    }

    fn verify(
        &self,
        handle: &mut dyn BlockHandle,
        total: u64,
        block_size: usize,
        budget: RetryBudget,
    ) -> StorageResult<()> {
        let reference = vec![0u8; block_size];
        let mut buffer = vec![0u8; block_size];
        let mut offset = 0u64;

        while offset < total {
            let len = block_len(block_size, total - offset);
            transfer(budget, offset, len, "read", |done| {
                handle.read(&mut buffer[done..len])
            })?;

            if buffer[..len] != reference[..len] {
                let position = buffer[..len]
                    .iter()
                    .position(|byte| *byte != 0)
                    .unwrap_or_default();
                let at = offset + position as u64;
                tracing::error!("Nonzero byte found at {} during zero verify", at);
                return Err(StorageError::internal(format!(
                    "nonzero byte at offset {at}"
                )));
            }
            offset += len as u64;
        }
        Ok(())
    }
}

/// Move one block of `len` bytes, calling `step` with the bytes done so far
fn transfer<F>(
    budget: RetryBudget,
    offset: u64,
    len: usize,
    direction: &str,
    mut step: F,
) -> StorageResult<()>
where
    F: FnMut(usize) -> BackendResult<usize>,
{
    let mut done = 0;
    let mut attempts = 0;

    while done < len {
        if attempts == budget.attempts {
            tracing::error!(
                "Zero {} at offset {} gave up after {} attempts ({} of {} bytes)",
                direction,
                offset,
                attempts,
                done,
                len
            );
            return Err(StorageError::internal(format!(
                "zero {direction} at offset {offset} stalled: {done} of {len} bytes after {attempts} attempts"
            )));
        }
        attempts += 1;

        let moved = step(done).map_err(|error| {
            classify::internal(&format!("zero {direction} at offset {offset}"), error)
        })?;
        done += moved;

        if done < len {
            tracing::debug!(
                "Short {} at offset {}: {} of {} bytes, retrying",
                direction,
                offset,
                done,
                len
            );
            thread::sleep(budget.delay);
        }
    }
    Ok(())
}

impl EraseStrategy for ZeroErase {
    fn method(&self) -> EraseMethod {
        EraseMethod::Zero
    }

    fn execute(&self, ctx: &EraseContext<'_>) -> StorageResult<EraseReport> {
        let mode = match self.pass {
            ErasePass::Overwrite => OpenMode::Write,
            ErasePass::Verify => OpenMode::Read,
        };
        let mut handle = ctx.open(mode)?;
        let total = target_bytes(handle.as_mut(), self.bytes)?;
        let budget = RetryBudget {
            attempts: ctx.settings.transfer_attempts,
            delay: ctx.settings.retry_delay(),
        };
        let block_size = ctx.settings.block_size;

        match self.pass {
            ErasePass::Overwrite => self.overwrite(handle.as_mut(), total, block_size, budget)?,
            ErasePass::Verify => self.verify(handle.as_mut(), total, block_size, budget)?,
        }

        Ok(EraseReport {
            method: self.method(),
            amount: total,
        })
    }
}
