// SPDX-License-Identifier: GPL-3.0-only

//! Key destruction
//!
//! Wiping every active keyslot leaves the ciphertext on the device but makes
//! it unrecoverable. This runs in constant time, unlike the overwrite
//! strategies, and is safe while the filesystem is mounted.

use storage_contracts::StorageResult;
use storage_types::{EraseMethod, EraseReport, KeySlot};

use super::{EraseContext, EraseStrategy};
use crate::classify;

pub struct CryptoErase;

impl EraseStrategy for CryptoErase {
    fn method(&self) -> EraseMethod {
        EraseMethod::CryptoErase
    }

    fn execute(&self, ctx: &EraseContext<'_>) -> StorageResult<EraseReport> {
        let version = ctx
            .crypto
            .load(ctx.device)
            .map_err(|error| classify::not_found("load volume header", error))?;
        let max_slots = ctx
            .crypto
            .keyslot_max(version)
            .map_err(|error| classify::internal("query keyslot count", error))?;

        let mut destroyed = 0u64;
        for index in 0..max_slots {
            let slot = read_keyslot(ctx, index)?;
            if !slot.status.holds_key_material() {
                continue;
            }

            tracing::info!(
                "Destroying keyslot {} ({:?}) on {:?}",
                slot.index,
                slot.status,
                ctx.device
            );
            ctx.crypto
                .keyslot_destroy(ctx.device, slot.index)
                .map_err(|error| {
                    classify::internal(&format!("destroy keyslot {}", slot.index), error)
                })?;
            destroyed += 1;
        }

        Ok(EraseReport {
            method: self.method(),
            amount: destroyed,
        })
    }
}

fn read_keyslot(ctx: &EraseContext<'_>, index: u32) -> StorageResult<KeySlot> {
    ctx.crypto
        .keyslot_status(ctx.device, index)
        .map(|status| KeySlot { index, status })
        .map_err(|error| classify::internal(&format!("query keyslot {index}"), error))
}
