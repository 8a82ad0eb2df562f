// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::{OpenMode, StorageResult};
use storage_types::{EraseMethod, EraseReport};

use super::{EraseContext, EraseStrategy};
use crate::classify;
use crate::geometry::validate_geometry;

/// Checks the device size against the volume's geometry bounds; writes nothing
pub struct VerifyGeometry;

impl EraseStrategy for VerifyGeometry {
    fn method(&self) -> EraseMethod {
        EraseMethod::VerifyGeometry
    }

    fn execute(&self, ctx: &EraseContext<'_>) -> StorageResult<EraseReport> {
        let mut handle = ctx.open(OpenMode::Read)?;
        let bytes = handle
            .size_bytes()
            .map_err(|error| classify::internal("query device size", error))?;

        tracing::debug!(
            "Device {:?} is {} bytes, bounds [{}, {}]",
            ctx.device,
            bytes,
            ctx.bounds.min_bytes,
            ctx.bounds.max_bytes
        );
        validate_geometry(bytes, ctx.bounds).into_result(bytes, ctx.bounds)?;

        Ok(EraseReport {
            method: self.method(),
            amount: bytes,
        })
    }
}
