// SPDX-License-Identifier: GPL-3.0-only

//! Secure erase strategies
//!
//! Each [`EraseMethod`] has one strategy type. [`EraseEngine::execute`]
//! picks it by matching on the request tag; strategies do nothing until
//! [`EraseStrategy::execute`] is called. Device handles are opened inside
//! `execute` and closed when it returns, on success or failure.

mod crypto;
mod pattern;
mod sanitize;
mod verify_geometry;
mod zero;

pub use crypto::CryptoErase;
pub use pattern::{PatternErase, PatternStream};
pub use sanitize::{SanitizeErase, SanitizePlan};
pub use verify_geometry::VerifyGeometry;
pub use zero::ZeroErase;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storage_contracts::{
    BlockDeviceIo, BlockHandle, CryptoBackend, OpenMode, StorageError, StorageResult,
};
use storage_types::{EraseMethod, EraseReport, EraseRequest, GeometryBounds};

use crate::classify;
use crate::settings::EraseSettings;

/// Everything a strategy may touch
pub struct EraseContext<'a> {
    pub device: &'a Path,
    pub bounds: GeometryBounds,
    pub settings: &'a EraseSettings,
    pub block_io: &'a dyn BlockDeviceIo,
    pub crypto: &'a dyn CryptoBackend,
}

impl EraseContext<'_> {
    pub(crate) fn open(&self, mode: OpenMode) -> StorageResult<Box<dyn BlockHandle>> {
        tracing::debug!("Opening {:?} ({:?})", self.device, mode);
        self.block_io
            .open(self.device, mode)
            .map_err(|error| classify::open_failure("open device", error))
    }
}

/// Size of the erase target: the requested byte count, or the whole device
pub(crate) fn target_bytes(
    handle: &mut dyn BlockHandle,
    requested: Option<u64>,
) -> StorageResult<u64> {
    match requested {
        Some(bytes) => Ok(bytes),
        None => handle
            .size_bytes()
            .map_err(|error| classify::internal("query device size", error)),
    }
}

pub trait EraseStrategy {
    fn method(&self) -> EraseMethod;

    fn execute(&self, ctx: &EraseContext<'_>) -> StorageResult<EraseReport>;
}

/// Runs erase requests against one device
pub struct EraseEngine {
    block_io: Arc<dyn BlockDeviceIo>,
    crypto: Arc<dyn CryptoBackend>,
    device: PathBuf,
    bounds: GeometryBounds,
    settings: EraseSettings,
}

impl EraseEngine {
    pub fn new(
        block_io: Arc<dyn BlockDeviceIo>,
        crypto: Arc<dyn CryptoBackend>,
        device: impl Into<PathBuf>,
        bounds: GeometryBounds,
        settings: EraseSettings,
    ) -> Self {
        Self {
            block_io,
            crypto,
            device: device.into(),
            bounds,
            settings,
        }
    }

    pub fn execute(&self, request: &EraseRequest) -> StorageResult<EraseReport> {
        if self.settings.block_size == 0 {
            return Err(StorageError::internal("erase block size must be nonzero"));
        }
        let ctx = EraseContext {
            device: &self.device,
            bounds: self.bounds,
            settings: &self.settings,
            block_io: self.block_io.as_ref(),
            crypto: self.crypto.as_ref(),
        };

        tracing::info!("Starting {} erase of {:?}", request.method(), self.device);
        let report = match request {
            EraseRequest::VerifyGeometry => VerifyGeometry.execute(&ctx),
            EraseRequest::Pattern { pass, bytes } => PatternErase::new(*pass, *bytes).execute(&ctx),
            EraseRequest::Zero { pass, bytes } => ZeroErase::new(*pass, *bytes).execute(&ctx),
            EraseRequest::Sanitize { bytes, ext_csd } => {
                SanitizeErase::new(*bytes, ext_csd.as_ref()).execute(&ctx)
            }
            EraseRequest::CryptoErase => CryptoErase.execute(&ctx),
        }?;
        tracing::info!(
            "{} erase of {:?} finished ({})",
            report.method,
            self.device,
            report.amount
        );
        Ok(report)
    }
}
