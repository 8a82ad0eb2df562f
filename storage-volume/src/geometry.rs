// SPDX-License-Identifier: GPL-3.0-only

//! Capacity sanity check run before a device is erased

use storage_contracts::{StorageError, StorageErrorKind, StorageResult};
use storage_types::{GeometryBounds, bytes_to_pretty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryCheck {
    Ok,
    TooSmall,
    TooLarge,
}

/// Compare a device size against inclusive bounds
pub fn validate_geometry(bytes: u64, bounds: GeometryBounds) -> GeometryCheck {
    if bytes < bounds.min_bytes {
        GeometryCheck::TooSmall
    } else if bytes > bounds.max_bytes {
        GeometryCheck::TooLarge
    } else {
        GeometryCheck::Ok
    }
}

impl GeometryCheck {
    pub fn into_result(self, bytes: u64, bounds: GeometryBounds) -> StorageResult<()> {
        match self {
            GeometryCheck::Ok => Ok(()),
            GeometryCheck::TooSmall => Err(StorageError::new(
                StorageErrorKind::GeometryTooSmall,
                format!(
                    "device is {} ({bytes} bytes), below the minimum of {} bytes",
                    bytes_to_pretty(bytes),
                    bounds.min_bytes
                ),
            )),
            GeometryCheck::TooLarge => Err(StorageError::new(
                StorageErrorKind::GeometryTooLarge,
                format!(
                    "device is {} ({bytes} bytes), above the maximum of {} bytes",
                    bytes_to_pretty(bytes),
                    bounds.max_bytes
                ),
            )),
        }
    }
}
