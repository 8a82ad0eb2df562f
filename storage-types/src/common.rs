// SPDX-License-Identifier: GPL-3.0-only

//! Common utility types shared across models

use serde::{Deserialize, Serialize};

/// Logical sector size used by eMMC capacity fields
pub const SECTOR_SIZE: u64 = 512;

/// Inclusive capacity bounds a device must fall within before it is erased
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryBounds {
    /// Smallest acceptable device size in bytes (inclusive)
    pub min_bytes: u64,

    /// Largest acceptable device size in bytes (inclusive)
    pub max_bytes: u64,
}

impl GeometryBounds {
    pub fn new(min_bytes: u64, max_bytes: u64) -> Self {
        Self {
            min_bytes,
            max_bytes,
        }
    }

    /// Bounds are usable only when they describe a non-empty range
    pub fn is_valid(&self) -> bool {
        self.min_bytes <= self.max_bytes
    }

    pub fn contains(&self, bytes: u64) -> bool {
        bytes >= self.min_bytes && bytes <= self.max_bytes
    }
}

/// Convert bytes to human-readable format (e.g., "1.50 GB")
pub fn bytes_to_pretty(bytes: u64) -> String {
    let mut steps = 0;
    let mut val: f64 = bytes as f64;

    while val > 1024. && steps <= 8 {
        val /= 1024.;
        steps += 1;
    }

    let unit = match steps {
        0 => "B",
        1 => "KB",
        2 => "MB",
        3 => "GB",
        4 => "TB",
        5 => "PB",
        6 => "EB",
        7 => "ZB",
        8 => "YB",
        _ => "Not Supported",
    };

    format!("{:.2} {}", val, unit)
}
