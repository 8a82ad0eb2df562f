// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mmc::ExtCsd;

/// Tag selecting an erase strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EraseMethod {
    VerifyGeometry,
    Pattern,
    Zero,
    Sanitize,
    CryptoErase,
}

impl EraseMethod {
    /// Methods that write the raw device underneath the filesystem
    pub fn writes_raw_device(self) -> bool {
        matches!(
            self,
            EraseMethod::Pattern | EraseMethod::Zero | EraseMethod::Sanitize
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EraseMethod::VerifyGeometry => "verify_geometry",
            EraseMethod::Pattern => "pattern",
            EraseMethod::Zero => "zero",
            EraseMethod::Sanitize => "sanitize",
            EraseMethod::CryptoErase => "crypto_erase",
        }
    }
}

impl fmt::Display for EraseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an overwrite strategy writes its data or checks it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErasePass {
    #[default]
    Overwrite,
    Verify,
}

/// A single erase operation and its method-specific parameters
///
/// `bytes` of `None` targets the whole device as reported by the size query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EraseRequest {
    VerifyGeometry,
    Pattern {
        pass: ErasePass,
        bytes: Option<u64>,
    },
    Zero {
        pass: ErasePass,
        bytes: Option<u64>,
    },
    Sanitize {
        bytes: Option<u64>,
        ext_csd: Option<ExtCsd>,
    },
    CryptoErase,
}

impl EraseRequest {
    pub fn method(&self) -> EraseMethod {
        match self {
            EraseRequest::VerifyGeometry => EraseMethod::VerifyGeometry,
            EraseRequest::Pattern { .. } => EraseMethod::Pattern,
            EraseRequest::Zero { .. } => EraseMethod::Zero,
            EraseRequest::Sanitize { .. } => EraseMethod::Sanitize,
            EraseRequest::CryptoErase => EraseMethod::CryptoErase,
        }
    }
}

/// What an erase run touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraseReport {
    pub method: EraseMethod,

    /// Bytes written or verified; keyslots destroyed for crypto erase
    pub amount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_reports_its_tag() {
        let request = EraseRequest::Zero {
            pass: ErasePass::Verify,
            bytes: Some(4096),
        };
        assert_eq!(request.method(), EraseMethod::Zero);
        assert_eq!(EraseRequest::CryptoErase.method(), EraseMethod::CryptoErase);
    }

    #[test]
    fn key_destruction_does_not_touch_raw_device() {
        assert!(EraseMethod::Sanitize.writes_raw_device());
        assert!(!EraseMethod::CryptoErase.writes_raw_device());
        assert!(!EraseMethod::VerifyGeometry.writes_raw_device());
    }
}
