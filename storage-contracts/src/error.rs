// SPDX-License-Identifier: GPL-3.0-only

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed volume operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    /// Missing or invalid volume header, or missing device
    ResourceNotFound,
    /// A backend call failed or read-back data did not match
    InternalFailure,
    /// Pattern erase I/O or verification mismatch
    EraseError,
    GeometryTooSmall,
    GeometryTooLarge,
    BkopsUnsupported,
    BkopsIoctlFailure,
    BkopsEnableFailure,
    /// The operation is not allowed in the volume's current lock state
    InvalidState,
    /// Another operation on the same volume is in flight
    Busy,
}

impl StorageErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResourceNotFound => "resource_not_found",
            Self::InternalFailure => "internal_failure",
            Self::EraseError => "erase_error",
            Self::GeometryTooSmall => "geometry_too_small",
            Self::GeometryTooLarge => "geometry_too_large",
            Self::BkopsUnsupported => "bkops_unsupported",
            Self::BkopsIoctlFailure => "bkops_ioctl_failure",
            Self::BkopsEnableFailure => "bkops_enable_failure",
            Self::InvalidState => "invalid_state",
            Self::Busy => "busy",
        }
    }
}

/// Error returned by every volume operation
///
/// `rollback` lists cleanup steps that failed while undoing a partially
/// completed operation. They never change `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}: {message}{}", .kind.as_str(), rollback_suffix(.rollback))]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<String>,
}

fn rollback_suffix(rollback: &[String]) -> String {
    if rollback.is_empty() {
        String::new()
    } else {
        format!(" (rollback failed: {})", rollback.join("; "))
    }
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rollback: Vec::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::ResourceNotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::InternalFailure, message)
    }

    pub fn erase(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::EraseError, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::InvalidState, message)
    }

    /// Attach cleanup failures gathered while rolling back
    pub fn with_rollback(mut self, failures: Vec<String>) -> Self {
        self.rollback.extend(failures);
        self
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failure reported by a backend capability
///
/// Backends stand in for C-style calls that return a negative status;
/// this carries which call failed and why.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{call} returned {code}")]
    Status { call: &'static str, code: i32 },

    #[error("{call}: {source}")]
    Io {
        call: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{call}: {message}")]
    Failed { call: &'static str, message: String },
}

impl BackendError {
    pub fn status(call: &'static str, code: i32) -> Self {
        Self::Status { call, code }
    }

    pub fn io(call: &'static str, source: io::Error) -> Self {
        Self::Io { call, source }
    }

    pub fn failed(call: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            call,
            message: message.into(),
        }
    }

    pub fn call(&self) -> &'static str {
        match self {
            Self::Status { call, .. } | Self::Io { call, .. } | Self::Failed { call, .. } => call,
        }
    }

    /// Whether the failure means the target does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            Self::Status { code, .. } => *code == -ENOENT,
            Self::Failed { .. } => false,
        }
    }
}

// errno value backends report as a negative status for a missing target
const ENOENT: i32 = 2;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_roundtrips() {
        let error = StorageError::internal("mount failed")
            .with_rollback(vec!["deactivate: busy".to_string()]);
        let json = serde_json::to_string(&error).expect("serialize error");
        let parsed: StorageError = serde_json::from_str(&json).expect("deserialize error");
        assert_eq!(parsed, error);
    }

    #[test]
    fn display_mentions_rollback_failures() {
        let error = StorageError::internal("mkfs failed")
            .with_rollback(vec!["deactivate: device busy".to_string()]);
        assert_eq!(
            error.to_string(),
            "internal_failure: mkfs failed (rollback failed: deactivate: device busy)"
        );
    }

    #[test]
    fn rollback_does_not_change_kind() {
        let error = StorageError::not_found("no header").with_rollback(vec!["x".to_string()]);
        assert_eq!(error.kind, StorageErrorKind::ResourceNotFound);
    }

    #[test]
    fn missing_file_is_not_found() {
        let error = BackendError::io("open", io::Error::from(io::ErrorKind::NotFound));
        assert!(error.is_not_found());
        assert_eq!(error.call(), "open");
        assert!(BackendError::status("crypt_load", -2).is_not_found());
        assert!(!BackendError::status("crypt_load", -22).is_not_found());
    }
}
