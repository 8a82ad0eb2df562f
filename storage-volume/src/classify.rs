// SPDX-License-Identifier: GPL-3.0-only

//! Turn backend failures into the error kind each call site promises

use storage_contracts::{BackendError, StorageError, StorageErrorKind};

pub(crate) fn internal(context: &str, error: BackendError) -> StorageError {
    classify(StorageErrorKind::InternalFailure, context, error)
}

pub(crate) fn not_found(context: &str, error: BackendError) -> StorageError {
    classify(StorageErrorKind::ResourceNotFound, context, error)
}

pub(crate) fn classify(kind: StorageErrorKind, context: &str, error: BackendError) -> StorageError {
    tracing::error!("{context} failed: {error}");
    StorageError::new(kind, format!("{context}: {error}"))
}

/// Opening a device: a missing node is `ResourceNotFound`, anything else internal
pub(crate) fn open_failure(context: &str, error: BackendError) -> StorageError {
    if error.is_not_found() {
        not_found(context, error)
    } else {
        internal(context, error)
    }
}
