// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use storage_contracts::StorageError;
use thiserror::Error;

/// Service-specific errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("System backend unavailable: {0}")]
    Backend(#[from] storage_sys::SysError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation task failed: {0}")]
    Task(String),
}

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::ConfigInvalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
