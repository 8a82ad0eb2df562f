// SPDX-License-Identifier: GPL-3.0-only

use std::io;

use storage_contracts::BackendError;
use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("{0} is not installed")]
    ToolNotFound(&'static str),

    #[error("{program} exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Unexpected output from {program}: {message}")]
    Parse { program: String, message: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl SysError {
    /// Attach the name of the backend call that failed
    pub fn into_backend(self, call: &'static str) -> BackendError {
        match self {
            SysError::Io(source) => BackendError::io(call, source),
            SysError::DeviceNotFound(device) => {
                BackendError::io(call, io::Error::new(io::ErrorKind::NotFound, device))
            }
            other => BackendError::failed(call, other.to_string()),
        }
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
