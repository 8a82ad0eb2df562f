// SPDX-License-Identifier: GPL-3.0-only

pub mod error;
pub mod traits;

pub use error::{BackendError, BackendResult, StorageError, StorageErrorKind, StorageResult};
pub use traits::{BlockDeviceIo, BlockHandle, CryptoBackend, FilesystemBackend, OpenMode};
