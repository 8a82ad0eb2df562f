// SPDX-License-Identifier: GPL-3.0-only

pub mod block;
pub mod crypto;
pub mod filesystem;

pub use block::{BlockDeviceIo, BlockHandle, OpenMode};
pub use crypto::CryptoBackend;
pub use filesystem::FilesystemBackend;
