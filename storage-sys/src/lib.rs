// SPDX-License-Identifier: GPL-3.0-only

//! Linux backends for encrypted eMMC volumes
//!
//! - [`CryptsetupCli`]: LUKS headers, keyslots and mappings via `cryptsetup`
//! - [`SystemFilesystem`]: mkfs/fsck tools and the mount syscalls
//! - [`SystemBlockDevices`]: raw reads and writes, size and MMC ioctls
//!
//! These operations require elevated privileges and should only be called
//! from the privileged service.

pub mod block;
pub mod command;
pub mod cryptsetup;
pub mod error;
pub mod filesystem;

pub use block::{DeviceHandle, SystemBlockDevices};
pub use cryptsetup::CryptsetupCli;
pub use error::{Result, SysError};
pub use filesystem::SystemFilesystem;
