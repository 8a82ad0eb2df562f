// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for eMMC volume management
//!
//! This crate defines the types shared by every layer of the stack:
//!
//! - **storage-contracts**: backend capability traits are expressed in these types
//! - **storage-volume**: the lifecycle manager and erase engine operate on them
//! - **storage-sys**: the Linux backends translate them into tool arguments and ioctls
//! - **storage-service**: loads them from configuration and prints them as JSON
//!
//! Nothing in here performs I/O.

pub mod common;
pub mod encryption;
pub mod erase;
pub mod filesystem;
pub mod mmc;
pub mod volume;

pub use common::{GeometryBounds, SECTOR_SIZE, bytes_to_pretty};
pub use encryption::{EncryptionParams, KeySlot, KeySlotStatus, LuksVersion};
pub use erase::{EraseMethod, ErasePass, EraseReport, EraseRequest};
pub use filesystem::{FilesystemType, MountOptions};
pub use mmc::{ExtCsd, EXT_CSD_SIZE, MmcCommand};
pub use volume::{LockState, VolumeIdentity, VolumeMetadata};
