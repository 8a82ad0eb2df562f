// SPDX-License-Identifier: GPL-3.0-only

//! Encrypted volume lifecycle and secure erase for eMMC devices
//!
//! [`VolumeManager`] drives a LUKS volume through format, unlock, lock and
//! password changes, rolling back completed steps when a later one fails.
//! Erase requests are dispatched to [`EraseEngine`], which holds one strategy
//! per [`EraseMethod`](storage_types::EraseMethod).
//!
//! Every capability (block I/O, LUKS, filesystem tools) is injected through
//! the traits in `storage-contracts`. All calls are synchronous and run on
//! the caller's thread; callers serialize operations per volume.

mod classify;
mod ext_csd;
mod rollback;

pub mod bkops;
pub mod erase;
pub mod geometry;
pub mod manager;
pub mod settings;

pub use bkops::{BackgroundOps, BkopsOutcome};
pub use erase::{EraseContext, EraseEngine, EraseStrategy};
pub use ext_csd::read_ext_csd;
pub use geometry::{GeometryCheck, validate_geometry};
pub use manager::{Backends, VolumeManager};
pub use settings::{EraseSettings, FilesystemSettings, VolumeSettings};
