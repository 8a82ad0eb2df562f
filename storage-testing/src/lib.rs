//! Test doubles for the volume backends
//!
//! The fakes keep their state in memory, record every backend call into a
//! shared [`CallLog`] and fail any call kind on request. [`VolumeFixture`]
//! wires them into a ready-to-use `VolumeManager`.

pub mod errors;
pub mod fakes;
pub mod fixture;
pub mod support;

pub use fakes::{
    CallKind, CallLog, DeviceRef, FakeCrypto, FakeFilesystem, MemoryBlockDevices,
};
pub use fixture::VolumeFixture;
