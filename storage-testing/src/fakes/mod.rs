mod block;
mod crypto;
mod filesystem;
mod journal;

pub use block::{DeviceRef, MemoryBlockDevices};
pub use crypto::FakeCrypto;
pub use filesystem::FakeFilesystem;
pub use journal::{CallKind, CallLog};
