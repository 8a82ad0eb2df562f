// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use storage_types::MmcCommand;

use crate::BackendResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    pub fn readable(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

/// Opens raw block devices
pub trait BlockDeviceIo: Send + Sync {
    fn open(&self, path: &Path, mode: OpenMode) -> BackendResult<Box<dyn BlockHandle>>;
}

/// An open device; closed when dropped
///
/// Reads and writes advance a shared cursor starting at offset zero and may
/// transfer fewer bytes than requested.
pub trait BlockHandle: Send {
    fn read(&mut self, buf: &mut [u8]) -> BackendResult<usize>;

    fn write(&mut self, buf: &[u8]) -> BackendResult<usize>;

    /// Push written data to the device, reporting deferred write errors
    fn sync(&mut self) -> BackendResult<()>;

    /// Device size in bytes
    fn size_bytes(&mut self) -> BackendResult<u64>;

    /// Submit a command to the card; `data` is filled (or sent) per `command`
    fn mmc_command(&mut self, command: &MmcCommand, data: &mut [u8]) -> BackendResult<()>;
}
