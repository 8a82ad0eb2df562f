// SPDX-License-Identifier: GPL-3.0-only

//! Raw block device access
//!
//! Size queries use `BLKGETSIZE64` and card commands go through the MMC block
//! driver's `MMC_IOC_CMD`. Regular files are accepted as devices so images can
//! stand in for a card; they report their length and reject MMC commands.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use storage_contracts::{BackendError, BackendResult, BlockDeviceIo, BlockHandle, OpenMode};
use storage_types::MmcCommand;

/// `struct mmc_ioc_cmd` from linux/mmc/ioctl.h
#[repr(C)]
#[derive(Debug, Default)]
pub struct RawMmcIocCmd {
    write_flag: libc::c_int,
    is_acmd: libc::c_int,
    opcode: u32,
    arg: u32,
    response: [u32; 4],
    flags: libc::c_uint,
    blksz: libc::c_uint,
    blocks: libc::c_uint,
    postsleep_min_us: libc::c_uint,
    postsleep_max_us: libc::c_uint,
    data_timeout_ns: libc::c_uint,
    cmd_timeout_ms: libc::c_uint,
    pad: u32,
    data_ptr: u64,
}

impl RawMmcIocCmd {
    fn new(command: &MmcCommand, data: &mut [u8]) -> Self {
        Self {
            write_flag: libc::c_int::from(command.write),
            opcode: command.opcode,
            arg: command.arg,
            flags: command.flags,
            blksz: command.block_size,
            blocks: command.blocks,
            cmd_timeout_ms: command.cmd_timeout_ms,
            data_ptr: if data.is_empty() {
                0
            } else {
                data.as_mut_ptr() as u64
            },
            ..Self::default()
        }
    }
}

mod ioctl {
    // linux/fs.h: BLKGETSIZE64 = _IOR(0x12, 114, size_t). The request encodes
    // the native size_t width while the kernel always writes a u64.
    pub const BLKGETSIZE64: nix::sys::ioctl::ioctl_num_type =
        nix::request_code_read!(0x12, 114, std::mem::size_of::<libc::size_t>());
    nix::ioctl_read_bad!(blkgetsize64, BLKGETSIZE64, u64);
    // linux/mmc/ioctl.h: MMC_IOC_CMD = _IOWR(MMC_BLOCK_MAJOR, 0, struct mmc_ioc_cmd)
    nix::ioctl_readwrite!(mmc_ioc_cmd, 179, 0, super::RawMmcIocCmd);
}

#[derive(Debug, Default)]
pub struct SystemBlockDevices;

impl SystemBlockDevices {
    pub fn new() -> Self {
        Self
    }
}

impl BlockDeviceIo for SystemBlockDevices {
    fn open(&self, path: &Path, mode: OpenMode) -> BackendResult<Box<dyn BlockHandle>> {
        let file = OpenOptions::new()
            .read(mode.readable())
            .write(mode.writable())
            .open(path)
            .map_err(|e| BackendError::io("open", e))?;
        let regular = file
            .metadata()
            .map_err(|e| BackendError::io("open", e))?
            .is_file();
        tracing::debug!("Opened {:?} ({:?})", path, mode);
        Ok(Box::new(DeviceHandle {
            file,
            path: path.to_path_buf(),
            regular,
        }))
    }
}

pub struct DeviceHandle {
    file: File,
    path: PathBuf,
    regular: bool,
}

impl DeviceHandle {
    fn retry_interrupted<T>(
        call: &'static str,
        mut op: impl FnMut() -> io::Result<T>,
    ) -> BackendResult<T> {
        loop {
            match op() {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other.map_err(|e| BackendError::io(call, e)),
            }
        }
    }
}

impl BlockHandle for DeviceHandle {
    fn read(&mut self, buf: &mut [u8]) -> BackendResult<usize> {
        Self::retry_interrupted("read", || self.file.read(buf))
    }

    fn write(&mut self, buf: &[u8]) -> BackendResult<usize> {
        Self::retry_interrupted("write", || self.file.write(buf))
    }

    fn size_bytes(&mut self) -> BackendResult<u64> {
        if self.regular {
            return self
                .file
                .metadata()
                .map(|metadata| metadata.len())
                .map_err(|e| BackendError::io("size_bytes", e));
        }

        let mut size = 0u64;
        // SAFETY: the fd is open for the lifetime of `self.file` and `size`
        // is a valid u64 for the kernel to write into.
        unsafe { ioctl::blkgetsize64(self.file.as_raw_fd(), &mut size) }
            .map_err(|errno| BackendError::status("size_bytes", -(errno as i32)))?;
        Ok(size)
    }

    fn sync(&mut self) -> BackendResult<()> {
        Self::retry_interrupted("sync", || self.file.sync_all())
    }

    fn mmc_command(&mut self, command: &MmcCommand, data: &mut [u8]) -> BackendResult<()> {
        if self.regular {
            return Err(BackendError::failed(
                "mmc_command",
                format!("{} is not an MMC device", self.path.display()),
            ));
        }
        if data.len() < command.data_len() {
            return Err(BackendError::failed(
                "mmc_command",
                format!(
                    "data buffer of {} bytes is smaller than the {} byte transfer",
                    data.len(),
                    command.data_len()
                ),
            ));
        }

        let mut raw = RawMmcIocCmd::new(command, data);
        tracing::debug!(
            "MMC CMD{} arg {:#010x} on {:?}",
            command.opcode,
            command.arg,
            self.path
        );
        // SAFETY: `raw` is a correctly laid out mmc_ioc_cmd and `data_ptr`
        // points into `data`, which outlives the call and holds at least
        // blksz * blocks bytes.
        unsafe { ioctl::mmc_ioc_cmd(self.file.as_raw_fd(), &mut raw) }
            .map_err(|errno| BackendError::status("mmc_command", -(errno as i32)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioc_cmd_matches_kernel_layout() {
        assert_eq!(std::mem::size_of::<RawMmcIocCmd>(), 72);
    }

    #[test]
    fn size_request_encodes_native_size_t() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(ioctl::BLKGETSIZE64 as u32, 0x8008_1272);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(ioctl::BLKGETSIZE64 as u32, 0x8004_1272);
    }

    #[test]
    fn switch_commands_carry_no_data_pointer() {
        let command = MmcCommand::switch_write_byte(163, 1);
        let raw = RawMmcIocCmd::new(&command, &mut []);
        assert_eq!(raw.write_flag, 1);
        assert_eq!(raw.data_ptr, 0);
        assert_eq!(raw.opcode, 6);
    }
}
