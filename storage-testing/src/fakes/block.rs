use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storage_contracts::{BackendError, BackendResult, BlockDeviceIo, BlockHandle, OpenMode};
use storage_types::mmc::{EXT_CSD_SANITIZE_START, MMC_SEND_EXT_CSD, MMC_SWITCH};
use storage_types::{ExtCsd, MmcCommand};

/// EIO, the status an injected ioctl failure reports
const INJECTED_FAILURE: i32 = -5;

#[derive(Debug, Default)]
struct MemoryDevice {
    data: Vec<u8>,
    ext_csd: Option<ExtCsd>,
    max_transfer: Option<usize>,
    stalls: u32,
    fail_mmc: bool,
    fail_switch: bool,
    fail_size: bool,
    fail_sync: bool,
    syncs: usize,
    commands: Vec<MmcCommand>,
    open_handles: usize,
    opens: usize,
}

impl MemoryDevice {
    /// Bytes one transfer moves, after stalls and the transfer cap
    fn transfer_len(&mut self, requested: usize, position: usize) -> usize {
        if self.stalls > 0 {
            self.stalls -= 1;
            return 0;
        }
        let remaining = self.data.len().saturating_sub(position);
        let len = requested.min(remaining);
        self.max_transfer.map_or(len, |max| len.min(max))
    }

    fn mmc_command(&mut self, command: &MmcCommand, data: &mut [u8]) -> BackendResult<()> {
        self.commands.push(*command);
        if self.fail_mmc {
            return Err(BackendError::status("mmc_command", INJECTED_FAILURE));
        }
        let Some(ext_csd) = self.ext_csd.as_mut() else {
            return Err(BackendError::failed("mmc_command", "not an MMC device"));
        };

        match command.opcode {
            MMC_SEND_EXT_CSD => {
                let bytes = ext_csd.as_bytes();
                let len = data.len().min(bytes.len());
                data[..len].copy_from_slice(&bytes[..len]);
            }
            MMC_SWITCH if self.fail_switch => {
                return Err(BackendError::status("mmc_command", INJECTED_FAILURE));
            }
            MMC_SWITCH => {
                let (Some(index), Some(value)) = (command.switch_index(), command.switch_value())
                else {
                    return Err(BackendError::failed("mmc_command", "malformed switch"));
                };
                if index == EXT_CSD_SANITIZE_START {
                    self.data.fill(0);
                } else {
                    ext_csd.set_byte(index, value);
                }
            }
            opcode => {
                return Err(BackendError::failed(
                    "mmc_command",
                    format!("unsupported opcode {opcode}"),
                ));
            }
        }
        Ok(())
    }
}

/// Handle to one in-memory device for arranging and inspecting it
#[derive(Debug, Clone)]
pub struct DeviceRef {
    inner: Arc<Mutex<MemoryDevice>>,
}

impl DeviceRef {
    fn device(&self) -> MutexGuard<'_, MemoryDevice> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.device().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.device().data.is_empty()
    }

    pub fn data(&self) -> Vec<u8> {
        self.device().data.clone()
    }

    pub fn fill(&self, byte: u8) {
        self.device().data.fill(byte);
    }

    pub fn peek(&self, offset: usize) -> u8 {
        self.device().data[offset]
    }

    pub fn poke(&self, offset: usize, byte: u8) {
        self.device().data[offset] = byte;
    }

    /// Cap every read and write at `max` bytes
    pub fn set_max_transfer(&self, max: Option<usize>) {
        self.device().max_transfer = max;
    }

    /// Make the next `count` transfers move nothing
    pub fn set_stalls(&self, count: u32) {
        self.device().stalls = count;
    }

    pub fn fail_mmc_commands(&self, fail: bool) {
        self.device().fail_mmc = fail;
    }

    /// Fail register writes while reads keep working
    pub fn fail_switch_commands(&self, fail: bool) {
        self.device().fail_switch = fail;
    }

    pub fn fail_size_query(&self, fail: bool) {
        self.device().fail_size = fail;
    }

    /// Report a deferred write error on the next flush
    pub fn fail_sync(&self, fail: bool) {
        self.device().fail_sync = fail;
    }

    pub fn syncs(&self) -> usize {
        self.device().syncs
    }

    pub fn ext_csd(&self) -> Option<ExtCsd> {
        self.device().ext_csd.clone()
    }

    pub fn commands(&self) -> Vec<MmcCommand> {
        self.device().commands.clone()
    }

    /// Handles currently open on this device
    pub fn open_handles(&self) -> usize {
        self.device().open_handles
    }

    /// Handles ever opened on this device
    pub fn opens(&self) -> usize {
        self.device().opens
    }
}

/// Block devices backed by byte vectors, keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockDevices {
    devices: Arc<Mutex<HashMap<PathBuf, DeviceRef>>>,
}

impl MemoryBlockDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain block device of `size` bytes, initially filled with 0xAA
    pub fn add(&self, path: impl Into<PathBuf>, size: usize) -> DeviceRef {
        self.insert(path.into(), size, None)
    }

    /// An eMMC device answering MMC commands from `ext_csd`
    pub fn add_emmc(&self, path: impl Into<PathBuf>, size: usize, ext_csd: ExtCsd) -> DeviceRef {
        self.insert(path.into(), size, Some(ext_csd))
    }

    fn insert(&self, path: PathBuf, size: usize, ext_csd: Option<ExtCsd>) -> DeviceRef {
        let device = DeviceRef {
            inner: Arc::new(Mutex::new(MemoryDevice {
                data: vec![0xAA; size],
                ext_csd,
                ..MemoryDevice::default()
            })),
        };
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, device.clone());
        device
    }
}

impl BlockDeviceIo for MemoryBlockDevices {
    fn open(&self, path: &Path, mode: OpenMode) -> BackendResult<Box<dyn BlockHandle>> {
        let device = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::io("open", io::Error::from(io::ErrorKind::NotFound)))?;
        {
            let mut state = device.device();
            state.open_handles += 1;
            state.opens += 1;
        }
        Ok(Box::new(MemoryHandle {
            device,
            mode,
            position: 0,
        }))
    }
}

struct MemoryHandle {
    device: DeviceRef,
    mode: OpenMode,
    position: usize,
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.device.device().open_handles -= 1;
    }
}

impl BlockHandle for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> BackendResult<usize> {
        if !self.mode.readable() {
            return Err(BackendError::io("read", io::Error::from_raw_os_error(9)));
        }
        let mut device = self.device.device();
        let len = device.transfer_len(buf.len(), self.position);
        buf[..len].copy_from_slice(&device.data[self.position..self.position + len]);
        self.position += len;
        Ok(len)
    }

    fn write(&mut self, buf: &[u8]) -> BackendResult<usize> {
        if !self.mode.writable() {
            return Err(BackendError::io("write", io::Error::from_raw_os_error(9)));
        }
        let mut device = self.device.device();
        let len = device.transfer_len(buf.len(), self.position);
        device.data[self.position..self.position + len].copy_from_slice(&buf[..len]);
        self.position += len;
        Ok(len)
    }

    fn sync(&mut self) -> BackendResult<()> {
        let mut device = self.device.device();
        if device.fail_sync {
            return Err(BackendError::status("sync", INJECTED_FAILURE));
        }
        device.syncs += 1;
        Ok(())
    }

    fn size_bytes(&mut self) -> BackendResult<u64> {
        let device = self.device.device();
        if device.fail_size {
            return Err(BackendError::status("size_bytes", INJECTED_FAILURE));
        }
        Ok(device.data.len() as u64)
    }

    fn mmc_command(&mut self, command: &MmcCommand, data: &mut [u8]) -> BackendResult<()> {
        self.device.device().mmc_command(command, data)
    }
}
