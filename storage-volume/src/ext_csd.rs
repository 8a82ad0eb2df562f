// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::{BackendError, BackendResult, BlockHandle};
use storage_types::{ExtCsd, MmcCommand};

/// Read the extended CSD register through an open device
pub fn read_ext_csd(handle: &mut dyn BlockHandle) -> BackendResult<ExtCsd> {
    let command = MmcCommand::send_ext_csd();
    let mut data = vec![0u8; command.data_len()];
    handle.mmc_command(&command, &mut data)?;
    ExtCsd::from_bytes(&data).ok_or_else(|| {
        BackendError::failed(
            "mmc_send_ext_csd",
            format!("expected a 512-byte register, got {} bytes", data.len()),
        )
    })
}
