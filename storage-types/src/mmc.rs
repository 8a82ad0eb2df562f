// SPDX-License-Identifier: GPL-3.0-only

//! eMMC command and extended CSD register definitions
//!
//! Offsets and flag values follow the JEDEC eMMC register map and the Linux
//! `mmc_ioc_cmd` response flag encoding.

use std::fmt;

/// Size of the extended CSD register in bytes
pub const EXT_CSD_SIZE: usize = 512;

pub const EXT_CSD_BKOPS_EN: usize = 163;
pub const EXT_CSD_SANITIZE_START: usize = 165;
pub const EXT_CSD_ERASE_GROUP_DEF: usize = 175;
pub const EXT_CSD_SEC_COUNT: usize = 212;
pub const EXT_CSD_ERASE_TIMEOUT_MULT: usize = 223;
pub const EXT_CSD_HC_ERASE_GRP_SIZE: usize = 224;
pub const EXT_CSD_SEC_FEATURE_SUPPORT: usize = 231;
pub const EXT_CSD_PRE_EOL_INFO: usize = 267;
pub const EXT_CSD_DEVICE_LIFE_TIME_EST_TYP_A: usize = 268;
pub const EXT_CSD_DEVICE_LIFE_TIME_EST_TYP_B: usize = 269;
pub const EXT_CSD_BKOPS_SUPPORT: usize = 502;

pub const EXT_CSD_MANUAL_BKOPS_MASK: u8 = 0x01;
pub const EXT_CSD_SEC_SANITIZE: u8 = 0x40;

/// High-capacity erase groups are multiples of 512 KiB
pub const HC_ERASE_GROUP_UNIT: u64 = 512 * 1024;

pub const MMC_SWITCH: u32 = 6;
pub const MMC_SEND_EXT_CSD: u32 = 8;
pub const MMC_SWITCH_MODE_WRITE_BYTE: u32 = 0x03;
pub const EXT_CSD_CMD_SET_NORMAL: u32 = 1;

pub const MMC_RSP_PRESENT: u32 = 1 << 0;
pub const MMC_RSP_CRC: u32 = 1 << 2;
pub const MMC_RSP_BUSY: u32 = 1 << 3;
pub const MMC_RSP_OPCODE: u32 = 1 << 4;
pub const MMC_CMD_AC: u32 = 0 << 5;
pub const MMC_CMD_ADTC: u32 = 1 << 5;
pub const MMC_RSP_SPI_S1: u32 = 1 << 7;
pub const MMC_RSP_SPI_BUSY: u32 = 1 << 10;

pub const MMC_RSP_R1: u32 = MMC_RSP_PRESENT | MMC_RSP_CRC | MMC_RSP_OPCODE;
pub const MMC_RSP_R1B: u32 = MMC_RSP_PRESENT | MMC_RSP_CRC | MMC_RSP_OPCODE | MMC_RSP_BUSY;
pub const MMC_RSP_SPI_R1: u32 = MMC_RSP_SPI_S1;
pub const MMC_RSP_SPI_R1B: u32 = MMC_RSP_SPI_S1 | MMC_RSP_SPI_BUSY;

/// A single command submitted to the card through the MMC block ioctl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmcCommand {
    pub opcode: u32,
    pub arg: u32,
    pub flags: u32,
    pub write: bool,
    pub block_size: u32,
    pub blocks: u32,
    pub cmd_timeout_ms: u32,
}

impl MmcCommand {
    /// CMD8: read the 512-byte extended CSD into the data buffer
    pub fn send_ext_csd() -> Self {
        Self {
            opcode: MMC_SEND_EXT_CSD,
            arg: 0,
            flags: MMC_RSP_SPI_R1 | MMC_RSP_R1 | MMC_CMD_ADTC,
            write: false,
            block_size: EXT_CSD_SIZE as u32,
            blocks: 1,
            cmd_timeout_ms: 0,
        }
    }

    /// CMD6: write one byte of the extended CSD
    pub fn switch_write_byte(index: usize, value: u8) -> Self {
        let arg = (MMC_SWITCH_MODE_WRITE_BYTE << 24)
            | ((index as u32 & 0xff) << 16)
            | (u32::from(value) << 8)
            | EXT_CSD_CMD_SET_NORMAL;
        Self {
            opcode: MMC_SWITCH,
            arg,
            flags: MMC_RSP_SPI_R1B | MMC_RSP_R1B | MMC_CMD_AC,
            write: true,
            block_size: 0,
            blocks: 0,
            cmd_timeout_ms: 0,
        }
    }

    pub fn with_timeout_ms(mut self, cmd_timeout_ms: u32) -> Self {
        self.cmd_timeout_ms = cmd_timeout_ms;
        self
    }

    /// Bytes of data this command transfers
    pub fn data_len(&self) -> usize {
        self.block_size as usize * self.blocks as usize
    }

    /// Register index targeted by a switch command
    pub fn switch_index(&self) -> Option<usize> {
        (self.opcode == MMC_SWITCH).then(|| ((self.arg >> 16) & 0xff) as usize)
    }

    /// Value written by a switch command
    pub fn switch_value(&self) -> Option<u8> {
        (self.opcode == MMC_SWITCH).then(|| ((self.arg >> 8) & 0xff) as u8)
    }
}

/// Contents of the eMMC extended CSD register
#[derive(Clone, PartialEq, Eq)]
pub struct ExtCsd(Box<[u8; EXT_CSD_SIZE]>);

impl ExtCsd {
    pub fn zeroed() -> Self {
        Self(Box::new([0u8; EXT_CSD_SIZE]))
    }

    /// Copy a register image; anything other than exactly 512 bytes is rejected
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; EXT_CSD_SIZE] = bytes.try_into().ok()?;
        Some(Self(Box::new(array)))
    }

    pub fn as_bytes(&self) -> &[u8; EXT_CSD_SIZE] {
        &self.0
    }

    pub fn byte(&self, index: usize) -> u8 {
        self.0[index]
    }

    pub fn set_byte(&mut self, index: usize, value: u8) {
        self.0[index] = value;
    }

    pub fn erase_group_def(&self) -> bool {
        self.0[EXT_CSD_ERASE_GROUP_DEF] & 0x01 != 0
    }

    pub fn erase_timeout_mult(&self) -> u8 {
        self.0[EXT_CSD_ERASE_TIMEOUT_MULT]
    }

    pub fn hc_erase_grp_size(&self) -> u8 {
        self.0[EXT_CSD_HC_ERASE_GRP_SIZE]
    }

    /// Device capacity in 512-byte sectors
    pub fn sec_count(&self) -> u32 {
        let start = EXT_CSD_SEC_COUNT;
        u32::from_le_bytes([
            self.0[start],
            self.0[start + 1],
            self.0[start + 2],
            self.0[start + 3],
        ])
    }

    pub fn sanitize_supported(&self) -> bool {
        self.0[EXT_CSD_SEC_FEATURE_SUPPORT] & EXT_CSD_SEC_SANITIZE != 0
    }

    pub fn bkops_supported(&self) -> bool {
        self.0[EXT_CSD_BKOPS_SUPPORT] & 0x01 != 0
    }

    pub fn manual_bkops_enabled(&self) -> bool {
        self.0[EXT_CSD_BKOPS_EN] & EXT_CSD_MANUAL_BKOPS_MASK != 0
    }

    pub fn pre_eol_info(&self) -> u8 {
        self.0[EXT_CSD_PRE_EOL_INFO]
    }

    /// Remaining life derived from the worse of the two wear estimates
    ///
    /// The estimate counts used life in 10% steps (0x01 = 0-10% used,
    /// 0x0A = 90-100% used, 0x0B = exceeded). Zero means "not reported".
    pub fn life_remaining_percent(&self) -> Option<u8> {
        let worst = self.0[EXT_CSD_DEVICE_LIFE_TIME_EST_TYP_A]
            .max(self.0[EXT_CSD_DEVICE_LIFE_TIME_EST_TYP_B]);
        match worst {
            0 => None,
            1..=10 => Some(100 - (worst - 1) * 10),
            _ => Some(0),
        }
    }
}

impl fmt::Debug for ExtCsd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtCsd")
            .field("sec_count", &self.sec_count())
            .field("erase_group_def", &self.erase_group_def())
            .field("hc_erase_grp_size", &self.hc_erase_grp_size())
            .field("erase_timeout_mult", &self.erase_timeout_mult())
            .field("sanitize_supported", &self.sanitize_supported())
            .field("bkops_supported", &self.bkops_supported())
            .field("manual_bkops_enabled", &self.manual_bkops_enabled())
            .finish()
    }
}
