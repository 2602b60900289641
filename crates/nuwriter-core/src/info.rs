//! Device information block
//!
//! After attach the responder reports the geometry of every media it has
//! probed in one little-endian structure.

use std::fmt;

use crate::error::{ContainerError, Result};
use crate::media::Media;
use crate::transport::BlockAlign;

/// Size of the raw info structure in bytes
pub const INFO_SIZE: usize = 76;

/// Decoded device information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DeviceInfo {
    // NAND
    pub page_per_blk: u32,
    pub page_size: u32,
    pub blk_cnt: u32,
    pub bad_blk_cnt: u32,
    pub oob_size: u32,
    pub usr_cfg0: u32,
    // SPI NOR
    pub spi_id: u32,
    pub usr_cfg1: u32,
    pub quad_cmd: u8,
    pub read_sts_cmd: u8,
    pub write_sts_cmd: u8,
    pub sts_val: u8,
    pub dummy_byte: u32,
    // eMMC
    pub blk: u32,
    pub rsv: u32,
    // SPI NAND
    pub use_cfg2: u32,
    pub snand_id: u32,
    pub snand_page_size: u16,
    pub snand_oob: u16,
    pub snand_quad_cmd: u8,
    pub snand_read_sts_cmd: u8,
    pub snand_write_sts_cmd: u8,
    pub snand_sts_val: u8,
    pub snand_dummy_byte: u32,
    pub snand_blk_cnt: u32,
    pub snand_page_per_blk: u32,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(b)
    }
}

impl DeviceInfo {
    /// Decode the raw structure returned by `Transport::get_info`
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < INFO_SIZE {
            return Err(ContainerError::Truncated {
                needed: INFO_SIZE as u64,
                available: raw.len() as u64,
            }
            .into());
        }
        let mut c = Cursor { buf: raw, pos: 0 };
        Ok(Self {
            page_per_blk: c.u32(),
            page_size: c.u32(),
            blk_cnt: c.u32(),
            bad_blk_cnt: c.u32(),
            oob_size: c.u32(),
            usr_cfg0: c.u32(),
            spi_id: c.u32(),
            usr_cfg1: c.u32(),
            quad_cmd: c.u8(),
            read_sts_cmd: c.u8(),
            write_sts_cmd: c.u8(),
            sts_val: c.u8(),
            dummy_byte: c.u32(),
            blk: c.u32(),
            rsv: c.u32(),
            use_cfg2: c.u32(),
            snand_id: c.u32(),
            snand_page_size: c.u16(),
            snand_oob: c.u16(),
            snand_quad_cmd: c.u8(),
            snand_read_sts_cmd: c.u8(),
            snand_write_sts_cmd: c.u8(),
            snand_sts_val: c.u8(),
            snand_dummy_byte: c.u32(),
            snand_blk_cnt: c.u32(),
            snand_page_per_blk: c.u32(),
        })
    }

    /// Encode back into the raw layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(INFO_SIZE);
        for v in [
            self.page_per_blk,
            self.page_size,
            self.blk_cnt,
            self.bad_blk_cnt,
            self.oob_size,
            self.usr_cfg0,
            self.spi_id,
            self.usr_cfg1,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&[
            self.quad_cmd,
            self.read_sts_cmd,
            self.write_sts_cmd,
            self.sts_val,
        ]);
        for v in [
            self.dummy_byte,
            self.blk,
            self.rsv,
            self.use_cfg2,
            self.snand_id,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.snand_page_size.to_le_bytes());
        out.extend_from_slice(&self.snand_oob.to_le_bytes());
        out.extend_from_slice(&[
            self.snand_quad_cmd,
            self.snand_read_sts_cmd,
            self.snand_write_sts_cmd,
            self.snand_sts_val,
        ]);
        for v in [
            self.snand_dummy_byte,
            self.snand_blk_cnt,
            self.snand_page_per_blk,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Erase block sizes derived from the page geometry
    pub fn block_align(&self) -> BlockAlign {
        BlockAlign {
            nand: self.page_size.wrapping_mul(self.page_per_blk),
            spinand: (self.snand_page_size as u32).wrapping_mul(self.snand_page_per_blk),
        }
    }

    /// Usable capacity of a media in bytes, when the device reports it
    pub fn capacity(&self, media: Media) -> Option<u64> {
        let size = match media {
            Media::Nand => self.page_size as u64 * self.page_per_blk as u64 * self.blk_cnt as u64,
            Media::SpiNand => {
                self.snand_page_size as u64
                    * self.snand_page_per_blk as u64
                    * self.snand_blk_cnt as u64
            }
            Media::SdEmmc => self.blk as u64 * 512,
            _ => 0,
        };
        (size != 0).then_some(size)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== NAND ====")?;
        writeln!(f, "Page per block: {}", self.page_per_blk)?;
        writeln!(f, "Page size: {}", self.page_size)?;
        writeln!(f, "Block per flash: {}", self.blk_cnt)?;
        writeln!(f, "Bad block count: {}", self.bad_blk_cnt)?;
        writeln!(f, "Spare size: {}", self.oob_size)?;
        writeln!(f, "Is user config: {}", self.usr_cfg0)?;
        writeln!(f, "==== SPI NOR ====")?;
        writeln!(f, "ID: 0x{:X}", self.spi_id)?;
        writeln!(f, "Is user config: {}", self.usr_cfg1)?;
        writeln!(f, "Quad read cmd: 0x{:02X}", self.quad_cmd)?;
        writeln!(f, "Read sts cmd: 0x{:02X}", self.read_sts_cmd)?;
        writeln!(f, "Write sts cmd: 0x{:02X}", self.write_sts_cmd)?;
        writeln!(f, "Sts value: 0x{:02X}", self.sts_val)?;
        writeln!(f, "Dummy byte: {}", self.dummy_byte)?;
        writeln!(f, "==== eMMC ====")?;
        writeln!(f, "Block: {}", self.blk)?;
        writeln!(f, "Reserved: {}", self.rsv)?;
        writeln!(f, "==== SPI NAND ====")?;
        writeln!(f, "Is user config: {}", self.use_cfg2)?;
        writeln!(f, "ID: 0x{:X}", self.snand_id)?;
        writeln!(f, "Page size: {}", self.snand_page_size)?;
        writeln!(f, "Spare size: {}", self.snand_oob)?;
        writeln!(f, "Quad read cmd: 0x{:02X}", self.snand_quad_cmd)?;
        writeln!(f, "Read sts cmd: 0x{:02X}", self.snand_read_sts_cmd)?;
        writeln!(f, "Write sts cmd: 0x{:02X}", self.snand_write_sts_cmd)?;
        writeln!(f, "Sts value: 0x{:02X}", self.snand_sts_val)?;
        writeln!(f, "Dummy byte: {}", self.snand_dummy_byte)?;
        writeln!(f, "Block per flash: {}", self.snand_blk_cnt)?;
        write!(f, "Page per block: {}", self.snand_page_per_blk)
    }
}
