//! Command frame layout

use crate::error::{Error, Result};
use crate::media::Action;

/// Device answer to an accepted frame
pub const ACK: u32 = 0x55AA_55AA;

/// Chunk size for streamed payloads
pub const TRANSFER_SIZE: usize = 4096;

/// Encoded frame length
pub const FRAME_SIZE: usize = 24;

/// Execute address of the DDR init image during attach
pub const DDR_INIT_EXEC_ADDR: u32 = 0x2803_0000;

/// Execute address of the USB boot stub during attach
pub const XUSB_EXEC_ADDR: u32 = 0x8700_0000;

/// RAM address the OTP writer helper is loaded to
pub const OTP_WRITER_ADDR: u64 = 0x2000_4000;

/// A command frame: `start:u64, length:u64, action:u32, option:u32`, little-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Start address on the media
    pub start: u64,
    /// Length in bytes
    pub length: u64,
    /// What to do
    pub action: Action,
    /// Action-dependent option bits
    pub option: u32,
}

impl CommandFrame {
    /// Build a frame
    pub fn new(action: Action, start: u64, length: u64, option: u32) -> Self {
        Self {
            start,
            length,
            action,
            option,
        }
    }

    /// Encode to wire bytes
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut out = [0u8; FRAME_SIZE];
        out[0..8].copy_from_slice(&self.start.to_le_bytes());
        out[8..16].copy_from_slice(&self.length.to_le_bytes());
        out[16..20].copy_from_slice(&(self.action as u32).to_le_bytes());
        out[20..24].copy_from_slice(&self.option.to_le_bytes());
        out
    }

    /// Decode wire bytes (used by device emulation)
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != FRAME_SIZE {
            return Err(Error::InvalidParameter(format!(
                "frame must be {} bytes, got {}",
                FRAME_SIZE,
                buf.len()
            )));
        }
        let u64_at = |o: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[o..o + 8]);
            u64::from_le_bytes(b)
        };
        let u32_at = |o: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&buf[o..o + 4]);
            u32::from_le_bytes(b)
        };
        let code = u32_at(16);
        let action = Action::from_code(code)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown action {}", code)))?;
        Ok(Self {
            start: u64_at(0),
            length: u64_at(8),
            action,
            option: u32_at(20),
        })
    }
}

/// Attach upload header: `length:u32, execute_address:u32`
pub fn attach_header(length: u32, exec_addr: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&length.to_le_bytes());
    out[4..8].copy_from_slice(&exec_addr.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let f = CommandFrame::new(Action::Erase, 0x0010_0000, 0x2_0000, 1);
        let b = f.to_bytes();
        assert_eq!(&b[0..8], &[0x00, 0x00, 0x10, 0x00, 0, 0, 0, 0]);
        assert_eq!(&b[8..16], &[0x00, 0x00, 0x02, 0x00, 0, 0, 0, 0]);
        assert_eq!(&b[16..20], &[3, 0, 0, 0]);
        assert_eq!(&b[20..24], &[1, 0, 0, 0]);
        assert_eq!(CommandFrame::parse(&b).unwrap(), f);
    }

    #[test]
    fn test_otp_writer_start_bytes() {
        let f = CommandFrame::new(Action::Load, OTP_WRITER_ADDR, 0, 0);
        assert_eq!(&f.to_bytes()[0..8], b"\x00\x40\x00\x20\x00\x00\x00\x00");
    }

    #[test]
    fn test_attach_header() {
        assert_eq!(
            attach_header(0x1234, XUSB_EXEC_ADDR),
            [0x34, 0x12, 0, 0, 0x00, 0x00, 0x00, 0x87]
        );
        assert_eq!(&attach_header(0, DDR_INIT_EXEC_ADDR)[4..], b"\x00\x00\x03\x28");
    }

    #[test]
    fn test_parse_rejects_bad_action() {
        let mut b = CommandFrame::new(Action::Read, 0, 0, 0).to_bytes();
        b[16] = 9;
        assert!(CommandFrame::parse(&b).is_err());
        assert!(CommandFrame::parse(&b[..20]).is_err());
    }
}
