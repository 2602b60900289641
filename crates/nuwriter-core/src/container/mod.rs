//! Binary container codecs
//!
//! All formats are little-endian and protected by CRC-32/ISO-HDLC.

pub mod env;
pub mod header;
pub mod pack;

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::{ContainerError, Result};

/// Leading magic shared by pack containers and secure-boot headers (" TVN")
pub const MAGIC: [u8; 4] = [0x20, 0x54, 0x56, 0x4E];

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32/ISO-HDLC of `data`
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

fn u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    let bytes = field(buf, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn u64_at(buf: &[u8], offset: usize) -> Result<u64> {
    let bytes = field(buf, offset, 8)?;
    let mut b = [0u8; 8];
    b.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(b))
}

fn field(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len);
    end.and_then(|end| buf.get(offset..end)).ok_or_else(|| {
        ContainerError::Truncated {
            needed: end.map_or(u64::MAX, |end| end as u64),
            available: buf.len() as u64,
        }
        .into()
    })
}

fn check_magic(buf: &[u8]) -> Result<()> {
    let magic = field(buf, 0, 4)?;
    if magic != MAGIC {
        let mut got = [0u8; 4];
        got.copy_from_slice(magic);
        return Err(ContainerError::BadMagic(got).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_truncated_field() {
        assert!(u32_at(&[1, 2, 3], 0).is_err());
        assert_eq!(u64_at(&[1, 0, 0, 0, 0, 0, 0, 0, 9], 0).unwrap(), 1);
        assert!(check_magic(b" TVN").is_ok());
        assert!(check_magic(b"NVT ").is_err());
    }
}
