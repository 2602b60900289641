//! Pack container
//!
//! ```text
//! 0   magic " TVN"
//! 4   CRC-32 over bytes 8..
//! 8   image count
//! 12  reserved (0xFF)
//! 16  per image: length:u64, offset:u64, type:u32, reserved:u32, payload,
//!     0xFF fill to the next 16-byte boundary
//! ```
//!
//! The codec does not know about media alignment. Offsets are checked by the
//! protocol engine when the container is programmed.

use crate::error::{ContainerError, Result};

use super::{check_magic, crc32, field, u32_at, u64_at, MAGIC};

const PACK_HEADER_SIZE: usize = 16;
const ENTRY_HEADER_SIZE: usize = 24;
const FILL: u8 = 0xFF;

/// One image to place in a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackInput {
    /// Image bytes
    pub data: Vec<u8>,
    /// Target address on the media
    pub offset: u64,
    /// Image type code
    pub image_type: u32,
}

/// Build a pack container
pub fn pack(images: &[PackInput]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        PACK_HEADER_SIZE
            + images
                .iter()
                .map(|i| ENTRY_HEADER_SIZE + i.data.len() + 15)
                .sum::<usize>(),
    );
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&[FILL; 12]);

    for img in images {
        out.extend_from_slice(&(img.data.len() as u64).to_le_bytes());
        out.extend_from_slice(&img.offset.to_le_bytes());
        out.extend_from_slice(&img.image_type.to_le_bytes());
        out.extend_from_slice(&[FILL; 4]);
        out.extend_from_slice(&img.data);
        out.resize(out.len() + padding(img.data.len()), FILL);
    }

    out[8..12].copy_from_slice(&(images.len() as u32).to_le_bytes());
    let crc = crc32(&out[8..]);
    out[4..8].copy_from_slice(&crc.to_le_bytes());
    out
}

/// Fill after a payload so the next entry starts on a 16-byte boundary
fn padding(len: usize) -> usize {
    (16 - ((len + 8) & 0xF)) & 0xF
}

/// Attributes of one packed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackEntry {
    /// Payload length
    pub length: u64,
    /// Target address on the media
    pub offset: u64,
    /// Image type code
    pub image_type: u32,
    data_start: usize,
}

/// A validated view over a pack container
#[derive(Debug, Clone)]
pub struct PackImage<'a> {
    buf: &'a [u8],
    entries: Vec<PackEntry>,
}

impl<'a> PackImage<'a> {
    /// Validate magic, CRC and every entry's bounds
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        check_magic(buf)?;
        let stored = u32_at(buf, 4)?;
        let computed = crc32(field(buf, 8, buf.len().saturating_sub(8))?);
        if stored != computed {
            return Err(ContainerError::CrcMismatch { stored, computed }.into());
        }

        let count = u32_at(buf, 8)? as usize;
        let mut entries = Vec::new();
        let mut cursor = PACK_HEADER_SIZE;
        for _ in 0..count {
            let length = u64_at(buf, cursor)?;
            let offset = u64_at(buf, cursor + 8)?;
            let image_type = u32_at(buf, cursor + 16)?;
            let data_start = cursor + ENTRY_HEADER_SIZE;
            let data_end = match (data_start as u64).checked_add(length) {
                Some(end) if end <= buf.len() as u64 => end as usize,
                end => {
                    return Err(ContainerError::Truncated {
                        needed: end.unwrap_or(u64::MAX),
                        available: buf.len() as u64,
                    }
                    .into())
                }
            };
            entries.push(PackEntry {
                length,
                offset,
                image_type,
                data_start,
            });
            cursor = data_end + padding(data_end - data_start);
        }

        log::debug!("pack container with {} image(s)", entries.len());
        Ok(Self { buf, entries })
    }

    /// Number of images
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// All entries in container order
    pub fn entries(&self) -> &[PackEntry] {
        &self.entries
    }

    /// `(length, offset, type)` of image `index`
    pub fn entry_attr(&self, index: usize) -> Option<(u64, u64, u32)> {
        self.entries
            .get(index)
            .map(|e| (e.length, e.offset, e.image_type))
    }

    /// Up to `size` bytes of image `index` starting at `byte_offset`
    ///
    /// The slice is cut at the end of the image.
    pub fn entry_content(&self, index: usize, byte_offset: u64, size: u64) -> Result<&'a [u8]> {
        let entry = self.entry(index)?;
        if byte_offset > entry.length {
            return Err(ContainerError::Truncated {
                needed: byte_offset,
                available: entry.length,
            }
            .into());
        }
        let len = size.min(entry.length - byte_offset) as usize;
        let start = entry.data_start + byte_offset as usize;
        Ok(&self.buf[start..start + len])
    }

    /// Whole payload of image `index`
    pub fn entry_data(&self, index: usize) -> Result<&'a [u8]> {
        let length = self.entry(index)?.length;
        self.entry_content(index, 0, length)
    }

    fn entry(&self, index: usize) -> Result<&PackEntry> {
        self.entries.get(index).ok_or_else(|| {
            ContainerError::Truncated {
                needed: index as u64 + 1,
                available: self.entries.len() as u64,
            }
            .into()
        })
    }
}

/// Parse a container for image-by-image access
pub fn unpack(buf: &[u8]) -> Result<PackImage<'_>> {
    PackImage::parse(buf)
}

/// Concatenate images at absolute offsets with 0xFF between them
///
/// No header or CRC is written. Offsets must not go below the end of the
/// previous image.
pub fn stuff(images: &[PackInput]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for img in images {
        let cursor = out.len() as u64;
        if img.offset < cursor {
            return Err(ContainerError::OffsetNotAscending {
                offset: img.offset,
                cursor,
            }
            .into());
        }
        out.resize(img.offset as usize, FILL);
        out.extend_from_slice(&img.data);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn input(data: &[u8], offset: u64, image_type: u32) -> PackInput {
        PackInput {
            data: data.to_vec(),
            offset,
            image_type,
        }
    }

    fn sample() -> Vec<PackInput> {
        vec![
            input(&[0x11; 100], 0x0, 4),
            input(&[0x22; 8], 0x2_0000, 2),
            input(&(0..=255u8).collect::<Vec<_>>(), 0x10_0000, 0),
        ]
    }

    #[test]
    fn test_layout() {
        let buf = pack(&[input(&[0xAA; 8], 0x1000, 1)]);
        assert_eq!(&buf[0..4], &MAGIC);
        assert_eq!(&buf[8..12], &1u32.to_le_bytes());
        assert_eq!(&buf[12..16], &[0xFF; 4]);
        assert_eq!(&buf[16..24], &8u64.to_le_bytes());
        assert_eq!(&buf[24..32], &0x1000u64.to_le_bytes());
        assert_eq!(&buf[32..36], &1u32.to_le_bytes());
        // 8-byte payload ends exactly on a boundary
        assert_eq!(buf.len(), 48);
        assert_eq!(crc32(&buf[8..]), u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]));
    }

    #[test]
    fn test_entries_start_on_16_byte_boundary() {
        let buf = pack(&sample());
        assert_eq!(buf.len() % 16, 0);
        let image = unpack(&buf).unwrap();
        for e in image.entries() {
            assert_eq!(e.data_start % 16, 8);
        }
    }

    #[test]
    fn test_unpack_matches_inputs() {
        let images = sample();
        let buf = pack(&images);
        let image = unpack(&buf).unwrap();
        assert_eq!(image.entry_count(), images.len());
        for (i, img) in images.iter().enumerate() {
            assert_eq!(
                image.entry_attr(i),
                Some((img.data.len() as u64, img.offset, img.image_type))
            );
            assert_eq!(image.entry_data(i).unwrap(), &img.data[..]);
        }
        assert_eq!(image.entry_attr(3), None);
    }

    #[test]
    fn test_entry_content_streaming() {
        let buf = pack(&sample());
        let image = unpack(&buf).unwrap();
        assert_eq!(image.entry_content(2, 250, 100).unwrap(), &[250, 251, 252, 253, 254, 255]);
        assert_eq!(image.entry_content(2, 16, 4).unwrap(), &[16, 17, 18, 19]);
        assert!(image.entry_content(2, 257, 1).is_err());
    }

    #[test]
    fn test_any_flipped_byte_fails_crc() {
        let buf = pack(&sample());
        for pos in (4..buf.len()).step_by(7) {
            let mut bad = buf.clone();
            bad[pos] ^= 0x01;
            assert!(PackImage::parse(&bad).is_err(), "byte {} not covered", pos);
        }
    }

    #[test]
    fn test_bad_magic_and_truncation() {
        let mut buf = pack(&sample());
        buf[0] = b'X';
        assert!(matches!(
            PackImage::parse(&buf),
            Err(Error::Container(ContainerError::BadMagic(_)))
        ));

        // Declare more payload than present and re-seal the CRC
        let mut buf = pack(&[input(&[1; 16], 0, 0)]);
        buf[16..24].copy_from_slice(&4096u64.to_le_bytes());
        let crc = crc32(&buf[8..]);
        buf[4..8].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            PackImage::parse(&buf),
            Err(Error::Container(ContainerError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_length_past_address_space_is_truncated() {
        let mut buf = pack(&[input(&[7; 64], 0, 0)]);
        buf[16..24].copy_from_slice(&(u64::MAX - 10).to_le_bytes());
        let crc = crc32(&buf[8..]);
        buf[4..8].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            PackImage::parse(&buf),
            Err(Error::Container(ContainerError::Truncated {
                needed: u64::MAX,
                ..
            }))
        ));
    }

    #[test]
    fn test_empty_pack() {
        let buf = pack(&[]);
        assert_eq!(buf.len(), 16);
        assert_eq!(unpack(&buf).unwrap().entry_count(), 0);
    }

    #[test]
    fn test_stuff_fills_gaps() {
        let out = stuff(&[input(b"ab", 0, 0), input(b"cd", 4, 0), input(b"ef", 6, 0)]).unwrap();
        assert_eq!(out, b"ab\xFF\xFFcdef");
    }

    #[test]
    fn test_stuff_rejects_overlap() {
        let err = stuff(&[input(&[0; 8], 0, 0), input(&[0; 2], 4, 0)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Container(ContainerError::OffsetNotAscending { offset: 4, cursor: 8 })
        ));
    }
}
