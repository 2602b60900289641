//! Secure-boot header
//!
//! ```text
//! 0   magic " TVN"
//! 4   CRC-32 over bytes 8..end
//! 8   header length minus 8
//! 12  version
//! 16  SPI flash parameters (16 bytes)
//! 32  entry point
//! 36  image count
//! 40  per image: offset:u32, loadaddr:u32, size:u32, type:u32,
//!     signature[64] (raw R || S, or 0xFF when secure boot is off)
//! ```

use crate::crypto::{self, AesKey, EcdsaKey, KeySet, SIGNATURE_SIZE};
use crate::error::{ContainerError, Result};

use super::{check_magic, crc32, field, u32_at, MAGIC};

/// Most images one header can describe
pub const MAX_HEADER_IMAGES: usize = 4;

const FIXED_SIZE: usize = 40;
const DESCRIPTOR_SIZE: usize = 16 + SIGNATURE_SIZE;

/// SPI flash parameters read by the boot ROM
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpiInfo {
    /// Page size in bytes
    pub page_size: u16,
    /// Spare area size in bytes
    pub spare_area: u16,
    /// Pages per erase block
    pub page_per_blk: u16,
    /// Quad read command
    pub quad_read: u8,
    /// Read status command
    pub read_sts: u8,
    /// Write status command
    pub write_sts: u8,
    /// Status register value enabling quad mode
    pub sts_value: u8,
    /// Dummy cycles, first phase
    pub dummy1: u8,
    /// Dummy cycles, second phase
    pub dummy2: u8,
    /// Suspend interval
    pub susp_intvl: u8,
}

impl SpiInfo {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.page_size.to_le_bytes());
        out.extend_from_slice(&self.spare_area.to_le_bytes());
        out.extend_from_slice(&self.page_per_blk.to_le_bytes());
        out.extend_from_slice(&[
            self.quad_read,
            self.read_sts,
            self.write_sts,
            self.sts_value,
            self.dummy1,
            self.dummy2,
            self.susp_intvl,
        ]);
        out.extend_from_slice(&[0xFF; 3]);
    }

    fn read_from(b: &[u8]) -> Self {
        Self {
            page_size: u16::from_le_bytes([b[0], b[1]]),
            spare_area: u16::from_le_bytes([b[2], b[3]]),
            page_per_blk: u16::from_le_bytes([b[4], b[5]]),
            quad_read: b[6],
            read_sts: b[7],
            write_sts: b[8],
            sts_value: b[9],
            dummy1: b[10],
            dummy2: b[11],
            susp_intvl: b[12],
        }
    }
}

/// Fixed header fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderConfig {
    /// Header format version
    pub version: u32,
    /// SPI flash parameters
    pub spi: SpiInfo,
    /// Execution entry point
    pub entry_point: u32,
}

/// One image to describe in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderImage {
    /// File name, used for output naming only
    pub name: String,
    /// Plaintext image
    pub data: Vec<u8>,
    /// Media offset
    pub offset: u32,
    /// Load address
    pub load_addr: u32,
    /// Image type code
    pub image_type: u32,
}

/// Output of [`build_header`]
#[derive(Debug, Clone)]
pub struct BuiltHeader {
    /// Encoded header
    pub header: Vec<u8>,
    /// Ciphertext per image, empty when secure boot is off
    pub encrypted: Vec<Vec<u8>>,
    /// Keys used, present when secure boot is on
    pub keys: Option<KeySet>,
}

/// Build a secure-boot header
///
/// With `secure_boot` set each image is encrypted independently and its
/// ciphertext signed. Missing keys are generated.
pub fn build_header(
    config: &HeaderConfig,
    images: &[HeaderImage],
    secure_boot: bool,
    aes_key: Option<AesKey>,
    signing_key: Option<EcdsaKey>,
) -> Result<BuiltHeader> {
    if images.len() > MAX_HEADER_IMAGES {
        return Err(ContainerError::TooManyImages {
            count: images.len(),
            max: MAX_HEADER_IMAGES,
        }
        .into());
    }

    let keys = secure_boot.then(|| KeySet::resolve(aes_key, signing_key));

    let mut out = Vec::with_capacity(FIXED_SIZE + images.len() * DESCRIPTOR_SIZE);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&config.version.to_le_bytes());
    config.spi.write_to(&mut out);
    out.extend_from_slice(&config.entry_point.to_le_bytes());
    out.extend_from_slice(&[0xFF; 4]);

    let mut encrypted = Vec::new();
    for img in images {
        let size = u32::try_from(img.data.len()).map_err(|_| ContainerError::Oversized {
            field: "image",
            len: img.data.len(),
            max: u32::MAX as usize,
        })?;
        out.extend_from_slice(&img.offset.to_le_bytes());
        out.extend_from_slice(&img.load_addr.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&img.image_type.to_le_bytes());

        match &keys {
            Some(keys) => {
                let cipher = crypto::encrypt(&keys.aes, &img.data);
                out.extend_from_slice(&keys.ecdsa.sign(&cipher)?);
                encrypted.push(cipher);
            }
            None => out.extend_from_slice(&[0xFF; SIGNATURE_SIZE]),
        }
    }

    let len = (out.len() - 8) as u32;
    out[8..12].copy_from_slice(&len.to_le_bytes());
    out[36..40].copy_from_slice(&(images.len() as u32).to_le_bytes());
    let crc = crc32(&out[8..]);
    out[4..8].copy_from_slice(&crc.to_le_bytes());

    Ok(BuiltHeader {
        header: out,
        encrypted,
        keys,
    })
}

/// Image descriptor as stored in a header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Media offset
    pub offset: u32,
    /// Load address
    pub load_addr: u32,
    /// Image size in bytes
    pub size: u32,
    /// Image type code
    pub image_type: u32,
    /// Raw `R || S`, all 0xFF when unsigned
    pub signature: [u8; SIGNATURE_SIZE],
}

impl ImageDescriptor {
    /// Whether a signature is present
    pub fn is_signed(&self) -> bool {
        self.signature.iter().any(|&b| b != 0xFF)
    }

    /// Check this descriptor's signature over `ciphertext`
    pub fn verify(&self, ciphertext: &[u8], public_x: &[u8], public_y: &[u8]) -> Result<bool> {
        if !self.is_signed() {
            return Ok(false);
        }
        crypto::verify(public_x, public_y, ciphertext, &self.signature)
    }
}

/// A decoded secure-boot header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureHeader {
    /// Fixed fields
    pub config: HeaderConfig,
    /// Image descriptors
    pub images: Vec<ImageDescriptor>,
}

/// Decode a header, checking magic, length and CRC
pub fn parse_header(buf: &[u8]) -> Result<SecureHeader> {
    check_magic(buf)?;
    let len = u32_at(buf, 8)? as usize;
    let body = field(buf, 8, len)?;
    let stored = u32_at(buf, 4)?;
    let computed = crc32(body);
    if stored != computed {
        return Err(ContainerError::CrcMismatch { stored, computed }.into());
    }

    let total = len + 8;
    let count = u32_at(buf, 36)? as usize;
    if count > MAX_HEADER_IMAGES {
        return Err(ContainerError::TooManyImages {
            count,
            max: MAX_HEADER_IMAGES,
        }
        .into());
    }
    let needed = FIXED_SIZE + count * DESCRIPTOR_SIZE;
    if needed > total {
        return Err(ContainerError::Truncated {
            needed: needed as u64,
            available: total as u64,
        }
        .into());
    }

    let config = HeaderConfig {
        version: u32_at(buf, 12)?,
        spi: SpiInfo::read_from(field(buf, 16, 16)?),
        entry_point: u32_at(buf, 32)?,
    };

    let images = (0..count)
        .map(|i| {
            let base = FIXED_SIZE + i * DESCRIPTOR_SIZE;
            let mut signature = [0u8; SIGNATURE_SIZE];
            signature.copy_from_slice(field(buf, base + 16, SIGNATURE_SIZE)?);
            Ok(ImageDescriptor {
                offset: u32_at(buf, base)?,
                load_addr: u32_at(buf, base + 4)?,
                size: u32_at(buf, base + 8)?,
                image_type: u32_at(buf, base + 12)?,
                signature,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SecureHeader { config, images })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn config() -> HeaderConfig {
        HeaderConfig {
            version: 0x2021_0101,
            spi: SpiInfo {
                page_size: 2048,
                spare_area: 64,
                page_per_blk: 64,
                quad_read: 0x6B,
                read_sts: 0x05,
                write_sts: 0x01,
                sts_value: 0x40,
                dummy1: 8,
                dummy2: 0,
                susp_intvl: 0,
            },
            entry_point: 0x2800_0000,
        }
    }

    fn image(name: &str, len: usize, load_addr: u32) -> HeaderImage {
        HeaderImage {
            name: name.into(),
            data: (0..len).map(|i| (i * 7) as u8).collect(),
            offset: 0x2_0000,
            load_addr,
            image_type: 1,
        }
    }

    #[test]
    fn test_unsecured_layout() {
        let built = build_header(&config(), &[image("a.bin", 300, 0x2800_0000)], false, None, None)
            .unwrap();
        let h = &built.header;
        assert_eq!(h.len(), 40 + 80);
        assert_eq!(&h[0..4], &MAGIC);
        assert_eq!(u32::from_le_bytes([h[8], h[9], h[10], h[11]]), 112);
        assert_eq!(&h[16..18], &2048u16.to_le_bytes());
        assert_eq!(h[22], 0x6B);
        assert_eq!(&h[29..32], &[0xFF; 3]);
        assert_eq!(&h[36..40], &1u32.to_le_bytes());
        assert_eq!(&h[48..52], &300u32.to_le_bytes());
        assert!(built.encrypted.is_empty());
        assert!(built.keys.is_none());
    }

    #[test]
    fn test_disabled_secure_boot_leaves_ff_signatures() {
        let imgs = [image("a", 10, 0), image("b", 20, 0), image("c", 30, 0)];
        let built = build_header(&config(), &imgs, false, None, None).unwrap();
        let parsed = parse_header(&built.header).unwrap();
        assert_eq!(parsed.images.len(), 3);
        for d in &parsed.images {
            assert_eq!(d.signature, [0xFF; 64]);
            assert!(!d.is_signed());
        }
    }

    #[test]
    fn test_secure_build_signs_ciphertext() {
        let imgs = [image("tfa.bin", 5000, 0x2800_0000), image("tee.bin", 123, 0x8f00_0000)];
        let built = build_header(&config(), &imgs, true, Some([0x5A; 32]), None).unwrap();
        let keys = built.keys.as_ref().unwrap();
        assert_eq!(keys.aes, [0x5A; 32]);
        assert_eq!(built.encrypted.len(), 2);

        let parsed = parse_header(&built.header).unwrap();
        let (x, y) = keys.ecdsa.public_xy();
        for (i, d) in parsed.images.iter().enumerate() {
            assert_eq!(d.size as usize, imgs[i].data.len());
            assert!(d.verify(&built.encrypted[i], &x, &y).unwrap());
            assert_eq!(crypto::decrypt(&keys.aes, &built.encrypted[i]), imgs[i].data);
        }
        // Signatures cover the ciphertext, not the plaintext
        assert!(!parsed.images[0].verify(&imgs[0].data, &x, &y).unwrap());
    }

    #[test]
    fn test_images_encrypted_independently() {
        let same = [image("a", 64, 0), image("b", 64, 0)];
        let built = build_header(&config(), &same, true, None, None).unwrap();
        // Zero IV per image: identical plaintext gives identical ciphertext
        assert_eq!(built.encrypted[0], built.encrypted[1]);
    }

    #[test]
    fn test_parse_roundtrip_fields() {
        let built = build_header(&config(), &[image("a", 1, 0x1234)], false, None, None).unwrap();
        let parsed = parse_header(&built.header).unwrap();
        assert_eq!(parsed.config, config());
        assert_eq!(parsed.images[0].load_addr, 0x1234);
        assert_eq!(parsed.images[0].offset, 0x2_0000);
    }

    #[test]
    fn test_too_many_images() {
        let imgs: Vec<_> = (0..5).map(|i| image("x", i, 0)).collect();
        assert!(matches!(
            build_header(&config(), &imgs, false, None, None),
            Err(Error::Container(ContainerError::TooManyImages { count: 5, max: 4 }))
        ));
    }

    #[test]
    fn test_any_flipped_byte_fails() {
        let built = build_header(&config(), &[image("a", 16, 0)], false, None, None).unwrap();
        for pos in 0..built.header.len() {
            let mut bad = built.header.clone();
            bad[pos] ^= 0x80;
            assert!(parse_header(&bad).is_err(), "byte {} not covered", pos);
        }
    }
}
