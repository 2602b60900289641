//! U-Boot environment blob
//!
//! `crc:u32` over the rest of the block, then `key=value` lines each ended
//! by NUL, one extra NUL, and 0xFF up to the block size.

use crate::error::{ContainerError, Result};

use super::{crc32, u32_at};

/// Encode `lines` into a block of `block_size` bytes
pub fn encode_env<S: AsRef<str>>(lines: &[S], block_size: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; 4];
    for line in lines {
        out.extend_from_slice(line.as_ref().as_bytes());
        out.push(0);
    }
    out.push(0);

    if out.len() > block_size {
        return Err(ContainerError::Oversized {
            field: "environment",
            len: out.len(),
            max: block_size,
        }
        .into());
    }
    out.resize(block_size, 0xFF);

    let crc = crc32(&out[4..]);
    out[0..4].copy_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Encode the text of an environment file, one variable per line
pub fn encode_env_text(text: &str, block_size: usize) -> Result<Vec<u8>> {
    let lines: Vec<&str> = text.lines().collect();
    encode_env(&lines, block_size)
}

/// Check the CRC and return the variable lines
pub fn decode_env(block: &[u8]) -> Result<Vec<String>> {
    let stored = u32_at(block, 0)?;
    let computed = crc32(&block[4..]);
    if stored != computed {
        return Err(ContainerError::CrcMismatch { stored, computed }.into());
    }

    Ok(block[4..]
        .split(|&b| b == 0)
        .take_while(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect())
}
