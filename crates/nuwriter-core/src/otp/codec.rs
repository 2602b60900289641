//! Binary fuse-map codec
//!
//! ```text
//! 0    boot configuration          4    DPM
//! 8    PLM                         12   MAC0 (6 + 2 pad)
//! 20   MAC1 (6 + 2 pad)            28   deployed password
//! 32   secure region (88)          120  non-secure region (88)
//! 208  9 key records: key[32], size:u32, number:u32, meta:u32
//! 604  OTP encryption flags        608  OTP encryption key (32)
//! 640  reserved                    668  option / lock word
//! ```

use crate::error::{ContainerError, Error, Result};

use super::bootcfg::BootConfig;
use super::model::{
    Dpm, DpmPlm, KeyEntry, KeySlot, OtpEncrypt, OtpModel, OtpOption, Plm, KEY_SIZE, KEY_SLOTS,
    REGION_SIZE,
};

/// Size of an encoded fuse map
pub const OTP_MAP_SIZE: usize = 672;
/// Blocks 1..=7
pub const BASE_SIZE: usize = 208;
/// One key record
pub const KEY_RECORD_SIZE: usize = 44;
/// Size of the device's read-all image
pub const READBACK_SIZE: usize = 352;
/// Read option selecting every block and key
pub const READ_ALL_OPTION: u32 = 0x003F_FF00;
/// Highest boot-configuration version understood
pub const MAX_OTP_VERSION: u32 = 7;

const KEYS_OFFSET: usize = 208;
const ENCRYPT_FLAGS_OFFSET: usize = 604;
const ENCRYPT_KEY_OFFSET: usize = 608;
const OPTION_OFFSET: usize = 668;

fn word(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn put_word(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

fn check_length(raw: &[u8], needed: usize) -> Result<()> {
    if raw.len() < needed {
        return Err(ContainerError::Truncated {
            needed: needed as u64,
            available: raw.len() as u64,
        }
        .into());
    }
    Ok(())
}

fn check_version(boot_word: u32) -> Result<()> {
    let version = boot_word & 0xF;
    if version > MAX_OTP_VERSION {
        return Err(Error::UnsupportedOtpVersion(version));
    }
    Ok(())
}

/// Encode a model into a fuse map and its option word
pub fn encode(model: &OtpModel) -> Result<(Vec<u8>, OtpOption)> {
    let mut out = vec![0u8; OTP_MAP_SIZE];

    if let Some(cfg) = &model.boot_cfg {
        put_word(&mut out, 0, cfg.to_word()?);
    }
    if let Some(dp) = &model.dpm_plm {
        put_word(&mut out, 4, dp.dpm.bits());
        put_word(&mut out, 8, dp.plm.map_or(0, Plm::word));
    }
    if let Some(mac) = &model.mac0 {
        out[12..18].copy_from_slice(mac);
    }
    if let Some(mac) = &model.mac1 {
        out[20..26].copy_from_slice(mac);
    }
    if let Some(pwd) = &model.dply_pwd {
        out[28..32].copy_from_slice(pwd);
    }
    if let Some(sec) = &model.secure {
        out[32..120].copy_from_slice(sec);
    }
    if let Some(nonsec) = &model.non_secure {
        out[120..208].copy_from_slice(nonsec);
    }

    for (slot, entry) in model.keys.iter().enumerate() {
        if let Some(k) = entry {
            if k.size == 0 {
                return Err(Error::InvalidParameter(format!(
                    "key {} has size 0",
                    KeySlot::ALL[slot].name()
                )));
            }
            let base = KEYS_OFFSET + slot * KEY_RECORD_SIZE;
            out[base..base + KEY_SIZE].copy_from_slice(&k.key);
            put_word(&mut out, base + 32, k.size);
            put_word(&mut out, base + 36, slot as u32);
            put_word(&mut out, base + 40, k.meta);
        }
    }

    if let Some(enc) = &model.otp_encrypt {
        put_word(&mut out, ENCRYPT_FLAGS_OFFSET, 1 | ((enc.encrypt as u32) << 1));
        out[ENCRYPT_KEY_OFFSET..ENCRYPT_KEY_OFFSET + KEY_SIZE].copy_from_slice(&enc.key);
    }

    let option = model.presence() | (model.locks & OtpOption::LOCKS);
    put_word(&mut out, OPTION_OFFSET, option.bits());
    Ok((out, option))
}

/// Decode a fuse map; blocks are read only when their presence bit is set
pub fn decode(raw: &[u8]) -> Result<OtpModel> {
    check_length(raw, OTP_MAP_SIZE)?;
    let boot_word = word(raw, 0);
    check_version(boot_word)?;

    let option = OtpOption::from_bits_truncate(word(raw, OPTION_OFFSET));
    let has = |flag| option.contains(flag);

    let mut keys = [None; KEY_SLOTS];
    if has(OtpOption::KEY) {
        for (slot, entry) in keys.iter_mut().enumerate() {
            let base = KEYS_OFFSET + slot * KEY_RECORD_SIZE;
            let size = word(raw, base + 32);
            if size != 0 {
                *entry = Some(KeyEntry {
                    key: array(raw, base),
                    size,
                    meta: word(raw, base + 40),
                });
            }
        }
    }

    let flags = word(raw, ENCRYPT_FLAGS_OFFSET);
    let otp_encrypt = (flags & 1 != 0).then(|| OtpEncrypt {
        encrypt: flags & 2 != 0,
        key: array(raw, ENCRYPT_KEY_OFFSET),
    });

    Ok(OtpModel {
        boot_cfg: has(OtpOption::BOOT_CFG).then(|| BootConfig::from_word(boot_word)),
        dpm_plm: has(OtpOption::DPM_PLM).then(|| DpmPlm {
            dpm: Dpm::from_bits_truncate(word(raw, 4)),
            plm: Plm::from_word(word(raw, 8)),
        }),
        mac0: has(OtpOption::MAC0).then(|| array(raw, 12)),
        mac1: has(OtpOption::MAC1).then(|| array(raw, 20)),
        dply_pwd: has(OtpOption::DPLY_PWD).then(|| array(raw, 28)),
        secure: has(OtpOption::SECURE).then(|| array(raw, 32)),
        non_secure: has(OtpOption::NON_SECURE).then(|| array(raw, 120)),
        keys,
        otp_encrypt,
        locks: option & OtpOption::LOCKS,
    })
}

/// Wire payload for the OTP writer and the option word to send with it
///
/// Blocks 1..=7 at their map offsets, then one key record per present slot
/// in slot order.
pub fn program_payload(model: &OtpModel) -> Result<(Vec<u8>, u32)> {
    let (map, option) = encode(model)?;
    let mut out = map[..BASE_SIZE].to_vec();
    for (slot, entry) in model.keys.iter().enumerate() {
        if entry.is_some() {
            let base = KEYS_OFFSET + slot * KEY_RECORD_SIZE;
            out.extend_from_slice(&map[base..base + KEY_RECORD_SIZE]);
        }
    }
    log::debug!(
        "OTP payload {} bytes, option 0x{:08X}",
        out.len(),
        option.bits()
    );
    Ok((out, option.bits()))
}

/// Decode the device's read-all image
///
/// All-zero areas are treated as unprogrammed. Lock state is not part of
/// this image.
pub fn decode_readback(raw: &[u8]) -> Result<OtpModel> {
    check_length(raw, READBACK_SIZE)?;
    let boot_word = word(raw, 0);
    check_version(boot_word)?;

    fn nonzero<const N: usize>(raw: &[u8], offset: usize) -> Option<[u8; N]> {
        let a: [u8; N] = array(raw, offset);
        a.iter().any(|&b| b != 0).then_some(a)
    }

    let dpm = word(raw, 4);
    let plm = word(raw, 8);

    let mut keys = [None; KEY_SLOTS];
    let layout = [
        (KeySlot::Huk0, 208, 16),
        (KeySlot::Huk1, 224, 16),
        (KeySlot::Huk2, 240, 16),
        (KeySlot::Key3, 256, 32),
        (KeySlot::Key4, 288, 32),
        (KeySlot::Key5, 320, 32),
    ];
    for (slot, offset, len) in layout {
        let area = &raw[offset..offset + len];
        if area.iter().any(|&b| b != 0) {
            let mut key = [0u8; KEY_SIZE];
            key[..len].copy_from_slice(area);
            keys[slot.index()] = Some(KeyEntry {
                key,
                size: (len * 8) as u32,
                meta: 0,
            });
        }
    }

    Ok(OtpModel {
        boot_cfg: (boot_word != 0).then(|| BootConfig::from_word(boot_word)),
        dpm_plm: (dpm != 0 || plm != 0).then(|| DpmPlm {
            dpm: Dpm::from_bits_truncate(dpm),
            plm: Plm::from_word(plm),
        }),
        mac0: nonzero::<6>(raw, 12),
        mac1: nonzero::<6>(raw, 20),
        dply_pwd: nonzero::<4>(raw, 28),
        secure: nonzero::<REGION_SIZE>(raw, 32),
        non_secure: nonzero::<REGION_SIZE>(raw, 120),
        keys,
        otp_encrypt: None,
        locks: OtpOption::empty(),
    })
}

/// Reject an update that touches a block or key already locked in `current`
pub fn ensure_writable(current: &OtpModel, update: &OtpModel) -> Result<()> {
    let locked = current.locks;
    let blocks = [
        (update.boot_cfg.is_some(), OtpOption::BOOT_CFG_LOCK, "boot_cfg"),
        (update.mac0.is_some(), OtpOption::MAC0_LOCK, "mac0"),
        (update.mac1.is_some(), OtpOption::MAC1_LOCK, "mac1"),
        (update.dply_pwd.is_some(), OtpOption::DPLY_PWD_LOCK, "dplypwd"),
    ];
    for (touched, lock, name) in blocks {
        if touched && locked.contains(lock) {
            return Err(Error::OtpLocked(name.into()));
        }
    }
    for slot in KeySlot::ALL {
        if update.key(slot).is_some() && locked.contains(OtpOption::key_lock(slot.index())) {
            return Err(Error::OtpLocked(slot.name().into()));
        }
    }
    Ok(())
}
