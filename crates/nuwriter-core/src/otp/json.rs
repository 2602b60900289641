//! JSON interchange for OTP content
//!
//! The JSON form is what users edit. It is validated here and converted to
//! an [`OtpModel`]; the binary codec never sees loosely typed values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::IntOrString;
use crate::error::{ContainerError, Error, Result};

use super::bootcfg::{BootConfig, BootOption, BootSource, PageSize};
use super::model::{
    Dpm, DpmPlm, KeyEntry, KeySlot, OtpEncrypt, OtpModel, OtpOption, Plm, KEY_SIZE, META_NAMES,
    REGION_SIZE,
};

/// `boot_cfg` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct BootCfgJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posotp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qspiclk: Option<String>,
    #[serde(default, alias = "wdt0en", skip_serializing_if = "Option::is_none")]
    pub wdt1en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uart0en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd0bken: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsiimg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsidbg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootsrc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secboot: Option<String>,
}

/// `dpm_plm` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpmPlmJson {
    /// Flag name to "1"; a value of "0" leaves the flag clear
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dpm: BTreeMap<String, serde_json::Value>,
    /// Lifecycle stage name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plm: Option<String>,
}

/// One key-store entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyJson {
    /// Key as hex, at most 32 bytes
    pub key: String,
    /// Key size in bits, defaults to the length of `key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<IntOrString>,
    /// Metadata name or number, defaults to 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
}

/// `otpencrypt` object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpEncryptJson {
    /// "enable" or "disable"
    pub encrypt: String,
    /// Key as hex
    pub key: String,
}

/// Top-level OTP JSON document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct OtpJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_cfg: Option<BootCfgJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpm_plm: Option<DpmPlmJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac0: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dplypwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonsec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub huk0: Option<KeyJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub huk1: Option<KeyJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub huk2: Option<KeyJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key3: Option<KeyJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key4: Option<KeyJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key5: Option<KeyJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publicx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publicy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aeskey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otpencrypt: Option<OtpEncryptJson>,
    /// Names of blocks and keys to lock
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lock: Vec<String>,
}

fn invalid(field: &str, value: &str) -> Error {
    Error::InvalidParameter(format!("{}: unexpected value {:?}", field, value))
}

/// Map a two-valued string onto a flag; `None` keeps the default
fn toggle(field: &str, value: Option<&str>, on: &[&str], off: &[&str]) -> Result<Option<bool>> {
    match value {
        None => Ok(None),
        Some(v) if on.contains(&v) => Ok(Some(true)),
        Some(v) if off.contains(&v) => Ok(Some(false)),
        Some(v) => Err(invalid(field, v)),
    }
}

fn enabled(field: &str, value: Option<&str>) -> Result<Option<bool>> {
    toggle(field, value, &["enable"], &["disable"])
}

fn disabled(field: &str, value: Option<&str>) -> Result<Option<bool>> {
    toggle(field, value, &["disable"], &["enable"])
}

fn on_off(set: bool, on: &str, off: &str) -> Option<String> {
    Some(if set { on } else { off }.to_string())
}

/// Decode hex into a zero-padded array, at most `N` bytes (exactly `N` if `exact`)
fn hex_array<const N: usize>(field: &'static str, text: &str, exact: bool) -> Result<[u8; N]> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect();
    let bytes =
        hex::decode(&cleaned).map_err(|e| Error::InvalidParameter(format!("{}: {}", field, e)))?;
    if bytes.len() > N {
        return Err(ContainerError::Oversized {
            field,
            len: bytes.len(),
            max: N,
        }
        .into());
    }
    if exact && bytes.len() != N {
        return Err(Error::InvalidParameter(format!(
            "{} must be {} bytes, got {}",
            field,
            N,
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(&bytes);
    Ok(out)
}

fn parse_meta(text: &str) -> Result<u32> {
    if let Some((_, value)) = META_NAMES.iter().find(|(name, _)| *name == text) {
        return Ok(*value);
    }
    let value = crate::config::parse_int(text)?;
    u32::try_from(value).map_err(|_| invalid("meta", text))
}

fn meta_name(meta: u32) -> String {
    META_NAMES
        .iter()
        .find(|(_, value)| *value == meta)
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| format!("0x{:08X}", meta))
}

impl BootCfgJson {
    fn to_config(&self) -> Result<BootConfig> {
        let source = match self.bootsrc.as_deref() {
            None => BootSource::Spi,
            Some(s) => BootSource::from_name(s).ok_or_else(|| invalid("bootsrc", s))?,
        };
        let usb = source == BootSource::Usb;

        let page = match (usb, self.page.as_deref()) {
            (true, _) => None,
            (false, None) => Some(PageSize::Ignore),
            (false, Some(p)) => Some(PageSize::from_name(p).ok_or_else(|| invalid("page", p))?),
        };
        let option = match (usb, self.option.as_deref()) {
            (true, _) => None,
            (false, None) => source.default_option(),
            (false, Some(o)) => {
                Some(BootOption::from_name(source, o).ok_or_else(|| invalid("option", o))?)
            }
        };

        let delay = match &self.delay {
            None => 0,
            Some(d) => {
                let v = d.value()?;
                u8::try_from(v)
                    .ok()
                    .filter(|v| *v <= 15)
                    .ok_or_else(|| invalid("delay", &v.to_string()))?
            }
        };

        Ok(BootConfig {
            power_on_from_otp: enabled("posotp", self.posotp.as_deref())?.unwrap_or(false),
            qspi_clock_50mhz: toggle(
                "qspiclk",
                self.qspiclk.as_deref(),
                &["50mhz", "60mhz"],
                &["30mhz"],
            )?
            .unwrap_or(false),
            watchdog: enabled("wdt1en", self.wdt1en.as_deref())?.unwrap_or(false),
            uart_debug_disabled: disabled("uart0en", self.uart0en.as_deref())?.unwrap_or(false),
            sd_backup_boot: enabled("sd0bken", self.sd0bken.as_deref())?.unwrap_or(false),
            tsi_image: enabled("tsiimg", self.tsiimg.as_deref())?.unwrap_or(false),
            tsi_debug_disabled: disabled("tsidbg", self.tsidbg.as_deref())?.unwrap_or(false),
            io_1v8: toggle("voltage", self.voltage.as_deref(), &["1.8v"], &["3.3v"])?
                .unwrap_or(false),
            source,
            page,
            option,
            delay,
            secure_boot: enabled("secboot", self.secboot.as_deref())?.unwrap_or(true),
        })
    }

    fn from_config(c: &BootConfig) -> Self {
        Self {
            posotp: on_off(c.power_on_from_otp, "enable", "disable"),
            qspiclk: on_off(c.qspi_clock_50mhz, "50mhz", "30mhz"),
            wdt1en: on_off(c.watchdog, "enable", "disable"),
            uart0en: on_off(c.uart_debug_disabled, "disable", "enable"),
            sd0bken: on_off(c.sd_backup_boot, "enable", "disable"),
            tsiimg: on_off(c.tsi_image, "enable", "disable"),
            tsidbg: on_off(c.tsi_debug_disabled, "disable", "enable"),
            voltage: on_off(c.io_1v8, "1.8v", "3.3v"),
            bootsrc: Some(c.source.name().to_string()),
            page: c.page.map(|p| p.name().to_string()),
            option: c.option.map(|o| o.name().to_string()),
            delay: Some(IntOrString::Int(c.delay as u64)),
            secboot: on_off(c.secure_boot, "enable", "disable"),
        }
    }
}

fn dpm_value_set(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(s) => s != "0",
        serde_json::Value::Number(n) => n.as_u64() != Some(0),
        serde_json::Value::Bool(b) => *b,
        _ => true,
    }
}

impl DpmPlmJson {
    fn to_model(&self) -> Result<DpmPlm> {
        let mut dpm = Dpm::empty();
        for (name, value) in &self.dpm {
            let flag = Dpm::by_name(name).ok_or_else(|| invalid("dpm", name))?;
            if dpm_value_set(value) {
                dpm |= flag;
            }
        }
        let plm = match self.plm.as_deref() {
            None => None,
            Some(p) => Some(Plm::from_name(p).ok_or_else(|| invalid("plm", p))?),
        };
        Ok(DpmPlm { dpm, plm })
    }

    fn from_model(dp: &DpmPlm) -> Self {
        let dpm = Dpm::NAMES
            .iter()
            .filter(|(_, flag)| dp.dpm.contains(*flag))
            .map(|(name, _)| (name.to_string(), serde_json::Value::from("1")))
            .collect();
        Self {
            dpm,
            plm: dp.plm.map(|p| p.name().to_string()),
        }
    }
}

impl KeyJson {
    fn to_entry(&self, slot: KeySlot) -> Result<KeyEntry> {
        let key = hex_array::<KEY_SIZE>(slot.name(), &self.key, false)?;
        let default_size = (self.key.trim().len() / 2 * 8) as u64;
        let size = match &self.size {
            Some(s) => s.value()?,
            None => default_size,
        };
        let size = u32::try_from(size).map_err(|_| invalid("size", &size.to_string()))?;
        let meta = match self.meta.as_deref() {
            Some(m) => parse_meta(m)?,
            None => 0,
        };
        Ok(KeyEntry { key, size, meta })
    }

    fn from_entry(entry: &KeyEntry) -> Self {
        Self {
            key: hex::encode_upper(entry.key),
            size: Some(IntOrString::Int(entry.size as u64)),
            meta: Some(meta_name(entry.meta)),
        }
    }
}

/// Boot ROM slots hold a full 256-bit value with fixed metadata
fn fixed_entry(slot: KeySlot, text: &str) -> Result<KeyEntry> {
    Ok(KeyEntry {
        key: hex_array::<KEY_SIZE>(slot.name(), text, false)?,
        size: 256,
        meta: slot.fixed_meta().unwrap_or(0),
    })
}

impl TryFrom<&OtpJson> for OtpModel {
    type Error = Error;

    fn try_from(j: &OtpJson) -> Result<Self> {
        let mut model = OtpModel {
            boot_cfg: j.boot_cfg.as_ref().map(BootCfgJson::to_config).transpose()?,
            dpm_plm: j.dpm_plm.as_ref().map(DpmPlmJson::to_model).transpose()?,
            mac0: j.mac0.as_deref().map(|t| hex_array("mac0", t, true)).transpose()?,
            mac1: j.mac1.as_deref().map(|t| hex_array("mac1", t, true)).transpose()?,
            dply_pwd: j
                .dplypwd
                .as_deref()
                .map(|t| hex_array("dplypwd", t, true))
                .transpose()?,
            secure: j
                .sec
                .as_deref()
                .map(|t| hex_array::<REGION_SIZE>("sec", t, false))
                .transpose()?,
            non_secure: j
                .nonsec
                .as_deref()
                .map(|t| hex_array::<REGION_SIZE>("nonsec", t, false))
                .transpose()?,
            ..Default::default()
        };

        let slots = [&j.huk0, &j.huk1, &j.huk2, &j.key3, &j.key4, &j.key5];
        for (slot, key) in KeySlot::ALL.iter().zip(slots) {
            if let Some(k) = key {
                model.keys[slot.index()] = Some(k.to_entry(*slot)?);
            }
        }
        let fixed = [
            (KeySlot::PublicX, &j.publicx),
            (KeySlot::PublicY, &j.publicy),
            (KeySlot::AesKey, &j.aeskey),
        ];
        for (slot, text) in fixed {
            if let Some(t) = text {
                model.keys[slot.index()] = Some(fixed_entry(slot, t)?);
            }
        }

        if let Some(e) = &j.otpencrypt {
            model.otp_encrypt = Some(OtpEncrypt {
                encrypt: enabled("otpencrypt", Some(e.encrypt.as_str()))?.unwrap_or(false),
                key: hex_array("otpencrypt", &e.key, false)?,
            });
        }

        for name in &j.lock {
            let (_, flag) = OtpOption::LOCK_NAMES
                .iter()
                .find(|(n, _)| *n == name.as_str())
                .ok_or_else(|| invalid("lock", name))?;
            model.locks |= *flag;
        }

        Ok(model)
    }
}

impl From<&OtpModel> for OtpJson {
    fn from(m: &OtpModel) -> Self {
        let key = |slot: KeySlot| m.key(slot).map(KeyJson::from_entry);
        let fixed = |slot: KeySlot| m.key(slot).map(|k| hex::encode_upper(k.key));
        Self {
            boot_cfg: m.boot_cfg.as_ref().map(BootCfgJson::from_config),
            dpm_plm: m.dpm_plm.as_ref().map(DpmPlmJson::from_model),
            mac0: m.mac0.map(hex::encode_upper),
            mac1: m.mac1.map(hex::encode_upper),
            dplypwd: m.dply_pwd.map(hex::encode_upper),
            sec: m.secure.map(hex::encode_upper),
            nonsec: m.non_secure.map(hex::encode_upper),
            huk0: key(KeySlot::Huk0),
            huk1: key(KeySlot::Huk1),
            huk2: key(KeySlot::Huk2),
            key3: key(KeySlot::Key3),
            key4: key(KeySlot::Key4),
            key5: key(KeySlot::Key5),
            publicx: fixed(KeySlot::PublicX),
            publicy: fixed(KeySlot::PublicY),
            aeskey: fixed(KeySlot::AesKey),
            otpencrypt: m.otp_encrypt.map(|e| OtpEncryptJson {
                encrypt: if e.encrypt { "enable" } else { "disable" }.to_string(),
                key: hex::encode_upper(e.key),
            }),
            lock: OtpOption::LOCK_NAMES
                .iter()
                .filter(|(_, flag)| m.locks.contains(*flag))
                .map(|(name, _)| name.to_string())
                .collect(),
        }
    }
}

/// Parse an OTP JSON document
pub fn from_json(text: &str) -> Result<OtpModel> {
    let doc: OtpJson = serde_json::from_str(text)?;
    OtpModel::try_from(&doc)
}

/// Render a model as pretty-printed JSON
pub fn to_json(model: &OtpModel) -> Result<String> {
    Ok(serde_json::to_string_pretty(&OtpJson::from(model))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::codec;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "boot_cfg": {
            "posotp": "enable",
            "qspiclk": "30mhz",
            "wdt0en": "enable",
            "uart0en": "disable",
            "sd0bken": "disable",
            "tsiimg": "disable",
            "tsidbg": "enable",
            "bootsrc": "nand",
            "page": "4k",
            "option": "t24",
            "secboot": "disable"
        },
        "dpm_plm": {"dpm": {"extlock": "1", "m4dsdis": "1", "a35sdsdis": "0"}, "plm": "deploy"},
        "mac0": "00:11:22:33:44:55",
        "dplypwd": "DEADBEEF",
        "huk0": {"key": "00112233445566778899AABBCCDDEEFF", "size": "0x80", "meta": "0x0"},
        "key3": {"key": "0102", "meta": "sha256-cpu-readable"},
        "publicx": "60FED4BA255A9D31C961EB74C6356D68C049B8923B61FA6CE669622E60F29FB6",
        "lock": ["mac0", "huk0"]
    }"#;

    #[test]
    fn test_parse_document() {
        let m = from_json(DOC).unwrap();

        let cfg = m.boot_cfg.unwrap();
        assert!(cfg.power_on_from_otp && cfg.watchdog && cfg.uart_debug_disabled);
        assert!(!cfg.qspi_clock_50mhz && !cfg.tsi_debug_disabled);
        assert_eq!(cfg.source, BootSource::Nand);
        assert_eq!(cfg.page, Some(PageSize::K4));
        assert_eq!(cfg.option, Some(BootOption::NandT24));
        assert!(!cfg.secure_boot);
        assert!(m.disables_secure_boot());

        let dp = m.dpm_plm.unwrap();
        assert_eq!(dp.dpm, Dpm::EXT_LOCK | Dpm::M4_DS_DIS);
        assert_eq!(dp.plm, Some(Plm::Deploy));

        assert_eq!(m.mac0, Some([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(m.dply_pwd, Some([0xDE, 0xAD, 0xBE, 0xEF]));

        let huk0 = m.key(KeySlot::Huk0).unwrap();
        assert_eq!(huk0.size, 128);
        assert_eq!(huk0.key[15], 0xFF);
        assert_eq!(huk0.key[16], 0);

        let key3 = m.key(KeySlot::Key3).unwrap();
        assert_eq!(key3.size, 16);
        assert_eq!(key3.meta, 0x8001_0615);

        let px = m.key(KeySlot::PublicX).unwrap();
        assert_eq!(px.size, 256);
        assert_eq!(px.meta, 0x8004_0611);

        assert_eq!(m.locks, OtpOption::MAC0_LOCK | OtpOption::KEY0_LOCK);
    }

    #[test]
    fn test_usb_source_ignores_page_and_option() {
        let m = from_json(r#"{"boot_cfg": {"bootsrc": "usb", "page": "8k", "option": "t12"}}"#)
            .unwrap();
        let cfg = m.boot_cfg.unwrap();
        assert_eq!(cfg.page, None);
        assert_eq!(cfg.option, None);
        assert_eq!(cfg.to_word().unwrap(), 3 << 10);
    }

    #[test]
    fn test_defaults_follow_source() {
        let m = from_json(r#"{"boot_cfg": {"bootsrc": "sd"}}"#).unwrap();
        let cfg = m.boot_cfg.unwrap();
        assert_eq!(cfg.option, Some(BootOption::Sd0));
        assert_eq!(cfg.page, Some(PageSize::Ignore));
        assert!(cfg.secure_boot);
    }

    #[test]
    fn test_rejects_bad_values() {
        for doc in [
            r#"{"boot_cfg": {"bootsrc": "floppy"}}"#,
            r#"{"boot_cfg": {"bootsrc": "spi", "option": "t12"}}"#,
            r#"{"boot_cfg": {"posotp": "maybe"}}"#,
            r#"{"boot_cfg": {"delay": 16}}"#,
            r#"{"dpm_plm": {"plm": "retired"}}"#,
            r#"{"dpm_plm": {"dpm": {"bogus": "1"}}}"#,
            r#"{"mac0": "0011"}"#,
            r#"{"huk1": {"key": "zz"}}"#,
            r#"{"lock": ["everything"]}"#,
        ] {
            assert!(from_json(doc).is_err(), "{}", doc);
        }
    }

    #[test]
    fn test_oversized_region() {
        let doc = format!(r#"{{"sec": "{}"}}"#, "00".repeat(REGION_SIZE + 1));
        assert!(matches!(
            from_json(&doc),
            Err(Error::Container(ContainerError::Oversized { field: "sec", .. }))
        ));
    }

    #[test]
    fn test_model_round_trips_through_json() {
        let m = from_json(DOC).unwrap();
        let text = to_json(&m).unwrap();
        assert_eq!(from_json(&text).unwrap(), m);
    }

    #[test]
    fn test_json_to_fuse_map() {
        let m = from_json(DOC).unwrap();
        let (map, option) = codec::encode(&m).unwrap();
        assert!(option.contains(OtpOption::BOOT_CFG | OtpOption::MAC0 | OtpOption::KEY));
        assert!(option.contains(OtpOption::MAC0_LOCK));
        assert_eq!(codec::decode(&map).unwrap(), m);
    }

    #[test]
    fn test_export_names() {
        let m = OtpModel {
            boot_cfg: Some(BootConfig::default()),
            otp_encrypt: Some(OtpEncrypt {
                encrypt: true,
                key: [0xAB; KEY_SIZE],
            }),
            ..Default::default()
        };
        let j = OtpJson::from(&m);
        let cfg = j.boot_cfg.unwrap();
        assert_eq!(cfg.bootsrc.as_deref(), Some("spi"));
        assert_eq!(cfg.option.as_deref(), Some("spinand1"));
        assert_eq!(cfg.secboot.as_deref(), Some("enable"));
        assert_eq!(j.otpencrypt.unwrap().encrypt, "enable");
        assert!(j.lock.is_empty());
    }
}
