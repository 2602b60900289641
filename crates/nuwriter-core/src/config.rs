//! JSON configuration files
//!
//! Integers may be given as JSON numbers or as strings in `0x` hex or
//! decimal. Image types may be given by code or by name.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};

use crate::container::env::encode_env_text;
use crate::container::header::{build_header, BuiltHeader, HeaderConfig, HeaderImage, SpiInfo};
use crate::container::pack::PackInput;
use crate::crypto::{self, KeySet, SIGNATURE_SIZE};
use crate::error::{Error, Result};
use crate::media::ImageType;

/// Parse `0x`-prefixed hex or decimal
pub fn parse_int(text: &str) -> Result<u64> {
    let t = text.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => t.parse(),
    };
    parsed.map_err(|_| Error::InvalidParameter(format!("not an integer: {:?}", text)))
}

/// Integer written either as a JSON number or as a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    /// JSON number
    Int(u64),
    /// `0x` hex or decimal string
    Str(String),
}

impl IntOrString {
    /// Numeric value
    pub fn value(&self) -> Result<u64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Str(s) => parse_int(s),
        }
    }
}

fn de_int<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let value = IntOrString::deserialize(d)?
        .value()
        .map_err(D::Error::custom)?;
    T::try_from(value).map_err(|_| D::Error::custom(format!("{} out of range", value)))
}

fn de_image_type<'de, D>(d: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match IntOrString::deserialize(d)? {
        IntOrString::Int(v) => u32::try_from(v).map_err(D::Error::custom),
        IntOrString::Str(s) => match parse_int(&s) {
            Ok(v) => u32::try_from(v).map_err(D::Error::custom),
            Err(_) => Ok(ImageType::from_name(&s) as u32),
        },
    }
}

fn de_yes_no<'de, D>(d: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Str(String),
    }
    Ok(match Flag::deserialize(d)? {
        Flag::Bool(b) => b,
        Flag::Str(s) => matches!(s.as_str(), "yes" | "enable" | "true"),
    })
}

/// Read and parse a JSON file
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

/// One entry of a pack or stuff configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackImageConfig {
    /// Image file
    pub file: PathBuf,
    /// Target address
    #[serde(deserialize_with = "de_int")]
    pub offset: u64,
    /// Image type
    #[serde(rename = "type", default, deserialize_with = "de_image_type")]
    pub image_type: u32,
}

/// `{"image": [...]}` for pack and stuff
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackConfig {
    /// Images in container order
    pub image: Vec<PackImageConfig>,
}

impl PackConfig {
    /// Read every image file
    pub fn load_images(&self) -> Result<Vec<PackInput>> {
        self.image
            .iter()
            .map(|img| {
                Ok(PackInput {
                    data: read_file(&img.file)?,
                    offset: img.offset,
                    image_type: img.image_type,
                })
            })
            .collect()
    }
}

/// SPI flash parameters of a header section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[allow(missing_docs)]
pub struct SpiInfoConfig {
    #[serde(deserialize_with = "de_int")]
    pub pagesize: u16,
    #[serde(deserialize_with = "de_int")]
    pub sparearea: u16,
    #[serde(deserialize_with = "de_int")]
    pub pageperblk: u16,
    #[serde(deserialize_with = "de_int")]
    pub quadread: u8,
    #[serde(deserialize_with = "de_int")]
    pub readsts: u8,
    #[serde(deserialize_with = "de_int")]
    pub writests: u8,
    #[serde(deserialize_with = "de_int")]
    pub stsvalue: u8,
    #[serde(deserialize_with = "de_int")]
    pub dummy1: u8,
    #[serde(deserialize_with = "de_int")]
    pub dummy2: u8,
    #[serde(deserialize_with = "de_int")]
    pub suspintvl: u8,
}

impl From<SpiInfoConfig> for SpiInfo {
    fn from(c: SpiInfoConfig) -> Self {
        SpiInfo {
            page_size: c.pagesize,
            spare_area: c.sparearea,
            page_per_blk: c.pageperblk,
            quad_read: c.quadread,
            read_sts: c.readsts,
            write_sts: c.writests,
            sts_value: c.stsvalue,
            dummy1: c.dummy1,
            dummy2: c.dummy2,
            susp_intvl: c.suspintvl,
        }
    }
}

/// One image of a header section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderImageConfig {
    /// Image file
    pub file: PathBuf,
    /// Media offset
    #[serde(deserialize_with = "de_int")]
    pub offset: u32,
    /// Load address
    #[serde(deserialize_with = "de_int")]
    pub loadaddr: u32,
    /// Image type
    #[serde(rename = "type", deserialize_with = "de_image_type")]
    pub image_type: u32,
}

/// `header` section of a convert configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderSection {
    /// Header version
    #[serde(deserialize_with = "de_int")]
    pub version: u32,
    /// SPI flash parameters
    pub spiinfo: SpiInfoConfig,
    /// Entry point
    #[serde(deserialize_with = "de_int")]
    pub entrypoint: u32,
    /// Encrypt and sign the images
    #[serde(default, deserialize_with = "de_yes_no")]
    pub secureboot: bool,
    /// AES key as hex, generated when absent
    #[serde(default)]
    pub aeskey: Option<String>,
    /// ECDSA private key as hex, generated when absent
    #[serde(default)]
    pub ecdsakey: Option<String>,
    /// Images described by the header
    pub image: Vec<HeaderImageConfig>,
}

/// `env` section of a convert configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvSection {
    /// Text file, one variable per line
    pub file: PathBuf,
    /// Block size of the output
    #[serde(deserialize_with = "de_int")]
    pub blksize: usize,
}

/// One file of a data section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataImageConfig {
    /// Image file
    pub file: PathBuf,
}

/// `data` section of a convert configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataSection {
    /// AES key as hex, generated when absent
    #[serde(default)]
    pub aeskey: Option<String>,
    /// ECDSA private key as hex, generated when absent
    #[serde(default)]
    pub ecdsakey: Option<String>,
    /// Files to encrypt and sign
    pub image: Vec<DataImageConfig>,
}

/// Convert configuration; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConvertConfig {
    /// Secure-boot header
    #[serde(default)]
    pub header: Option<HeaderSection>,
    /// U-Boot environment
    #[serde(default)]
    pub env: Option<EnvSection>,
    /// Encrypted and signed misc images
    #[serde(default)]
    pub data: Option<DataSection>,
}

/// Encrypted and signed copy of one data file
#[derive(Debug, Clone)]
pub struct DataOutput {
    /// Base name of the input file
    pub name: String,
    /// Ciphertext
    pub encrypted: Vec<u8>,
    /// Raw `R || S` over the ciphertext
    pub signature: [u8; SIGNATURE_SIZE],
}

/// Everything a convert run produces
#[derive(Debug, Clone, Default)]
pub struct ConvertOutput {
    /// Header and per-image ciphertexts, with the image names
    pub header: Option<(BuiltHeader, Vec<String>)>,
    /// Encoded environment block
    pub env: Option<Vec<u8>>,
    /// Data outputs and their keys
    pub data: Option<(KeySet, Vec<DataOutput>)>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn resolve_keys(aes: Option<&str>, ecdsa: Option<&str>) -> Result<KeySet> {
    let aes = aes.map(crypto::parse_aes_key).transpose()?;
    let ecdsa = ecdsa.map(crypto::EcdsaKey::from_hex).transpose()?;
    Ok(KeySet::resolve(aes, ecdsa))
}

impl ConvertConfig {
    /// Build every configured output
    pub fn build(&self) -> Result<ConvertOutput> {
        let mut out = ConvertOutput::default();

        if let Some(h) = &self.header {
            let config = HeaderConfig {
                version: h.version,
                spi: h.spiinfo.into(),
                entry_point: h.entrypoint,
            };
            let images = h
                .image
                .iter()
                .map(|img| {
                    Ok(HeaderImage {
                        name: file_name(&img.file),
                        data: read_file(&img.file)?,
                        offset: img.offset,
                        load_addr: img.loadaddr,
                        image_type: img.image_type,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let (aes, ecdsa) = if h.secureboot {
                let keys = resolve_keys(h.aeskey.as_deref(), h.ecdsakey.as_deref())?;
                (Some(keys.aes), Some(keys.ecdsa))
            } else {
                (None, None)
            };
            let built = build_header(&config, &images, h.secureboot, aes, ecdsa)?;
            let names = images.into_iter().map(|i| i.name).collect();
            out.header = Some((built, names));
        }

        if let Some(e) = &self.env {
            let text = fs::read_to_string(&e.file)?;
            out.env = Some(encode_env_text(&text, e.blksize)?);
        }

        if let Some(d) = &self.data {
            let keys = resolve_keys(d.aeskey.as_deref(), d.ecdsakey.as_deref())?;
            let mut files = Vec::with_capacity(d.image.len());
            for img in &d.image {
                let encrypted = crypto::encrypt(&keys.aes, &read_file(&img.file)?);
                let signature = keys.ecdsa.sign(&encrypted)?;
                files.push(DataOutput {
                    name: file_name(&img.file),
                    encrypted,
                    signature,
                });
            }
            out.data = Some((keys, files));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::header::parse_header;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_int(" 42 ").unwrap(), 42);
        assert_eq!(parse_int("0XfF").unwrap(), 255);
        assert!(parse_int("0xZZ").is_err());
        assert!(parse_int("").is_err());
    }

    #[test]
    fn test_pack_config_accepts_strings_and_numbers() {
        let cfg: PackConfig = serde_json::from_str(
            r#"{"image": [
                {"file": "a.bin", "offset": "0x20000", "type": 2},
                {"file": "b.bin", "offset": 4096, "type": "tee"},
                {"file": "c.bin", "offset": "65536"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(cfg.image[0].offset, 0x2_0000);
        assert_eq!(cfg.image[0].image_type, 2);
        assert_eq!(cfg.image[1].offset, 4096);
        assert_eq!(cfg.image[1].image_type, ImageType::Tee as u32);
        assert_eq!(cfg.image[2].image_type, 0);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let r: std::result::Result<SpiInfoConfig, _> = serde_json::from_str(
            r#"{"pagesize": "0x10000", "sparearea": 0, "pageperblk": 0, "quadread": 0,
                "readsts": 0, "writests": 0, "stsvalue": 0, "dummy1": 0, "dummy2": 0,
                "suspintvl": 0}"#,
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_pack_config_loads_files() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("img.bin");
        fs::write(&img, [1u8, 2, 3]).unwrap();
        let cfg_path = dir.path().join("pack.json");
        let mut f = fs::File::create(&cfg_path).unwrap();
        write!(
            f,
            r#"{{"image": [{{"file": {:?}, "offset": "0x1000", "type": "uboot"}}]}}"#,
            img.display().to_string()
        )
        .unwrap();
        drop(f);

        let cfg: PackConfig = load_json(&cfg_path).unwrap();
        let inputs = cfg.load_images().unwrap();
        assert_eq!(
            inputs,
            vec![PackInput {
                data: vec![1, 2, 3],
                offset: 0x1000,
                image_type: 2
            }]
        );
    }

    #[test]
    fn test_convert_builds_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let bl2 = dir.path().join("bl2.bin");
        let env = dir.path().join("env.txt");
        let misc = dir.path().join("misc.bin");
        fs::write(&bl2, vec![0x42u8; 1000]).unwrap();
        fs::write(&env, "bootdelay=1\n").unwrap();
        fs::write(&misc, b"payload").unwrap();

        let json = serde_json::json!({
            "header": {
                "version": "0x20210101",
                "spiinfo": {"pagesize": "2048", "sparearea": "64", "pageperblk": "64",
                            "quadread": "0x6b", "readsts": "0x05", "writests": "0x01",
                            "stsvalue": "0x40", "dummy1": "8", "dummy2": "0", "suspintvl": "0"},
                "entrypoint": "0x28000000",
                "secureboot": "yes",
                "image": [{"file": bl2, "offset": "0x20000", "loadaddr": "0x28000000", "type": 1}]
            },
            "env": {"file": env, "blksize": "0x1000"},
            "data": {"image": [{"file": misc}]}
        });
        let cfg: ConvertConfig = serde_json::from_value(json).unwrap();
        let out = cfg.build().unwrap();

        let (built, names) = out.header.unwrap();
        assert_eq!(names, vec!["bl2.bin"]);
        let parsed = parse_header(&built.header).unwrap();
        assert_eq!(parsed.config.entry_point, 0x2800_0000);
        assert!(parsed.images[0].is_signed());
        assert!(built.keys.is_some());

        assert_eq!(out.env.unwrap().len(), 0x1000);

        let (keys, files) = out.data.unwrap();
        assert_eq!(files[0].name, "misc.bin");
        assert_eq!(crypto::decrypt(&keys.aes, &files[0].encrypted), b"payload");
        let (x, y) = keys.ecdsa.public_xy();
        assert!(crypto::verify(&x, &y, &files[0].encrypted, &files[0].signature).unwrap());
    }

    #[test]
    fn test_secureboot_flag_forms() {
        #[derive(Deserialize)]
        struct F {
            #[serde(deserialize_with = "de_yes_no")]
            v: bool,
        }
        let yes: F = serde_json::from_str(r#"{"v": "yes"}"#).unwrap();
        let no: F = serde_json::from_str(r#"{"v": "no"}"#).unwrap();
        let b: F = serde_json::from_str(r#"{"v": true}"#).unwrap();
        assert!(yes.v && !no.v && b.v);
    }
}
