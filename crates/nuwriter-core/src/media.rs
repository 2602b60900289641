//! Media, action and option vocabulary
//!
//! These values go on the wire unchanged and must match the responder.

use std::fmt;

use crate::error::{Error, Result};
use crate::transport::BlockAlign;

/// SPI-NOR erase/program start addresses must be 4 KiB aligned
pub const SPINOR_ALIGN: u64 = 4096;

/// Storage media selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Media {
    /// DDR or SRAM
    DdrSram = 0,
    /// Raw NAND
    Nand = 1,
    /// SD card or eMMC
    SdEmmc = 2,
    /// SPI NOR flash
    SpiNor = 3,
    /// SPI NAND flash
    SpiNand = 4,
    /// One-time-programmable fuses
    Otp = 6,
    /// USB host (mass storage on the device's host port)
    UsbHost = 7,
    /// Unrecognised selector
    Unknown = 0xFF,
}

impl Media {
    /// Wire code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a wire code back to a media kind
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::DdrSram,
            1 => Self::Nand,
            2 => Self::SdEmmc,
            3 => Self::SpiNor,
            4 => Self::SpiNand,
            6 => Self::Otp,
            7 => Self::UsbHost,
            _ => Self::Unknown,
        }
    }

    /// Parse a media name (case-insensitive), `Unknown` if not recognised
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "DDR" | "SRAM" => Self::DdrSram,
            "SD" | "EMMC" => Self::SdEmmc,
            "NAND" => Self::Nand,
            "SPINAND" => Self::SpiNand,
            "SPINOR" => Self::SpiNor,
            "OTP" => Self::Otp,
            "USBH" => Self::UsbHost,
            _ => Self::Unknown,
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::DdrSram => "DDR/SRAM",
            Self::Nand => "NAND",
            Self::SdEmmc => "SD/EMMC",
            Self::SpiNor => "SPINOR",
            Self::SpiNand => "SPINAND",
            Self::Otp => "OTP",
            Self::UsbHost => "USBH",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Required start-address alignment for this media
    ///
    /// NAND and SPI-NAND use the block size reported by the device; a zero
    /// block size means the device could not report one.
    pub fn alignment(self, align: BlockAlign) -> Result<Option<u64>> {
        match self {
            Self::Nand if align.nand == 0 => Err(Error::BlockSizeUnknown(self)),
            Self::SpiNand if align.spinand == 0 => Err(Error::BlockSizeUnknown(self)),
            Self::Nand => Ok(Some(align.nand as u64)),
            Self::SpiNand => Ok(Some(align.spinand as u64)),
            Self::SpiNor => Ok(Some(SPINOR_ALIGN)),
            _ => Ok(None),
        }
    }

    /// Reject `start` if it is not aligned for this media
    pub fn check_alignment(self, start: u64, align: BlockAlign) -> Result<()> {
        match self.alignment(align)? {
            Some(a) if start % a != 0 => Err(Error::Alignment {
                media: self,
                start,
                align: a,
            }),
            _ => Ok(()),
        }
    }

    /// Validate a read request
    pub fn validate_read(self) -> Result<()> {
        match self {
            Self::Otp | Self::Unknown => Err(Error::Unsupported(format!(
                "Cannot support read {}",
                self.name()
            ))),
            _ => Ok(()),
        }
    }

    /// Validate a write request with its option code
    pub fn validate_write(self, option: u32) -> Result<()> {
        if self == Self::Unknown {
            return Err(Error::Unsupported("Unknown storage media".into()));
        }
        match option {
            opt::VERIFY if self == Self::Otp => Err(Error::Unsupported(format!(
                "Do not support verify option on {}",
                self.name()
            ))),
            opt::EXECUTE if self != Self::DdrSram => Err(Error::Unsupported(format!(
                "Do not support execution on {}",
                self.name()
            ))),
            opt::RAW if self != Self::Nand => Err(Error::Unsupported(format!(
                "Do not support raw write on {}",
                self.name()
            ))),
            _ => Ok(()),
        }
    }

    /// Validate an erase request
    pub fn validate_erase(self) -> Result<()> {
        match self {
            Self::DdrSram | Self::Otp | Self::SdEmmc | Self::Unknown => Err(Error::Unsupported(
                format!("{} does not support erase", self.name()),
            )),
            _ => Ok(()),
        }
    }

    /// Validate a mass-storage export request
    pub fn validate_storage(self, option: u32) -> Result<()> {
        if self != Self::SdEmmc {
            return Err(Error::Unsupported("Only support eMMC/SD".into()));
        }
        if option != opt::NONE && option != opt::EJECT {
            return Err(Error::Unsupported("Unsupported option".into()));
        }
        Ok(())
    }
}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command frame action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Action {
    /// Load a helper image into device RAM
    Load = 1,
    /// Write to media
    Write = 2,
    /// Erase media
    Erase = 3,
    /// Read from media
    Read = 4,
    /// Toggle mass-storage export
    Msc = 5,
}

impl Action {
    /// Map a wire code to an action
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Load,
            2 => Self::Write,
            3 => Self::Erase,
            4 => Self::Read,
            5 => Self::Msc,
            _ => return None,
        })
    }
}

/// Option codes carried in the frame's option field
///
/// Several codes share a value; which meaning applies depends on the action.
pub mod opt {
    /// No option
    pub const NONE: u32 = 0;
    /// Erase: scrub bad-block markers too (use with care)
    pub const SCRUB: u32 = 1;
    /// Read: include bad blocks
    pub const WITH_BAD: u32 = 1;
    /// Write: execute the image after loading (DDR/SRAM only)
    pub const EXECUTE: u32 = 2;
    /// Write: read back and compare (host side)
    pub const VERIFY: u32 = 3;
    /// Pack: unpack a container instead of building one
    pub const UNPACK: u32 = 4;
    /// Write: raw NAND write including spare area
    pub const RAW: u32 = 5;
    /// MSC: eject the exported storage
    pub const EJECT: u32 = 6;
    /// Pack: concatenate images at absolute offsets
    pub const STUFF: u32 = 7;
    /// Write: skip device-side CRC check
    pub const NO_CRC: u32 = 11;

    /// Parse an option name (case-insensitive), `NONE` if not recognised
    pub fn from_name(name: &str) -> u32 {
        match name.to_ascii_uppercase().as_str() {
            "SCRUB" => SCRUB,
            "WITHBAD" => WITH_BAD,
            "VERIFY" => VERIFY,
            "EXECUTE" => EXECUTE,
            "UNPACK" => UNPACK,
            "RAW" => RAW,
            "EJECT" => EJECT,
            "STUFF" => STUFF,
            "NOCRC" => NO_CRC,
            _ => NONE,
        }
    }

    /// Option value forwarded in a WRITE frame
    ///
    /// VERIFY is handled by the host after the transfer and is never sent.
    pub fn write_wire(option: u32) -> u32 {
        match option {
            EXECUTE | RAW | NO_CRC => option,
            _ => NONE,
        }
    }
}

/// Image type stored in pack and header descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ImageType {
    /// Plain data
    Data = 0,
    /// Trusted firmware
    Tfa = 1,
    /// U-Boot
    Uboot = 2,
    /// Linux kernel
    Linux = 3,
    /// DDR initialisation
    Ddr = 4,
    /// OP-TEE
    Tee = 5,
    /// Device tree blob
    Dtb = 6,
}

impl ImageType {
    /// Parse a type name (case-insensitive), `Data` if not recognised
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "TFA" => Self::Tfa,
            "UBOOT" => Self::Uboot,
            "LINUX" => Self::Linux,
            "DDR" => Self::Ddr,
            "TEE" => Self::Tee,
            "DTB" => Self::Dtb,
            _ => Self::Data,
        }
    }

    /// Map a wire code to a type
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Data,
            1 => Self::Tfa,
            2 => Self::Uboot,
            3 => Self::Linux,
            4 => Self::Ddr,
            5 => Self::Tee,
            6 => Self::Dtb,
            _ => return None,
        })
    }
}
