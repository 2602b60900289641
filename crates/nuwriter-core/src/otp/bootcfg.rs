//! Boot-configuration word
//!
//! ```text
//! bit 0       power-on setting source (0 = pins, 1 = OTP)
//! bit 1       QSPI clock (0 = 30 MHz, 1 = 50 MHz)
//! bit 2       watchdog enable
//! bit 4       UART0 debug messages disabled
//! bit 5       SD0 backup boot enable
//! bit 6       TSI image
//! bit 7       TSI debug disabled
//! bit 9       boot I/O voltage (0 = 3.3 V, 1 = 1.8 V)
//! bits 11:10  boot source
//! bits 13:12  page size (not used for USB)
//! bits 15:14  boot option, meaning depends on source (not used for USB)
//! bits 19:16  boot delay
//! bits 31:24  0x5A disables secure boot
//! ```

use std::fmt;

use crate::error::{Error, Result};

const SECURE_BOOT_DISABLE: u32 = 0x5A00_0000;

/// Boot source, bits [11:10]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BootSource {
    /// SPI NAND or NOR
    #[default]
    Spi,
    /// SD card or eMMC
    Sd,
    /// Raw NAND
    Nand,
    /// USB
    Usb,
}

impl BootSource {
    fn code(self) -> u32 {
        match self {
            Self::Spi => 0,
            Self::Sd => 1,
            Self::Nand => 2,
            Self::Usb => 3,
        }
    }

    fn from_code(code: u32) -> Self {
        match code & 3 {
            0 => Self::Spi,
            1 => Self::Sd,
            2 => Self::Nand,
            _ => Self::Usb,
        }
    }

    /// Interchange name
    pub fn name(self) -> &'static str {
        match self {
            Self::Spi => "spi",
            Self::Sd => "sd",
            Self::Nand => "nand",
            Self::Usb => "usb",
        }
    }

    /// Parse an interchange name; "emmc" is an alias of "sd"
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "spi" => Self::Spi,
            "sd" | "emmc" => Self::Sd,
            "nand" => Self::Nand,
            "usb" => Self::Usb,
            _ => return None,
        })
    }

    /// Option selected by code 0, `None` for USB
    pub fn default_option(self) -> Option<BootOption> {
        option_from_code(self, 0)
    }
}

/// Page size, bits [13:12]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    /// Let the boot ROM decide
    Ignore,
    /// 2 KiB pages
    K2,
    /// 4 KiB pages
    K4,
    /// 8 KiB pages
    K8,
}

impl PageSize {
    fn code(self) -> u32 {
        match self {
            Self::Ignore => 0,
            Self::K2 => 1,
            Self::K4 => 2,
            Self::K8 => 3,
        }
    }

    fn from_code(code: u32) -> Self {
        match code & 3 {
            0 => Self::Ignore,
            1 => Self::K2,
            2 => Self::K4,
            _ => Self::K8,
        }
    }

    /// Interchange name
    pub fn name(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::K2 => "2k",
            Self::K4 => "4k",
            Self::K8 => "8k",
        }
    }

    /// Parse an interchange name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ignore" => Self::Ignore,
            "2k" => Self::K2,
            "4k" => Self::K4,
            "8k" => Self::K8,
            _ => return None,
        })
    }
}

/// Boot option, bits [15:14]
///
/// Each variant belongs to exactly one boot source. USB boot has no option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOption {
    /// SPI NAND, single I/O
    SpiNand1,
    /// SPI NAND, quad I/O
    SpiNand4,
    /// SPI NOR, single I/O
    SpiNor1,
    /// SPI NOR, quad I/O
    SpiNor4,
    /// SD0 / eMMC0
    Sd0,
    /// SD1 / eMMC1
    Sd1,
    /// NAND, ECC from the page header
    NandIgnore,
    /// NAND, 12-bit ECC
    NandT12,
    /// NAND, 24-bit ECC
    NandT24,
    /// NAND without ECC
    NandNoEcc,
}

impl BootOption {
    /// Source this option applies to
    pub fn source(self) -> BootSource {
        match self {
            Self::SpiNand1 | Self::SpiNand4 | Self::SpiNor1 | Self::SpiNor4 => BootSource::Spi,
            Self::Sd0 | Self::Sd1 => BootSource::Sd,
            Self::NandIgnore | Self::NandT12 | Self::NandT24 | Self::NandNoEcc => BootSource::Nand,
        }
    }

    /// Interchange name
    pub fn name(self) -> &'static str {
        match self {
            Self::SpiNand1 => "spinand1",
            Self::SpiNand4 => "spinand4",
            Self::SpiNor1 => "spinor1",
            Self::SpiNor4 => "spinor4",
            Self::Sd0 => "sd0",
            Self::Sd1 => "sd1",
            Self::NandIgnore => "ignore",
            Self::NandT12 => "t12",
            Self::NandT24 => "t24",
            Self::NandNoEcc => "noecc",
        }
    }

    /// Parse an interchange name in the context of `source`
    pub fn from_name(source: BootSource, name: &str) -> Option<Self> {
        let option = match name {
            "spinand1" => Self::SpiNand1,
            "spinand4" => Self::SpiNand4,
            "spinor1" => Self::SpiNor1,
            "spinor4" => Self::SpiNor4,
            "sd0" | "emmc0" => Self::Sd0,
            "sd1" | "emmc1" => Self::Sd1,
            "ignore" => Self::NandIgnore,
            "t12" => Self::NandT12,
            "t24" => Self::NandT24,
            "noecc" => Self::NandNoEcc,
            _ => return None,
        };
        (option.source() == source).then_some(option)
    }
}

impl fmt::Display for BootOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Two-bit option code for `option` under `source`
///
/// `None` when the option belongs to another source, and always for USB,
/// which has no option field.
fn option_code(source: BootSource, option: BootOption) -> Option<u32> {
    use BootOption::*;
    use BootSource::*;

    match (source, option) {
        (Spi, SpiNand1) => Some(0),
        (Spi, SpiNand4) => Some(1),
        (Spi, SpiNor1) => Some(2),
        (Spi, SpiNor4) => Some(3),
        (Sd, Sd0) => Some(0),
        (Sd, Sd1) => Some(1),
        (Nand, NandIgnore) => Some(0),
        (Nand, NandT12) => Some(1),
        (Nand, NandT24) => Some(2),
        (Nand, NandNoEcc) => Some(3),
        (Usb, _) => None,
        (Spi | Sd | Nand, _) => None,
    }
}

/// Inverse of [`option_code`]
fn option_from_code(source: BootSource, code: u32) -> Option<BootOption> {
    use BootOption::*;

    match (source, code & 3) {
        (BootSource::Spi, 0) => Some(SpiNand1),
        (BootSource::Spi, 1) => Some(SpiNand4),
        (BootSource::Spi, 2) => Some(SpiNor1),
        (BootSource::Spi, _) => Some(SpiNor4),
        (BootSource::Sd, 0) => Some(Sd0),
        // Codes 2 and 3 are undefined for SD and select SD1 on the ROM
        (BootSource::Sd, _) => Some(Sd1),
        (BootSource::Nand, 0) => Some(NandIgnore),
        (BootSource::Nand, 1) => Some(NandT12),
        (BootSource::Nand, 2) => Some(NandT24),
        (BootSource::Nand, _) => Some(NandNoEcc),
        (BootSource::Usb, _) => None,
    }
}

/// Decoded boot-configuration word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Take power-on settings from OTP instead of pins
    pub power_on_from_otp: bool,
    /// QSPI clock at 50 MHz instead of 30 MHz
    pub qspi_clock_50mhz: bool,
    /// Watchdog enabled during boot
    pub watchdog: bool,
    /// UART0 debug output disabled
    pub uart_debug_disabled: bool,
    /// SD0 backup boot enabled
    pub sd_backup_boot: bool,
    /// TSI image
    pub tsi_image: bool,
    /// TSI debug disabled
    pub tsi_debug_disabled: bool,
    /// Boot I/O at 1.8 V instead of 3.3 V
    pub io_1v8: bool,
    /// Boot source
    pub source: BootSource,
    /// Page size, absent for USB
    pub page: Option<PageSize>,
    /// Boot option, absent for USB
    pub option: Option<BootOption>,
    /// Boot delay, 0..=15
    pub delay: u8,
    /// Secure boot enabled
    pub secure_boot: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            power_on_from_otp: false,
            qspi_clock_50mhz: false,
            watchdog: false,
            uart_debug_disabled: false,
            sd_backup_boot: false,
            tsi_image: false,
            tsi_debug_disabled: false,
            io_1v8: false,
            source: BootSource::Spi,
            page: Some(PageSize::Ignore),
            option: Some(BootOption::SpiNand1),
            delay: 0,
            secure_boot: true,
        }
    }
}

impl BootConfig {
    /// Encode to the 32-bit fuse word
    pub fn to_word(&self) -> Result<u32> {
        let mut word = 0u32;
        let flags = [
            (self.power_on_from_otp, 0),
            (self.qspi_clock_50mhz, 1),
            (self.watchdog, 2),
            (self.uart_debug_disabled, 4),
            (self.sd_backup_boot, 5),
            (self.tsi_image, 6),
            (self.tsi_debug_disabled, 7),
            (self.io_1v8, 9),
        ];
        for (set, bit) in flags {
            if set {
                word |= 1 << bit;
            }
        }

        word |= self.source.code() << 10;
        match (self.source, self.page, self.option) {
            (BootSource::Usb, None, None) => {}
            (BootSource::Usb, _, _) => {
                return Err(Error::InvalidParameter(
                    "usb boot takes no page size or boot option".into(),
                ));
            }
            (source, Some(page), Some(option)) => {
                let code = option_code(source, option).ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "boot option {} does not apply to {} boot",
                        option,
                        source.name()
                    ))
                })?;
                word |= page.code() << 12 | code << 14;
            }
            (source, _, _) => {
                return Err(Error::InvalidParameter(format!(
                    "{} boot needs both a page size and a boot option",
                    source.name()
                )));
            }
        }

        if self.delay > 15 {
            return Err(Error::InvalidParameter(format!(
                "boot delay {} out of range 0..=15",
                self.delay
            )));
        }
        word |= (self.delay as u32) << 16;

        if !self.secure_boot {
            word |= SECURE_BOOT_DISABLE;
        }
        Ok(word)
    }

    /// Decode a 32-bit fuse word
    pub fn from_word(word: u32) -> Self {
        let bit = |n: u32| word & (1 << n) != 0;
        let source = BootSource::from_code(word >> 10);
        let (page, option) = match source {
            BootSource::Usb => (None, None),
            _ => (
                Some(PageSize::from_code(word >> 12)),
                option_from_code(source, word >> 14),
            ),
        };

        Self {
            power_on_from_otp: bit(0),
            qspi_clock_50mhz: bit(1),
            watchdog: bit(2),
            uart_debug_disabled: bit(4),
            sd_backup_boot: bit(5),
            tsi_image: bit(6),
            tsi_debug_disabled: bit(7),
            io_1v8: bit(9),
            source,
            page,
            option,
            delay: ((word >> 16) & 0xF) as u8,
            secure_boot: word & 0xFF00_0000 != SECURE_BOOT_DISABLE,
        }
    }
}
