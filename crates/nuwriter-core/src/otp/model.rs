//! Typed OTP content
//!
//! Every block is optional. `Some` means the block is selected for export or
//! was present in a decoded map.

use bitflags::bitflags;

use super::bootcfg::BootConfig;

/// Secure / non-secure region size
pub const REGION_SIZE: usize = 88;
/// Key storage size per slot
pub const KEY_SIZE: usize = 32;
/// Number of key slots
pub const KEY_SLOTS: usize = 9;

bitflags! {
    /// Option word: block presence and lock bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OtpOption: u32 {
        /// Block 1, boot configuration
        const BOOT_CFG = 0x0000_0100;
        /// Block 2, DPM and PLM
        const DPM_PLM = 0x0000_0200;
        /// Block 3, MAC0
        const MAC0 = 0x0000_0400;
        /// Block 4, MAC1
        const MAC1 = 0x0000_0800;
        /// Block 5, deployed password
        const DPLY_PWD = 0x0000_1000;
        /// Block 6, secure region
        const SECURE = 0x0000_2000;
        /// Block 7, non-secure region
        const NON_SECURE = 0x0000_4000;
        /// Key records follow
        const KEY = 0x0000_8000;
        /// Key slot 0 lock
        const KEY0_LOCK = 0x0001_0000;
        /// Key slot 1 lock
        const KEY1_LOCK = 0x0002_0000;
        /// Key slot 2 lock
        const KEY2_LOCK = 0x0004_0000;
        /// Key slot 3 lock
        const KEY3_LOCK = 0x0008_0000;
        /// Key slot 4 lock
        const KEY4_LOCK = 0x0010_0000;
        /// Key slot 5 lock
        const KEY5_LOCK = 0x0020_0000;
        /// Key slot 6 lock
        const KEY6_LOCK = 0x0040_0000;
        /// Key slot 7 lock
        const KEY7_LOCK = 0x0080_0000;
        /// Key slot 8 lock
        const KEY8_LOCK = 0x0100_0000;
        /// Block 1 lock
        const BOOT_CFG_LOCK = 0x1000_0000;
        /// Block 3 lock
        const MAC0_LOCK = 0x2000_0000;
        /// Block 4 lock
        const MAC1_LOCK = 0x4000_0000;
        /// Block 5 lock
        const DPLY_PWD_LOCK = 0x8000_0000;
    }
}

impl OtpOption {
    /// All lock bits
    pub const LOCKS: Self = Self::from_bits_truncate(0xF1FF_0000);

    /// Lock bit of key slot `slot`
    pub fn key_lock(slot: usize) -> Self {
        Self::from_bits_truncate(0x0001_0000 << slot)
    }

    /// Lock names understood by the JSON interchange
    pub const LOCK_NAMES: [(&'static str, OtpOption); 13] = [
        ("boot_cfg", Self::BOOT_CFG_LOCK),
        ("mac0", Self::MAC0_LOCK),
        ("mac1", Self::MAC1_LOCK),
        ("dplypwd", Self::DPLY_PWD_LOCK),
        ("huk0", Self::KEY0_LOCK),
        ("huk1", Self::KEY1_LOCK),
        ("huk2", Self::KEY2_LOCK),
        ("key3", Self::KEY3_LOCK),
        ("key4", Self::KEY4_LOCK),
        ("key5", Self::KEY5_LOCK),
        ("publicx", Self::KEY6_LOCK),
        ("publicy", Self::KEY7_LOCK),
        ("aeskey", Self::KEY8_LOCK),
    ];
}

bitflags! {
    /// Debug protection mode fuses
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Dpm: u32 {
        /// A35 secure debug disable
        const A35_SDS_DIS = 1 << 0;
        /// A35 secure debug lock
        const A35_SDS_LOCK = 1 << 1;
        /// A35 secure non-invasive debug disable
        const A35_SNDS_DIS = 1 << 2;
        /// A35 secure non-invasive debug lock
        const A35_SNDS_LOCK = 1 << 3;
        /// A35 non-secure debug disable
        const A35_NSDS_DIS = 1 << 4;
        /// A35 non-secure debug lock
        const A35_NSDS_LOCK = 1 << 5;
        /// A35 non-secure non-invasive debug disable
        const A35_NSNDS_DIS = 1 << 6;
        /// A35 non-secure non-invasive debug lock
        const A35_NSNDS_LOCK = 1 << 7;
        /// M4 debug disable
        const M4_DS_DIS = 1 << 8;
        /// M4 debug lock
        const M4_DS_LOCK = 1 << 9;
        /// M4 non-invasive debug disable
        const M4_NDS_DIS = 1 << 10;
        /// M4 non-invasive debug lock
        const M4_NDS_LOCK = 1 << 11;
        /// External debug disable
        const EXT_DIS = 1 << 12;
        /// External debug lock
        const EXT_LOCK = 1 << 13;
        /// External trace disable
        const EXTT_DIS = 1 << 14;
        /// External trace lock
        const EXTT_LOCK = 1 << 15;
        /// GIC secure configuration disable
        const GICCFG_S_DIS = 1 << 16;
        /// GIC secure configuration lock
        const GICCFG_S_LOCK = 1 << 17;
    }
}

impl Dpm {
    /// Flag names used by the JSON interchange
    pub const NAMES: [(&'static str, Dpm); 18] = [
        ("a35sdsdis", Self::A35_SDS_DIS),
        ("a35sdslock", Self::A35_SDS_LOCK),
        ("a35sndsdis", Self::A35_SNDS_DIS),
        ("a35sndslock", Self::A35_SNDS_LOCK),
        ("a35nsdsdis", Self::A35_NSDS_DIS),
        ("a35nsdslock", Self::A35_NSDS_LOCK),
        ("a35nsndsdis", Self::A35_NSNDS_DIS),
        ("a35nsndslock", Self::A35_NSNDS_LOCK),
        ("m4dsdis", Self::M4_DS_DIS),
        ("m4dslock", Self::M4_DS_LOCK),
        ("m4ndsdis", Self::M4_NDS_DIS),
        ("m4ndslock", Self::M4_NDS_LOCK),
        ("extdis", Self::EXT_DIS),
        ("extlock", Self::EXT_LOCK),
        ("exttdis", Self::EXTT_DIS),
        ("exttlock", Self::EXTT_LOCK),
        ("giccfgsdis", Self::GICCFG_S_DIS),
        ("giccfgslock", Self::GICCFG_S_LOCK),
    ];

    /// Look up one flag by its interchange name
    pub fn by_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, flag)| *flag)
    }
}

/// Product lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plm {
    /// OEM
    Oem,
    /// Deployed
    Deploy,
    /// Return for analysis
    Rma,
    /// Permanent RMA
    Prma,
}

impl Plm {
    /// Fuse word value
    pub fn word(self) -> u32 {
        match self {
            Self::Oem => 0x1,
            Self::Deploy => 0x3,
            Self::Rma => 0x7,
            Self::Prma => 0xF,
        }
    }

    /// Decode a fuse word; `None` for anything but the four stages
    pub fn from_word(word: u32) -> Option<Self> {
        Some(match word {
            0x1 => Self::Oem,
            0x3 => Self::Deploy,
            0x7 => Self::Rma,
            0xF => Self::Prma,
            _ => return None,
        })
    }

    /// Interchange name
    pub fn name(self) -> &'static str {
        match self {
            Self::Oem => "oem",
            Self::Deploy => "deploy",
            Self::Rma => "rma",
            Self::Prma => "prma",
        }
    }

    /// Parse an interchange name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "oem" => Self::Oem,
            "deploy" => Self::Deploy,
            "rma" => Self::Rma,
            "prma" => Self::Prma,
            _ => return None,
        })
    }
}

/// Block 2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DpmPlm {
    /// Debug protection flags
    pub dpm: Dpm,
    /// Lifecycle stage, `None` leaves the word at zero
    pub plm: Option<Plm>,
}

/// Key store slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    /// Hardware unique key 0
    Huk0,
    /// Hardware unique key 1
    Huk1,
    /// Hardware unique key 2
    Huk2,
    /// Key storage 3
    Key3,
    /// Key storage 4
    Key4,
    /// Key storage 5
    Key5,
    /// Boot ROM public key X coordinate
    PublicX,
    /// Boot ROM public key Y coordinate
    PublicY,
    /// Boot ROM AES key
    AesKey,
}

impl KeySlot {
    /// All slots in fuse order
    pub const ALL: [KeySlot; KEY_SLOTS] = [
        Self::Huk0,
        Self::Huk1,
        Self::Huk2,
        Self::Key3,
        Self::Key4,
        Self::Key5,
        Self::PublicX,
        Self::PublicY,
        Self::AesKey,
    ];

    /// Slot number
    pub fn index(self) -> usize {
        self as usize
    }

    /// Interchange name
    pub fn name(self) -> &'static str {
        match self {
            Self::Huk0 => "huk0",
            Self::Huk1 => "huk1",
            Self::Huk2 => "huk2",
            Self::Key3 => "key3",
            Self::Key4 => "key4",
            Self::Key5 => "key5",
            Self::PublicX => "publicx",
            Self::PublicY => "publicy",
            Self::AesKey => "aeskey",
        }
    }

    /// Metadata the boot ROM slots are always programmed with
    pub fn fixed_meta(self) -> Option<u32> {
        match self {
            Self::PublicX | Self::PublicY => Some(0x8004_0611),
            Self::AesKey => Some(0x8000_0611),
            _ => None,
        }
    }
}

/// Key-store metadata names
pub const META_NAMES: [(&str, u32); 6] = [
    ("aes256-unreadable", 0x8000_0611),
    ("aes256-cpu-readable", 0x8000_0615),
    ("sha256-unreadable", 0x8001_0611),
    ("sha256-cpu-readable", 0x8001_0615),
    ("eccp256-unreadable", 0x8004_0611),
    ("eccp256-cpu-readable", 0x8004_0615),
];

/// One key slot's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry {
    /// Key bytes, zero padded
    pub key: [u8; KEY_SIZE],
    /// Key size in bits; zero means the slot is empty
    pub size: u32,
    /// Key-store metadata word
    pub meta: u32,
}

/// OTP encryption key block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpEncrypt {
    /// Encrypt fuse content with `key`
    pub encrypt: bool,
    /// Encryption key
    pub key: [u8; KEY_SIZE],
}

/// Full typed fuse content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtpModel {
    /// Block 1
    pub boot_cfg: Option<BootConfig>,
    /// Block 2
    pub dpm_plm: Option<DpmPlm>,
    /// Block 3
    pub mac0: Option<[u8; 6]>,
    /// Block 4
    pub mac1: Option<[u8; 6]>,
    /// Block 5
    pub dply_pwd: Option<[u8; 4]>,
    /// Block 6
    pub secure: Option<[u8; REGION_SIZE]>,
    /// Block 7
    pub non_secure: Option<[u8; REGION_SIZE]>,
    /// Key slots 0..=8
    pub keys: [Option<KeyEntry>; KEY_SLOTS],
    /// OTP encryption key
    pub otp_encrypt: Option<OtpEncrypt>,
    /// Lock bits (only the lock part of [`OtpOption`] is meaningful)
    pub locks: OtpOption,
}

impl OtpModel {
    /// Key in `slot`
    pub fn key(&self, slot: KeySlot) -> Option<&KeyEntry> {
        self.keys[slot.index()].as_ref()
    }

    /// Presence bits for the blocks this model carries
    pub fn presence(&self) -> OtpOption {
        let mut option = OtpOption::empty();
        option.set(OtpOption::BOOT_CFG, self.boot_cfg.is_some());
        option.set(OtpOption::DPM_PLM, self.dpm_plm.is_some());
        option.set(OtpOption::MAC0, self.mac0.is_some());
        option.set(OtpOption::MAC1, self.mac1.is_some());
        option.set(OtpOption::DPLY_PWD, self.dply_pwd.is_some());
        option.set(OtpOption::SECURE, self.secure.is_some());
        option.set(OtpOption::NON_SECURE, self.non_secure.is_some());
        option.set(
            OtpOption::KEY,
            self.keys.iter().flatten().any(|k| k.size != 0),
        );
        option
    }

    /// Whether secure boot ends up disabled by this content
    pub fn disables_secure_boot(&self) -> bool {
        self.boot_cfg.is_some_and(|c| !c.secure_boot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_mask() {
        assert_eq!(OtpOption::LOCKS.bits(), 0xF1FF_0000);
        assert_eq!(OtpOption::key_lock(8), OtpOption::KEY8_LOCK);
        assert!(OtpOption::LOCKS.contains(OtpOption::DPLY_PWD_LOCK));
        assert!(!OtpOption::LOCKS.contains(OtpOption::KEY));
    }

    #[test]
    fn test_dpm_names_cover_bits() {
        let all = Dpm::NAMES.iter().fold(Dpm::empty(), |acc, (_, f)| acc | *f);
        assert_eq!(all, Dpm::all());
        assert_eq!(Dpm::by_name("extlock"), Some(Dpm::EXT_LOCK));
        assert_eq!(Dpm::by_name("nope"), None);
    }

    #[test]
    fn test_plm_words() {
        for plm in [Plm::Oem, Plm::Deploy, Plm::Rma, Plm::Prma] {
            assert_eq!(Plm::from_word(plm.word()), Some(plm));
            assert_eq!(Plm::from_name(plm.name()), Some(plm));
        }
        assert_eq!(Plm::from_word(2), None);
    }

    #[test]
    fn test_presence() {
        let mut m = OtpModel {
            mac1: Some([1; 6]),
            ..Default::default()
        };
        assert_eq!(m.presence(), OtpOption::MAC1);
        m.keys[KeySlot::Key4.index()] = Some(KeyEntry {
            key: [2; 32],
            size: 256,
            meta: 0,
        });
        assert_eq!(m.presence(), OtpOption::MAC1 | OtpOption::KEY);
        assert_eq!(KeySlot::ALL[4], KeySlot::Key4);
    }
}
