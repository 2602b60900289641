//! OTP fuse content
//!
//! [`OtpModel`] is the typed view. [`codec`] converts it to and from the
//! 672-byte fuse map, the writer payload and the device's read-back image;
//! [`json`] is the user-editable interchange form.

pub mod bootcfg;
pub mod codec;
pub mod json;
pub mod model;

pub use bootcfg::{BootConfig, BootOption, BootSource, PageSize};
pub use codec::{
    decode, decode_readback, encode, ensure_writable, program_payload, OTP_MAP_SIZE,
    READBACK_SIZE, READ_ALL_OPTION,
};
pub use json::{from_json, to_json, OtpJson};
pub use model::{Dpm, DpmPlm, KeyEntry, KeySlot, OtpEncrypt, OtpModel, OtpOption, Plm};
