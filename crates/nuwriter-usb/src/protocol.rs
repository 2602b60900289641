//! USB identifiers and vendor requests of the boot responder
//!
//! These must match the device-side firmware.

/// Nuvoton vendor id
pub const NUWRITER_USB_VENDOR: u16 = 0x0416;
/// Boot responder product id
pub const NUWRITER_USB_PRODUCT: u16 = 0x5963;

/// Interface carrying the bulk endpoints
pub const INTERFACE: u8 = 0;
/// Bulk IN endpoint
pub const BULK_IN_EP: u8 = 0x81;
/// Bulk OUT endpoint
pub const BULK_OUT_EP: u8 = 0x01;

/// Vendor control-out: select media, `value` = media code
pub const REQ_SET_MEDIA: u8 = 0xB0;
/// Vendor control-in: read the device information block
pub const REQ_GET_INFO: u8 = 0xB1;

/// Per-transfer timeout unless overridden
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
