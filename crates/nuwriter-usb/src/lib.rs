//! nuwriter-usb - USB transport for the MA35D1 boot responder
//!
//! Each attached responder (VID 0x0416, PID 0x5963) is opened as one
//! [`UsbTransport`]. Frames and data travel over bulk endpoints 0x01/0x81;
//! media selection and the information block use vendor control requests.
//!
//! # Example
//!
//! ```no_run
//! use nuwriter_core::{ops, DeviceSession};
//! use nuwriter_usb::{parse_options, UsbTransport};
//!
//! let config = parse_options(&[("all", "1"), ("timeout", "20000")])?;
//! let mut sessions: Vec<_> = UsbTransport::open_all(&config)?
//!     .into_iter()
//!     .map(DeviceSession::new)
//!     .collect();
//! for (id, info) in ops::device_info(&mut sessions)? {
//!     println!("device {}: {}", id, info?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration Options
//!
//! - `device=N` or `index=N`: Open the Nth responder (0-indexed, default 0)
//! - `all=1`: Open every attached responder
//! - `timeout=MS`: Per-transfer timeout in milliseconds

mod device;
mod error;
mod protocol;

pub use device::{list_devices, parse_options, UsbConfig, UsbDeviceInfo, UsbTransport};
pub use error::{Result, UsbError};
pub use protocol::{NUWRITER_USB_PRODUCT, NUWRITER_USB_VENDOR};
