//! nuwriter-core - Device programming engine for the MA35D1 boot responder
//!
//! This crate contains everything that does not touch USB descriptors:
//!
//! - the command frame and the chunked, acknowledged transfer loop
//!   ([`protocol`]), driven through a [`DeviceSession`]
//! - fan-out of one logical operation across many devices ([`orchestrator`])
//!   and the entry operations built on top of it ([`ops`])
//! - the pack container, secure-boot header and environment blob codecs
//!   ([`container`]) and the AES/ECDSA services they use ([`crypto`])
//! - the OTP fuse-map codec, its boot-configuration bitfields and the JSON
//!   interchange format ([`otp`])
//!
//! Transports are injected through the [`Transport`] trait. The USB
//! implementation lives in `nuwriter-usb`, an in-memory emulation of the
//! device side lives in `nuwriter-dummy`.
//!
//! # Example
//!
//! ```ignore
//! use nuwriter_core::{ops, DeviceSession, Media};
//!
//! let mut sessions: Vec<DeviceSession<_>> = transports
//!     .into_iter()
//!     .map(DeviceSession::new)
//!     .collect();
//!
//! let outcome = ops::program(&mut sessions, Media::SpiNor, 0x1000, &image, opt::VERIFY)?;
//! println!("{} succeeded, {} failed", outcome.success, outcome.failure);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod info;
pub mod media;
pub mod ops;
pub mod orchestrator;
pub mod otp;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{ContainerError, Error, ProtocolError, Result};
pub use info::DeviceInfo;
pub use media::{opt, Action, ImageType, Media};
pub use orchestrator::{run_all, Outcome, MAX_WORKERS};
pub use progress::{Phase, ProgressEvent, Reporter};
pub use session::{CancelFlag, DeviceSession};
pub use transport::{BlockAlign, Transport};
