//! Error types for nuwriter-core
//!
//! Per-device errors (transport, protocol, alignment, verify) are caught at
//! the orchestrator's task boundary and tallied. Codec errors surface to the
//! caller before any device I/O happens.

use crate::media::Media;

/// Wire desynchronisation between host and device
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Device did not answer a command frame with the fixed ACK word
    #[error("receive ACK error: expected 0x55AA55AA, got 0x{got:08X}")]
    AckMismatch {
        /// Value the device sent back
        got: u32,
    },
    /// Device acknowledged a different byte count than was sent
    #[error("ack size error: sent {expected} bytes, device acked {actual}")]
    AckSizeMismatch {
        /// Bytes sent in the chunk
        expected: u32,
        /// Bytes the device claims to have received
        actual: u32,
    },
    /// Transport returned fewer bytes than requested
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Requested length
        expected: usize,
        /// Returned length
        actual: usize,
    },
    /// Device announced a zero-length chunk while data was still pending
    #[error("device announced an empty chunk with {remaining} bytes remaining")]
    EmptyChunk {
        /// Bytes still expected
        remaining: u64,
    },
}

/// Malformed container input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    /// Leading magic does not match
    #[error("bad magic {0:02X?}")]
    BadMagic([u8; 4]),
    /// Stored CRC-32 does not match the content
    #[error("CRC mismatch: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    CrcMismatch {
        /// CRC found in the buffer
        stored: u32,
        /// CRC computed over the buffer
        computed: u32,
    },
    /// Buffer ends before a declared field or payload
    #[error("truncated container: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required
        needed: u64,
        /// Bytes present
        available: u64,
    },
    /// More images than the format can describe
    #[error("too many images: {count} (max {max})")]
    TooManyImages {
        /// Requested count
        count: usize,
        /// Format limit
        max: usize,
    },
    /// Stuffed images must be placed at ascending offsets
    #[error("image offset 0x{offset:X} is below the write cursor 0x{cursor:X}")]
    OffsetNotAscending {
        /// Requested offset
        offset: u64,
        /// Current write position
        cursor: u64,
    },
    /// Field larger than the space reserved for it
    #[error("{field} is {len} bytes, at most {max} fit")]
    Oversized {
        /// Field name
        field: &'static str,
        /// Actual length
        len: usize,
        /// Maximum length
        max: usize,
    },
}

/// Errors produced by the engine and its codecs
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Device unreachable or transfer failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Wire desync
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Device reported a zero block size for a block-aligned media
    #[error("unable to get block size for {0}")]
    BlockSizeUnknown(Media),

    /// Start address violates the media's block alignment
    #[error("starting address 0x{start:X} must be aligned to 0x{align:X} on {media}")]
    Alignment {
        /// Target media
        media: Media,
        /// Requested start address
        start: u64,
        /// Required alignment
        align: u64,
    },

    /// Read-back differs from the source payload
    #[error("verify failed at offset 0x{offset:X}")]
    VerifyFailed {
        /// Offset of the first mismatching chunk
        offset: u64,
    },

    /// Malformed container input
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// OTP map version outside the known range
    #[error("unsupported OTP version {0}")]
    UnsupportedOtpVersion(u32),

    /// Update touches a block whose lock bit is already set
    #[error("OTP {0} is locked")]
    OtpLocked(String),

    /// No device attached
    #[error("device not found")]
    NoDeviceFound,

    /// Media/option combination the responder does not support
    #[error("{0}")]
    Unsupported(String),

    /// Malformed argument or config value
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Key parsing or signing failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Operation stopped through the session's cancel flag
    #[error("operation cancelled")]
    Cancelled,

    /// File I/O
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON parsing
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is confined to a single device session
    ///
    /// Input errors (container, parameters, unsupported combinations) apply to
    /// every device alike.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Protocol(_)
                | Self::BlockSizeUnknown(_)
                | Self::Alignment { .. }
                | Self::VerifyFailed { .. }
                | Self::Cancelled
        )
    }
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
