//! Command protocol
//!
//! Every operation starts with a 24-byte frame that the device answers with
//! [`ACK`]. Payloads then move in [`TRANSFER_SIZE`] chunks, each
//! acknowledged with its own length. Reads run the other way: the device
//! announces a chunk length, sends the chunk, and the host echoes the length.
//!
//! ```text
//! Idle -> CommandSent -> AckOk -> Transferring -> Completed -> Verifying -> VerifyOk
//!                    \-> AckFailed           \-> TransferFailed      \-> VerifyFailed
//! ```
//!
//! Nothing is retried here. A failure leaves the session in its terminal
//! state and returns the error.

mod engine;
mod frame;

pub use engine::TransferStats;
pub use frame::{
    attach_header, CommandFrame, ACK, DDR_INIT_EXEC_ADDR, FRAME_SIZE, OTP_WRITER_ADDR,
    TRANSFER_SIZE, XUSB_EXEC_ADDR,
};

/// Per-operation protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing sent yet
    Idle,
    /// Frame written, waiting for the ACK
    CommandSent,
    /// Frame acknowledged
    AckOk,
    /// Frame answered with something other than ACK
    AckFailed,
    /// Streaming chunks
    Transferring,
    /// All chunks acknowledged
    Completed,
    /// A chunk failed or was mis-acknowledged
    TransferFailed,
    /// Reading back for comparison
    Verifying,
    /// Read-back matched
    VerifyOk,
    /// Read-back differed
    VerifyFailed,
}

impl State {
    /// Whether the operation ended in a failure state
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::AckFailed | Self::TransferFailed | Self::VerifyFailed
        )
    }
}
