//! Progress events
//!
//! Per-device tasks never print. They push events tagged with the device id
//! onto a channel and a single consumer renders them.

use std::sync::mpsc::Sender;

/// Operation phase a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Uploading the DDR init image and boot stub
    Attach,
    /// Erasing media
    Erase,
    /// Writing an image
    Program,
    /// Reading back for comparison
    Verify,
    /// Reading media contents
    Read,
    /// Loading a helper image into RAM
    Load,
    /// Writing fuse data
    Otp,
}

impl Phase {
    /// Label used by progress renderers
    pub fn label(self) -> &'static str {
        match self {
            Self::Attach => "Attaching",
            Self::Erase => "Erasing",
            Self::Program => "Programming",
            Self::Verify => "Verifying",
            Self::Read => "Reading",
            Self::Load => "Loading",
            Self::Otp => "Writing OTP",
        }
    }
}

/// A progress update from one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A phase started with `total` units of work
    Begin {
        /// Device id
        device: usize,
        /// Phase
        phase: Phase,
        /// Bytes, or percent for erase
        total: u64,
        /// Extra context such as "2/3" for pack images
        detail: String,
    },
    /// Absolute position within the current phase
    Advance {
        /// Device id
        device: usize,
        /// Phase
        phase: Phase,
        /// Units done so far
        done: u64,
    },
    /// The phase ended successfully
    Finish {
        /// Device id
        device: usize,
        /// Phase
        phase: Phase,
    },
    /// The device's task ended
    Done {
        /// Device id
        device: usize,
        /// Error text if the task failed
        error: Option<String>,
    },
}

/// Event sender bound to one device id
///
/// A reporter without a channel drops every event.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<Sender<ProgressEvent>>,
    device: usize,
}

impl Reporter {
    /// Reporter sending events for `device` on `tx`
    pub fn new(tx: Sender<ProgressEvent>, device: usize) -> Self {
        Self {
            tx: Some(tx),
            device,
        }
    }

    /// Reporter that drops everything
    pub fn silent(device: usize) -> Self {
        Self { tx: None, device }
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody renders; that is not an error
            let _ = tx.send(event);
        }
    }

    /// Start a phase
    pub fn begin(&self, phase: Phase, total: u64, detail: impl Into<String>) {
        self.send(ProgressEvent::Begin {
            device: self.device,
            phase,
            total,
            detail: detail.into(),
        });
    }

    /// Report the absolute position within a phase
    pub fn advance(&self, phase: Phase, done: u64) {
        self.send(ProgressEvent::Advance {
            device: self.device,
            phase,
            done,
        });
    }

    /// End a phase
    pub fn finish(&self, phase: Phase) {
        self.send(ProgressEvent::Finish {
            device: self.device,
            phase,
        });
    }

    /// End the device's task
    pub fn done(&self, error: Option<String>) {
        self.send(ProgressEvent::Done {
            device: self.device,
            error,
        });
    }
}
