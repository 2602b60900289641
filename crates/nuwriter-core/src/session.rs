//! Device session
//!
//! One transport plus the media selector frames are issued against. The
//! protocol operations are implemented on this type in [`crate::protocol`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::media::Media;
use crate::progress::{ProgressEvent, Reporter};
use crate::protocol::State;
use crate::transport::Transport;

/// Shared flag checked between chunks; set it to stop every session holding it
pub type CancelFlag = Arc<AtomicBool>;

/// A transport bound to the state of one logical operation
pub struct DeviceSession<T: Transport> {
    pub(crate) transport: T,
    pub(crate) media: Media,
    pub(crate) reporter: Reporter,
    id: usize,
    cancel: Option<CancelFlag>,
    state: State,
}

impl<T: Transport> DeviceSession<T> {
    /// Wrap a transport; the id is taken from the transport
    pub fn new(transport: T) -> Self {
        let id = transport.get_id();
        Self {
            transport,
            media: Media::Unknown,
            reporter: Reporter::silent(id),
            id,
            cancel: None,
            state: State::Idle,
        }
    }

    /// Send progress events for this device on `tx`
    pub fn with_reporter(mut self, tx: Sender<ProgressEvent>) -> Self {
        self.reporter = Reporter::new(tx, self.id);
        self
    }

    /// Stop between chunks once `flag` is set
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Device id (enumeration position)
    pub fn id(&self) -> usize {
        self.id
    }

    /// Media selected for the next frame
    pub fn media(&self) -> Media {
        self.media
    }

    /// Select the media for subsequent frames
    pub fn select_media(&mut self, media: Media) {
        self.media = media;
    }

    /// Protocol state after the last step
    pub fn state(&self) -> State {
        self.state
    }

    /// Event reporter for this device
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    pub(crate) fn transition(&mut self, to: State) {
        if self.state != to {
            log::trace!("device {}: {:?} -> {:?}", self.id, self.state, to);
            self.state = to;
        }
    }

    pub(crate) fn check_cancel(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}
