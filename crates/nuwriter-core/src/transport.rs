//! Transport abstraction
//!
//! A transport is one attached device. The engine only ever sees this
//! interface; enumeration and USB descriptors belong to the implementation.

use crate::error::Result;
use crate::media::Media;

/// Block sizes reported by the device, used for start-address alignment
///
/// A zero entry means the device could not report that block size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockAlign {
    /// NAND erase block size in bytes
    pub nand: u32,
    /// SPI-NAND erase block size in bytes
    pub spinand: u32,
}

/// A single attached device
///
/// Implementations block until each call completes or their own timeout
/// expires. A session owns its transport exclusively, so no locking is
/// needed here.
pub trait Transport: Send {
    /// Send bytes to the device
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Receive up to `len` bytes from the device
    fn read(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Select the media subsequent frames operate on
    fn set_media(&mut self, media: Media) -> Result<()>;

    /// Block sizes for alignment checks
    fn get_align(&mut self) -> Result<BlockAlign>;

    /// Raw device information structure
    fn get_info(&mut self) -> Result<Vec<u8>>;

    /// Stable numeric identity (enumeration position)
    fn get_id(&self) -> usize;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        (**self).read(len)
    }

    fn set_media(&mut self, media: Media) -> Result<()> {
        (**self).set_media(media)
    }

    fn get_align(&mut self) -> Result<BlockAlign> {
        (**self).get_align()
    }

    fn get_info(&mut self) -> Result<Vec<u8>> {
        (**self).get_info()
    }

    fn get_id(&self) -> usize {
        (**self).get_id()
    }
}
