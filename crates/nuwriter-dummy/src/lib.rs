//! nuwriter-dummy - In-memory boot responder for testing
//!
//! [`DummyDevice`] plays the device side of the command protocol against
//! media held in memory: it acknowledges frames and chunks, streams reads,
//! reports erase progress and takes attach uploads. Faults can be injected
//! to exercise the host's error paths without hardware.

use std::collections::{HashMap, VecDeque};

use nuwriter_core::info::DeviceInfo;
use nuwriter_core::protocol::{
    CommandFrame, ACK, DDR_INIT_EXEC_ADDR, FRAME_SIZE, TRANSFER_SIZE, XUSB_EXEC_ADDR,
};
use nuwriter_core::{Action, BlockAlign, Error, Media, Result, Transport};

/// Size of the emulated SD/eMMC sector; reads are padded to it
const SD_SECTOR: usize = 512;
/// Raw OTP read-all image size
const OTP_READBACK_SIZE: usize = 352;
/// Fuse base area carried in front of the key records
const OTP_BASE_SIZE: usize = 208;
const OTP_KEY_RECORD_SIZE: usize = 44;

/// Configuration for the dummy responder
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Number of devices to emulate
    pub count: usize,
    /// NAND erase block size
    pub nand_block: u32,
    /// SPI-NAND erase block size
    pub spinand_block: u32,
    /// Size of every emulated media
    pub size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            count: 1,
            nand_block: 0x2_0000,
            spinand_block: 0x2_0000,
            size: 4 * 1024 * 1024,
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| Error::InvalidParameter(format!("{}: {}", key, value)))
}

/// Parse options from key=value pairs
pub fn parse_options(options: &[(&str, &str)]) -> Result<DummyConfig> {
    let mut config = DummyConfig::default();

    for (key, value) in options {
        let n = parse_number(key, value)?;
        match *key {
            "count" => config.count = n as usize,
            "nand_block" => config.nand_block = n as u32,
            "spinand_block" => config.spinand_block = n as u32,
            "size" => config.size = n as usize,
            _ => {
                return Err(Error::InvalidParameter(format!("unknown option: {}", key)));
            }
        }
    }

    if config.count == 0 {
        return Err(Error::InvalidParameter("count must be at least 1".into()));
    }
    Ok(config)
}

/// Misbehaviour to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer every command frame with a wrong ACK word
    BadAck,
    /// Acknowledge every data chunk one byte short
    ShortAck,
    /// Flip the first byte of every read chunk
    CorruptRead,
    /// Announce a zero-length chunk on reads
    EmptyChunk,
    /// Fail every transfer
    Disconnected,
}

/// What the responder expects next from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// A command frame or an attach header
    Command,
    /// Media data for a WRITE
    Write { addr: usize, remaining: u64 },
    /// Helper image for a LOAD
    Load { remaining: u64 },
    /// Fuse payload after the writer was loaded
    OtpData { remaining: u64 },
    /// Host acknowledgement of a read chunk
    ReadAck { addr: usize, remaining: u64, sent: u32 },
    /// DDR init image during attach
    AttachIni { length: u32, remaining: u64 },
    /// Boot stub during attach
    AttachXusb { remaining: u64 },
}

/// Emulated boot responder
pub struct DummyDevice {
    id: usize,
    config: DummyConfig,
    media: Media,
    storage: HashMap<Media, Vec<u8>>,
    pending: Pending,
    outbound: VecDeque<u8>,
    frames: Vec<CommandFrame>,
    fault: Option<Fault>,
    attached: bool,
    otp_payload: Option<Vec<u8>>,
    otp_option: u32,
    chunks_received: usize,
}

impl DummyDevice {
    /// Create a responder with erased media
    pub fn new(id: usize, config: DummyConfig) -> Self {
        let storage = [
            Media::DdrSram,
            Media::Nand,
            Media::SdEmmc,
            Media::SpiNor,
            Media::SpiNand,
        ]
        .into_iter()
        .map(|m| (m, vec![0xFF; config.size]))
        .collect();

        Self {
            id,
            config,
            media: Media::Unknown,
            storage,
            pending: Pending::Command,
            outbound: VecDeque::new(),
            frames: Vec::new(),
            fault: None,
            attached: false,
            otp_payload: None,
            otp_option: 0,
            chunks_received: 0,
        }
    }

    /// One responder per configured device, ids from 0
    pub fn open_all(config: &DummyConfig) -> Vec<Self> {
        (0..config.count)
            .map(|id| Self::new(id, config.clone()))
            .collect()
    }

    /// Inject a fault
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Stored content of a media
    pub fn storage(&self, media: Media) -> &[u8] {
        self.storage.get(&media).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mutable content of a media
    pub fn storage_mut(&mut self, media: Media) -> Option<&mut [u8]> {
        self.storage.get_mut(&media).map(Vec::as_mut_slice)
    }

    /// Every command frame accepted so far
    pub fn frames(&self) -> &[CommandFrame] {
        &self.frames
    }

    /// Data chunks received for WRITE, LOAD and attach uploads
    pub fn chunks_received(&self) -> usize {
        self.chunks_received
    }

    /// Whether the boot stub upload completed
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Last fuse payload and its option word
    pub fn otp_payload(&self) -> Option<(&[u8], u32)> {
        self.otp_payload
            .as_deref()
            .map(|p| (p, self.otp_option))
    }

    fn push_word(&mut self, word: u32) {
        self.outbound.extend(word.to_le_bytes());
    }

    fn chunk_ack(&mut self, len: usize) {
        self.chunks_received += 1;
        let ack = match self.fault {
            Some(Fault::ShortAck) => len.saturating_sub(1),
            _ => len,
        };
        self.push_word(ack as u32);
    }

    fn check_range(&self, addr: usize, len: u64) -> Result<()> {
        if addr as u64 + len > self.config.size as u64 {
            return Err(Error::Transport(format!(
                "device {}: 0x{:X}+0x{:X} beyond media end",
                self.id, addr, len
            )));
        }
        Ok(())
    }

    /// Build the fuse read-all image from the last payload
    fn otp_readback(&self) -> Vec<u8> {
        let mut out = vec![0u8; OTP_READBACK_SIZE];
        let Some(payload) = &self.otp_payload else {
            return out;
        };
        let base = payload.len().min(OTP_BASE_SIZE);
        out[..base].copy_from_slice(&payload[..base]);

        for record in payload[base..].chunks_exact(OTP_KEY_RECORD_SIZE) {
            let slot = u32::from_le_bytes([record[36], record[37], record[38], record[39]]);
            let (offset, len) = match slot {
                0..=2 => (OTP_BASE_SIZE + 16 * slot as usize, 16),
                3..=5 => (OTP_BASE_SIZE + 48 + 32 * (slot as usize - 3), 32),
                _ => continue,
            };
            out[offset..offset + len].copy_from_slice(&record[..len]);
        }
        out
    }

    /// Bytes a READ at `addr` returns
    fn read_source(&self, addr: usize, len: usize) -> Vec<u8> {
        if self.media == Media::Otp {
            let image = self.otp_readback();
            let mut out = image.get(addr..).unwrap_or(&[]).to_vec();
            out.resize(len, 0);
            return out;
        }
        let store = self.storage(self.media);
        let end = (addr + len).min(store.len());
        let mut out = store.get(addr..end).unwrap_or(&[]).to_vec();
        out.resize(len, 0xFF);
        out
    }

    /// Queue the next read chunk: length word, then data
    fn send_read_chunk(&mut self, addr: usize, remaining: u64) {
        let mut len = (remaining as usize).min(TRANSFER_SIZE);
        if self.media == Media::SdEmmc {
            len = len.div_ceil(SD_SECTOR) * SD_SECTOR;
        }
        if self.fault == Some(Fault::EmptyChunk) {
            self.push_word(0);
            self.pending = Pending::Command;
            return;
        }

        let mut data = self.read_source(addr, len);
        if self.fault == Some(Fault::CorruptRead) {
            data[0] ^= 0xFF;
        }
        self.push_word(len as u32);
        self.outbound.extend(data);
        self.pending = Pending::ReadAck {
            addr,
            remaining,
            sent: len as u32,
        };
    }

    fn handle_frame(&mut self, frame: CommandFrame) -> Result<()> {
        log::trace!("dummy {}: {:?} on {}", self.id, frame, self.media);
        self.frames.push(frame);
        if self.fault == Some(Fault::BadAck) {
            self.push_word(!ACK);
            return Ok(());
        }
        self.push_word(ACK);

        let addr = frame.start as usize;
        match frame.action {
            Action::Write if self.media == Media::Otp => {
                self.pending = Pending::OtpData {
                    remaining: frame.length,
                };
                self.otp_payload = Some(Vec::new());
                self.otp_option = frame.option;
            }
            Action::Write => {
                self.check_range(addr, frame.length)?;
                if frame.length == 0 {
                    self.push_word(0);
                } else {
                    self.pending = Pending::Write {
                        addr,
                        remaining: frame.length,
                    };
                }
            }
            Action::Load => {
                self.pending = Pending::Load {
                    remaining: frame.length,
                };
            }
            Action::Read => {
                if self.media != Media::Otp {
                    self.check_range(addr, frame.length)?;
                }
                if frame.length > 0 {
                    self.send_read_chunk(addr, frame.length);
                }
            }
            Action::Erase => {
                let size = self.config.size;
                let end = match frame.length {
                    0 => size,
                    n => (addr as u64 + n).min(size as u64) as usize,
                };
                if let Some(store) = self.storage.get_mut(&self.media) {
                    if addr < end {
                        store[addr..end].fill(0xFF);
                    }
                }
                // Out-of-range and repeated values must be tolerated
                for progress in [0, 40, 40, 150, 80, 100] {
                    self.push_word(progress);
                }
            }
            Action::Msc => {}
        }
        Ok(())
    }

    fn handle_write(&mut self, data: &[u8]) -> Result<()> {
        match self.pending {
            Pending::Command if data.len() == FRAME_SIZE => {
                let frame = CommandFrame::parse(data)?;
                self.handle_frame(frame)
            }
            Pending::Command if data.len() == 8 => {
                let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                let exec = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
                self.pending = match exec {
                    DDR_INIT_EXEC_ADDR => Pending::AttachIni {
                        length,
                        remaining: length as u64,
                    },
                    XUSB_EXEC_ADDR => Pending::AttachXusb {
                        remaining: length as u64,
                    },
                    _ => {
                        return Err(Error::Transport(format!(
                            "device {}: unexpected execute address 0x{:08X}",
                            self.id, exec
                        )))
                    }
                };
                Ok(())
            }
            Pending::Command => Err(Error::Transport(format!(
                "device {}: unexpected {} byte write",
                self.id,
                data.len()
            ))),
            Pending::Write { addr, remaining } => {
                let media = self.media;
                if let Some(store) = self.storage.get_mut(&media) {
                    let end = (addr + data.len()).min(store.len());
                    store[addr..end].copy_from_slice(&data[..end - addr]);
                }
                self.chunk_ack(data.len());
                let remaining = remaining.saturating_sub(data.len() as u64);
                if remaining == 0 {
                    // Status word
                    self.push_word(0);
                    self.pending = Pending::Command;
                } else {
                    self.pending = Pending::Write {
                        addr: addr + data.len(),
                        remaining,
                    };
                }
                Ok(())
            }
            Pending::Load { remaining } => {
                self.chunk_ack(data.len());
                let remaining = remaining.saturating_sub(data.len() as u64);
                self.pending = if remaining == 0 {
                    Pending::Command
                } else {
                    Pending::Load { remaining }
                };
                Ok(())
            }
            Pending::OtpData { remaining } => {
                if let Some(payload) = self.otp_payload.as_mut() {
                    payload.extend_from_slice(data);
                }
                self.chunk_ack(data.len());
                let remaining = remaining.saturating_sub(data.len() as u64);
                self.pending = if remaining == 0 {
                    Pending::Command
                } else {
                    Pending::OtpData { remaining }
                };
                Ok(())
            }
            Pending::ReadAck {
                addr,
                remaining,
                sent,
            } => {
                if data.len() != 4 || u32::from_le_bytes([data[0], data[1], data[2], data[3]]) != sent
                {
                    return Err(Error::Transport(format!(
                        "device {}: bad read acknowledgement",
                        self.id
                    )));
                }
                let remaining = remaining.saturating_sub(sent as u64);
                if remaining == 0 {
                    self.pending = Pending::Command;
                } else {
                    self.send_read_chunk(addr + sent as usize, remaining);
                }
                Ok(())
            }
            Pending::AttachIni { length, remaining } => {
                let remaining = remaining.saturating_sub(data.len() as u64);
                if remaining == 0 {
                    self.push_word(length);
                    self.push_word(ACK);
                    self.pending = Pending::Command;
                } else {
                    self.pending = Pending::AttachIni { length, remaining };
                }
                Ok(())
            }
            Pending::AttachXusb { remaining } => {
                let remaining = remaining.saturating_sub(data.len() as u64);
                if remaining == 0 {
                    // The stub takes over; the last chunk is never acknowledged
                    self.chunks_received += 1;
                    self.attached = true;
                    self.pending = Pending::Command;
                } else {
                    self.chunk_ack(data.len());
                    self.pending = Pending::AttachXusb { remaining };
                }
                Ok(())
            }
        }
    }

    /// Device information block describing the emulated geometry
    pub fn info(&self) -> DeviceInfo {
        let (page_size, page_per_blk) = geometry(self.config.nand_block);
        let (snand_page_size, snand_page_per_blk) = geometry(self.config.spinand_block);
        DeviceInfo {
            page_per_blk,
            page_size,
            blk_cnt: (self.config.size as u32)
                .checked_div(self.config.nand_block)
                .unwrap_or(0),
            oob_size: 64,
            spi_id: 0xEF4018,
            blk: (self.config.size / SD_SECTOR) as u32,
            snand_id: 0xEFAA21,
            snand_page_size: snand_page_size as u16,
            snand_oob: 64,
            snand_blk_cnt: (self.config.size as u32)
                .checked_div(self.config.spinand_block)
                .unwrap_or(0),
            snand_page_per_blk,
            ..Default::default()
        }
    }
}

/// Split a block size into 2 KiB pages where possible
fn geometry(block: u32) -> (u32, u32) {
    if block >= 2048 && block % 2048 == 0 {
        (2048, block / 2048)
    } else {
        (block, 1)
    }
}

impl Transport for DummyDevice {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.fault == Some(Fault::Disconnected) {
            return Err(Error::Transport(format!("device {}: disconnected", self.id)));
        }
        self.handle_write(data)
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.fault == Some(Fault::Disconnected) {
            return Err(Error::Transport(format!("device {}: disconnected", self.id)));
        }
        let n = len.min(self.outbound.len());
        Ok(self.outbound.drain(..n).collect())
    }

    fn set_media(&mut self, media: Media) -> Result<()> {
        self.media = media;
        Ok(())
    }

    fn get_align(&mut self) -> Result<BlockAlign> {
        Ok(BlockAlign {
            nand: self.config.nand_block,
            spinand: self.config.spinand_block,
        })
    }

    fn get_info(&mut self) -> Result<Vec<u8>> {
        Ok(self.info().to_bytes())
    }

    fn get_id(&self) -> usize {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("count", "3"), ("nand_block", "0x40000")]).unwrap();
        assert_eq!(config.count, 3);
        assert_eq!(config.nand_block, 0x4_0000);
        assert_eq!(config.spinand_block, 0x2_0000);

        assert!(parse_options(&[("count", "0")]).is_err());
        assert!(parse_options(&[("colour", "red")]).is_err());
        assert!(parse_options(&[("size", "big")]).is_err());
    }

    #[test]
    fn test_info_matches_alignment() {
        let mut dev = DummyDevice::new(0, DummyConfig::default());
        let info = DeviceInfo::parse(&dev.get_info().unwrap()).unwrap();
        assert_eq!(info.block_align(), dev.get_align().unwrap());
        assert_eq!(info.capacity(Media::SdEmmc), Some(4 * 1024 * 1024));
    }

    #[test]
    fn test_frame_is_acked() {
        let mut dev = DummyDevice::new(0, DummyConfig::default());
        dev.set_media(Media::SpiNor).unwrap();
        let frame = CommandFrame::new(Action::Msc, 0, 0, 0);
        dev.write(&frame.to_bytes()).unwrap();
        assert_eq!(dev.read(4).unwrap(), ACK.to_le_bytes());
        assert_eq!(dev.frames(), &[frame]);
    }

    #[test]
    fn test_stray_write_is_an_error() {
        let mut dev = DummyDevice::new(0, DummyConfig::default());
        assert!(dev.write(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_otp_readback_layout() {
        let mut dev = DummyDevice::new(0, DummyConfig::default());
        let mut payload = vec![0u8; OTP_BASE_SIZE];
        payload[0] = 0x11;
        let mut record = vec![0xAB; 32];
        record.extend_from_slice(&128u32.to_le_bytes());
        record.extend_from_slice(&1u32.to_le_bytes());
        record.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&record);
        dev.otp_payload = Some(payload);

        let image = dev.otp_readback();
        assert_eq!(image.len(), OTP_READBACK_SIZE);
        assert_eq!(image[0], 0x11);
        assert!(image[208..224].iter().all(|&b| b == 0));
        assert!(image[224..240].iter().all(|&b| b == 0xAB));
        assert!(image[240..].iter().all(|&b| b == 0));
    }
}
