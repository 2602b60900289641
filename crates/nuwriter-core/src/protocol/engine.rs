//! Per-device protocol operations
//!
//! Everything here runs on one session from start to finish; fan-out across
//! devices is the orchestrator's job.

use crate::container::pack::PackImage;
use crate::error::{Error, ProtocolError, Result};
use crate::info::DeviceInfo;
use crate::media::{opt, Action, Media};
use crate::progress::Phase;
use crate::session::DeviceSession;
use crate::transport::{BlockAlign, Transport};

use super::frame::{
    attach_header, CommandFrame, ACK, DDR_INIT_EXEC_ADDR, OTP_WRITER_ADDR, TRANSFER_SIZE,
    XUSB_EXEC_ADDR,
};
use super::State;

/// Upper bound on the buffer reserved before a read; it grows per chunk after
const READ_RESERVE: u64 = TRANSFER_SIZE as u64 * 64;

/// Outcome of a chunked write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Chunks written
    pub chunks: usize,
    /// Sum of acknowledged chunk sizes
    pub acked: u64,
}

impl<T: Transport> DeviceSession<T> {
    /// Read exactly `len` bytes
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let data = self.transport.read(len)?;
        if data.len() < len {
            return Err(ProtocolError::ShortRead {
                expected: len,
                actual: data.len(),
            }
            .into());
        }
        Ok(data)
    }

    /// Read one little-endian word
    fn read_u32(&mut self) -> Result<u32> {
        let data = self.read_exact(4)?;
        Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Block sizes, only queried for media that need them
    fn check_start(&mut self, start: u64) -> Result<()> {
        let align = match self.media {
            Media::Nand | Media::SpiNand => self.transport.get_align()?,
            _ => BlockAlign::default(),
        };
        self.media.check_alignment(start, align)
    }

    /// Write a frame and require the ACK word back
    pub fn send_command(&mut self, frame: &CommandFrame) -> Result<()> {
        self.check_cancel()?;
        log::trace!("device {}: {:?} on {}", self.id(), frame, self.media);
        self.transport.set_media(self.media)?;
        self.transport.write(&frame.to_bytes())?;
        self.transition(State::CommandSent);

        let ack = match self.read_u32() {
            Ok(ack) => ack,
            Err(e) => {
                self.transition(State::AckFailed);
                return Err(e);
            }
        };
        if ack != ACK {
            log::error!("device {}: receive ACK error (0x{:08X})", self.id(), ack);
            self.transition(State::AckFailed);
            return Err(ProtocolError::AckMismatch { got: ack }.into());
        }
        self.transition(State::AckOk);
        Ok(())
    }

    /// Send `payload` in `chunk_size` pieces, each acknowledged with its size
    ///
    /// With `ack_last` unset the final chunk is not acknowledged (boot stub
    /// upload during attach).
    pub fn write_chunks(
        &mut self,
        payload: &[u8],
        chunk_size: usize,
        phase: Phase,
        ack_last: bool,
    ) -> Result<TransferStats> {
        self.transition(State::Transferring);
        let result = self.write_chunks_inner(payload, chunk_size.max(1), phase, ack_last);
        if result.is_err() {
            self.transition(State::TransferFailed);
        }
        result
    }

    fn write_chunks_inner(
        &mut self,
        payload: &[u8],
        chunk_size: usize,
        phase: Phase,
        ack_last: bool,
    ) -> Result<TransferStats> {
        let mut stats = TransferStats::default();
        let count = payload.len().div_ceil(chunk_size);

        for (i, chunk) in payload.chunks(chunk_size).enumerate() {
            self.check_cancel()?;
            self.transport.write(chunk)?;
            stats.chunks += 1;

            if ack_last || i + 1 != count {
                let acked = self.read_u32()?;
                if acked as usize != chunk.len() {
                    log::error!(
                        "device {}: ack size error {} {}",
                        self.id(),
                        acked,
                        chunk.len()
                    );
                    return Err(ProtocolError::AckSizeMismatch {
                        expected: chunk.len() as u32,
                        actual: acked,
                    }
                    .into());
                }
                log::debug!("device {}: chunk {} acked {} bytes", self.id(), i, acked);
                stats.acked += acked as u64;
            } else {
                stats.acked += chunk.len() as u64;
            }
            self.reporter.advance(phase, stats.acked);
        }
        Ok(stats)
    }

    /// Chunked write followed by the trailing status word
    pub fn stream_write(&mut self, payload: &[u8], chunk_size: usize) -> Result<TransferStats> {
        self.reporter
            .begin(Phase::Program, payload.len() as u64, String::new());
        let stats = self.write_chunks(payload, chunk_size, Phase::Program, true)?;
        let status = self.read_u32().inspect_err(|_| self.transition(State::TransferFailed))?;
        log::debug!("device {}: write status 0x{:08X}", self.id(), status);
        self.transition(State::Completed);
        self.reporter.finish(Phase::Program);
        Ok(stats)
    }

    /// Receive one announced chunk, acknowledge it, and cut it to `remain`
    fn receive_chunk(&mut self, remain: u64) -> Result<Vec<u8>> {
        let announced = self.read_u32()?;
        if announced == 0 {
            return Err(ProtocolError::EmptyChunk { remaining: remain }.into());
        }
        let mut data = self.read_exact(announced as usize)?;
        self.transport.write(&announced.to_le_bytes())?;
        // SD/eMMC pads the last chunk to a whole block
        if announced as u64 > remain {
            data.truncate(remain as usize);
        }
        Ok(data)
    }

    /// Read back `payload.len()` bytes from `start` and compare
    pub fn stream_verify(&mut self, start: u64, payload: &[u8]) -> Result<()> {
        let total = payload.len() as u64;
        self.send_command(&CommandFrame::new(Action::Read, start, total, opt::NONE))?;
        self.transition(State::Verifying);
        self.reporter.begin(Phase::Verify, total, String::new());

        let mut remain = total;
        while remain > 0 {
            self.check_cancel()?;
            let offset = total - remain;
            let data = match self.receive_chunk(remain) {
                Ok(d) => d,
                Err(e) => {
                    self.transition(State::VerifyFailed);
                    return Err(e);
                }
            };
            let end = offset as usize + data.len();
            if data[..] != payload[offset as usize..end] {
                log::error!("device {}: verify failed at 0x{:X}", self.id(), offset);
                self.transition(State::VerifyFailed);
                return Err(Error::VerifyFailed { offset });
            }
            remain -= data.len() as u64;
            self.reporter.advance(Phase::Verify, total - remain);
        }

        log::info!("device {}: verify pass", self.id());
        self.transition(State::VerifyOk);
        self.reporter.finish(Phase::Verify);
        Ok(())
    }

    /// Erase `length` bytes from `start`; a zero length erases the whole media
    pub fn erase(&mut self, start: u64, length: u64, option: u32) -> Result<()> {
        self.check_start(start)?;
        self.send_command(&CommandFrame::new(Action::Erase, start, length, option))?;
        self.transition(State::Transferring);
        self.reporter.begin(Phase::Erase, 100, String::new());

        let mut previous = 0;
        loop {
            self.check_cancel()?;
            let progress = self
                .read_u32()
                .inspect_err(|_| self.transition(State::TransferFailed))?;
            if progress <= 100 && progress > previous {
                previous = progress;
                self.reporter.advance(Phase::Erase, progress as u64);
            }
            if progress == 100 {
                break;
            }
        }
        self.transition(State::Completed);
        self.reporter.finish(Phase::Erase);
        Ok(())
    }

    /// Write `payload` at `start`, optionally verifying it
    pub fn program(&mut self, start: u64, payload: &[u8], option: u32) -> Result<TransferStats> {
        self.check_start(start)?;
        log::info!(
            "device {}: image length is {} bytes",
            self.id(),
            payload.len()
        );
        self.send_command(&CommandFrame::new(
            Action::Write,
            start,
            payload.len() as u64,
            opt::write_wire(option),
        ))?;
        let stats = self.stream_write(payload, TRANSFER_SIZE)?;
        if option == opt::VERIFY {
            self.stream_verify(start, payload)?;
        }
        Ok(stats)
    }

    /// Program every image of a pack container at its stored offset
    pub fn pack_program(&mut self, pack: &PackImage<'_>, option: u32) -> Result<()> {
        for entry in pack.entries() {
            self.check_start(entry.offset)?;
        }

        let count = pack.entry_count();
        for (i, entry) in pack.entries().iter().enumerate() {
            let data = pack.entry_data(i)?;
            self.send_command(&CommandFrame::new(
                Action::Write,
                entry.offset,
                entry.length,
                entry.image_type,
            ))?;
            self.reporter
                .begin(Phase::Program, entry.length, format!("{}/{}", i, count));
            self.write_chunks(data, TRANSFER_SIZE, Phase::Program, true)?;
            let status = self
                .read_u32()
                .inspect_err(|_| self.transition(State::TransferFailed))?;
            log::debug!("device {}: image {} status 0x{:08X}", self.id(), i, status);
            self.transition(State::Completed);
            self.reporter.finish(Phase::Program);

            if option == opt::VERIFY {
                self.stream_verify(entry.offset, data)?;
            }
        }
        Ok(())
    }

    /// Read `length` bytes from `start`
    pub fn read_stream(&mut self, start: u64, length: u64, option: u32) -> Result<Vec<u8>> {
        self.send_command(&CommandFrame::new(Action::Read, start, length, option))?;
        self.transition(State::Transferring);
        self.reporter.begin(Phase::Read, length, String::new());

        let mut out = Vec::with_capacity(length.min(READ_RESERVE) as usize);
        let mut remain = length;
        while remain > 0 {
            self.check_cancel()?;
            let data = self
                .receive_chunk(remain)
                .inspect_err(|_| self.transition(State::TransferFailed))?;
            remain -= data.len() as u64;
            out.extend_from_slice(&data);
            self.reporter.advance(Phase::Read, length - remain);
        }
        self.transition(State::Completed);
        self.reporter.finish(Phase::Read);
        Ok(out)
    }

    /// Load the OTP writer helper into RAM, then hand it the fuse data
    pub fn otp_program(&mut self, writer: &[u8], data: &[u8], option: u32) -> Result<()> {
        self.media = Media::Otp;
        self.send_command(&CommandFrame::new(
            Action::Load,
            OTP_WRITER_ADDR,
            writer.len() as u64,
            option,
        ))?;
        self.reporter
            .begin(Phase::Load, writer.len() as u64, String::new());
        self.write_chunks(writer, TRANSFER_SIZE, Phase::Load, true)?;
        self.reporter.finish(Phase::Load);

        self.send_command(&CommandFrame::new(
            Action::Write,
            0,
            data.len() as u64,
            option,
        ))?;
        // The writer reports no progress, only the final byte count
        self.reporter.begin(Phase::Otp, data.len() as u64, String::new());
        self.write_chunks(data, data.len(), Phase::Otp, true)?;
        self.transition(State::Completed);
        self.reporter.finish(Phase::Otp);
        Ok(())
    }

    /// Read the fuse area; `option` selects blocks
    pub fn otp_read(&mut self, length: u64, option: u32) -> Result<Vec<u8>> {
        self.media = Media::Otp;
        self.read_stream(0, length, option)
    }

    /// Export SD/eMMC as mass storage, or eject it
    pub fn msc(&mut self, reserve: u64, option: u32) -> Result<()> {
        self.media = Media::SdEmmc;
        self.send_command(&CommandFrame::new(Action::Msc, reserve, 0, option))?;
        self.transition(State::Completed);
        Ok(())
    }

    /// Upload the DDR init image and the USB boot stub
    pub fn attach(&mut self, ini: &[u8], xusb: &[u8]) -> Result<()> {
        self.check_cancel()?;
        self.transport
            .write(&attach_header(ini.len() as u32, DDR_INIT_EXEC_ADDR))?;
        self.transport.write(ini)?;
        self.transition(State::CommandSent);

        let echoed = self.read_u32()?;
        if echoed as usize != ini.len() {
            log::error!("device {}: length error {}", self.id(), echoed);
            self.transition(State::AckFailed);
            return Err(ProtocolError::AckSizeMismatch {
                expected: ini.len() as u32,
                actual: echoed,
            }
            .into());
        }
        let ack = self.read_u32()?;
        if ack != ACK {
            self.transition(State::AckFailed);
            return Err(ProtocolError::AckMismatch { got: ack }.into());
        }
        self.transition(State::AckOk);

        self.transport
            .write(&attach_header(xusb.len() as u32, XUSB_EXEC_ADDR))?;
        self.reporter
            .begin(Phase::Attach, xusb.len() as u64, String::new());
        self.write_chunks(xusb, TRANSFER_SIZE, Phase::Attach, false)?;
        self.transition(State::Completed);
        self.reporter.finish(Phase::Attach);
        Ok(())
    }

    /// Query and decode the device information block
    pub fn device_info(&mut self) -> Result<DeviceInfo> {
        let raw = self.transport.get_info()?;
        DeviceInfo::parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted device answers and records every host write
    struct Scripted {
        inbound: VecDeque<u8>,
        writes: Vec<Vec<u8>>,
        align: BlockAlign,
    }

    impl Scripted {
        fn new(words: &[u32]) -> Self {
            let mut s = Self {
                inbound: VecDeque::new(),
                writes: Vec::new(),
                align: BlockAlign {
                    nand: 0x2_0000,
                    spinand: 0x2_0000,
                },
            };
            s.push_words(words);
            s
        }

        fn push_words(&mut self, words: &[u32]) {
            for w in words {
                self.inbound.extend(w.to_le_bytes());
            }
        }

        fn push_bytes(&mut self, data: &[u8]) {
            self.inbound.extend(data.iter().copied());
        }
    }

    impl Transport for Scripted {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.writes.push(data.to_vec());
            Ok(())
        }

        fn read(&mut self, len: usize) -> Result<Vec<u8>> {
            let n = len.min(self.inbound.len());
            Ok(self.inbound.drain(..n).collect())
        }

        fn set_media(&mut self, _media: Media) -> Result<()> {
            Ok(())
        }

        fn get_align(&mut self) -> Result<BlockAlign> {
            Ok(self.align)
        }

        fn get_info(&mut self) -> Result<Vec<u8>> {
            Ok(DeviceInfo::default().to_bytes())
        }

        fn get_id(&self) -> usize {
            0
        }
    }

    fn session(t: Scripted, media: Media) -> DeviceSession<Scripted> {
        let mut s = DeviceSession::new(t);
        s.select_media(media);
        s
    }

    #[test]
    fn test_chunk_count_and_acked_sum() {
        let payload = vec![0xA5u8; 10_000];
        let t = Scripted::new(&[ACK, 4096, 4096, 1808, 0]);
        let mut s = session(t, Media::SpiNor);
        let stats = s.program(0x1000, &payload, opt::NONE).unwrap();
        assert_eq!(stats.chunks, payload.len().div_ceil(TRANSFER_SIZE));
        assert_eq!(stats.acked, payload.len() as u64);
        assert_eq!(s.state(), State::Completed);
        // frame + 3 chunks
        assert_eq!(s.transport().writes.len(), 4);
        assert_eq!(s.transport().writes[3].len(), 1808);
    }

    #[test]
    fn test_bad_ack_stops_before_payload() {
        let mut s = session(Scripted::new(&[0xDEAD_BEEF]), Media::SpiNor);
        let err = s.program(0, &[1, 2, 3], opt::NONE).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AckMismatch { got: 0xDEAD_BEEF })
        ));
        assert_eq!(s.state(), State::AckFailed);
        assert_eq!(s.transport().writes.len(), 1);
    }

    #[test]
    fn test_ack_size_mismatch() {
        let mut s = session(Scripted::new(&[ACK, 4000]), Media::SpiNor);
        let err = s.program(0, &[0u8; 5000], opt::NONE).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AckSizeMismatch {
                expected: 4096,
                actual: 4000
            })
        ));
        assert_eq!(s.state(), State::TransferFailed);
    }

    #[test]
    fn test_misaligned_nand_sends_nothing() {
        let mut s = session(Scripted::new(&[]), Media::Nand);
        let err = s.program(0x1000, &[0u8; 16], opt::NONE).unwrap_err();
        assert!(matches!(err, Error::Alignment { align: 0x2_0000, .. }));
        assert!(s.transport().writes.is_empty());
    }

    #[test]
    fn test_verify_truncates_padded_last_chunk() {
        let payload: Vec<u8> = (0..700u32).map(|i| i as u8).collect();
        let mut t = Scripted::new(&[ACK, 700, 0, ACK, 512]);
        t.push_bytes(&payload[..512]);
        t.push_words(&[512]);
        let mut padded = payload[512..].to_vec();
        padded.resize(512, 0);
        t.push_bytes(&padded);

        let mut s = session(t, Media::SdEmmc);
        s.program(0, &payload, opt::VERIFY).unwrap();
        assert_eq!(s.state(), State::VerifyOk);
        // host echoes each announced length
        let writes = &s.transport().writes;
        assert_eq!(writes[writes.len() - 1], 512u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_verify_mismatch() {
        let payload = [1u8, 2, 3, 4];
        let mut t = Scripted::new(&[ACK, 4, 0, ACK, 4]);
        t.push_bytes(&[1, 2, 9, 4]);
        let mut s = session(t, Media::SpiNor);
        let err = s.program(0, &payload, opt::VERIFY).unwrap_err();
        assert!(matches!(err, Error::VerifyFailed { offset: 0 }));
        assert_eq!(s.state(), State::VerifyFailed);
    }

    #[test]
    fn test_erase_polls_until_complete() {
        let mut s = session(
            Scripted::new(&[ACK, 0, 40, 40, 0xFFFF, 90, 100]),
            Media::SpiNor,
        );
        s.erase(0, 0, opt::NONE).unwrap();
        assert_eq!(s.state(), State::Completed);
        assert!(s.transport().inbound.is_empty());
    }

    #[test]
    fn test_read_stream() {
        let mut t = Scripted::new(&[ACK, 3]);
        t.push_bytes(b"abc");
        t.push_words(&[3]);
        t.push_bytes(b"def");
        let mut s = session(t, Media::SpiNor);
        assert_eq!(s.read_stream(0, 5, opt::NONE).unwrap(), b"abcde");
    }

    #[test]
    fn test_huge_read_length_from_short_device() {
        let mut t = Scripted::new(&[ACK, 3]);
        t.push_bytes(b"abc");
        t.push_words(&[0]);
        let mut s = session(t, Media::SpiNor);
        let length = u64::MAX / 2;
        assert!(matches!(
            s.read_stream(0, length, opt::NONE),
            Err(Error::Protocol(ProtocolError::EmptyChunk { remaining })) if remaining == length - 3
        ));
        assert_eq!(s.state(), State::TransferFailed);
    }

    #[test]
    fn test_empty_chunk_is_an_error() {
        let mut s = session(Scripted::new(&[ACK, 0]), Media::SpiNor);
        assert!(matches!(
            s.read_stream(0, 8, opt::NONE),
            Err(Error::Protocol(ProtocolError::EmptyChunk { remaining: 8 }))
        ));
    }

    #[test]
    fn test_attach_ignores_last_stub_ack() {
        let ini = [0x11u8; 100];
        let xusb = vec![0x22u8; 4096 + 10];
        let mut s = session(Scripted::new(&[100, ACK, 4096]), Media::Unknown);
        s.attach(&ini, &xusb).unwrap();
        let w = &s.transport().writes;
        assert_eq!(w.len(), 5);
        assert_eq!(&w[2][4..], &XUSB_EXEC_ADDR.to_le_bytes());
        assert_eq!(w[4].len(), 10);
    }

    #[test]
    fn test_otp_program_sequence() {
        let writer = vec![0u8; 5000];
        let data = vec![1u8; 220];
        let mut s = session(
            Scripted::new(&[ACK, 4096, 904, ACK, 220]),
            Media::Unknown,
        );
        s.otp_program(&writer, &data, 0x8100).unwrap();
        assert_eq!(s.media(), Media::Otp);
        let load = CommandFrame::parse(&s.transport().writes[0]).unwrap();
        assert_eq!(load.action, Action::Load);
        assert_eq!(load.start, OTP_WRITER_ADDR);
        assert_eq!(load.option, 0x8100);
        assert_eq!(s.transport().writes.last().unwrap().len(), 220);
    }

    #[test]
    fn test_cancelled_before_frame() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let flag = Arc::new(AtomicBool::new(true));
        let mut s = session(Scripted::new(&[ACK]), Media::SpiNor).with_cancel(flag);
        assert!(matches!(s.msc(0, opt::NONE), Err(Error::Cancelled)));
        assert!(s.transport().writes.is_empty());
    }
}
