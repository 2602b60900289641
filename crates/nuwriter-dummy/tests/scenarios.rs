//! End-to-end runs of the entry operations against emulated responders

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use nuwriter_core::container::pack::{pack, PackInput};
use nuwriter_core::otp::{KeyEntry, KeySlot, OtpModel};
use nuwriter_core::protocol::{State, ACK, OTP_WRITER_ADDR};
use nuwriter_core::{
    ops, opt, Action, DeviceSession, Error, Media, Phase, ProgressEvent, ProtocolError,
};
use nuwriter_dummy::{DummyConfig, DummyDevice, Fault};
use pretty_assertions::assert_eq;

fn sessions(count: usize) -> Vec<DeviceSession<DummyDevice>> {
    let config = DummyConfig {
        count,
        size: 0x10_0000,
        ..Default::default()
    };
    DummyDevice::open_all(&config)
        .into_iter()
        .map(DeviceSession::new)
        .collect()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

#[test]
fn test_one_bad_device_does_not_stop_the_others() {
    let config = DummyConfig {
        count: 3,
        ..Default::default()
    };
    let mut devices = DummyDevice::open_all(&config);
    let bad = devices.remove(1).with_fault(Fault::BadAck);
    devices.insert(1, bad);
    let mut sessions: Vec<_> = devices.into_iter().map(DeviceSession::new).collect();

    let payload = pattern(10_000);
    let outcome = ops::program(&mut sessions, Media::SpiNor, 0x1000, &payload, opt::NONE).unwrap();

    assert_eq!((outcome.success, outcome.failure), (2, 1));
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].0, 1);
    assert!(matches!(
        outcome.errors[0].1,
        Error::Protocol(ProtocolError::AckMismatch { got }) if got == !ACK
    ));

    for id in [0, 2] {
        let dev = sessions[id].transport();
        assert_eq!(dev.chunks_received(), 3);
        assert_eq!(&dev.storage(Media::SpiNor)[0x1000..0x1000 + payload.len()], &payload[..]);
        assert_eq!(sessions[id].state(), State::Completed);
    }
    assert_eq!(sessions[1].transport().chunks_received(), 0);
    assert_eq!(sessions[1].state(), State::AckFailed);
}

#[test]
fn test_program_with_verify() {
    let mut s = sessions(2);
    let payload = pattern(9000);
    let outcome = ops::program(&mut s, Media::SpiNand, 0x4_0000, &payload, opt::VERIFY).unwrap();
    assert!(outcome.all_ok());

    for d in &s {
        assert_eq!(d.state(), State::VerifyOk);
        let frames = d.transport().frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].action, Action::Write);
        // Verification is local to the host
        assert_eq!(frames[0].option, opt::NONE);
        assert_eq!(frames[1].action, Action::Read);
        assert_eq!(frames[1].length, payload.len() as u64);
    }
}

#[test]
fn test_corrupt_readback_fails_verify() {
    let config = DummyConfig::default();
    let mut s = vec![DeviceSession::new(
        DummyDevice::new(0, config).with_fault(Fault::CorruptRead),
    )];
    let outcome = ops::program(&mut s, Media::SpiNor, 0, &pattern(5000), opt::VERIFY).unwrap();
    assert_eq!((outcome.success, outcome.failure), (0, 1));
    assert!(matches!(
        outcome.errors[0].1,
        Error::VerifyFailed { offset: 0 }
    ));
    assert_eq!(s[0].state(), State::VerifyFailed);
}

#[test]
fn test_misaligned_start_writes_nothing() {
    let mut s = sessions(2);
    let outcome = ops::program(&mut s, Media::Nand, 0x1_0000, &[1; 64], opt::NONE).unwrap();
    assert_eq!((outcome.success, outcome.failure), (0, 2));
    assert!(s.iter().all(|d| d.transport().frames().is_empty()));

    let outcome = ops::program(&mut s, Media::SpiNor, 0x800, &[1; 64], opt::NONE).unwrap();
    assert_eq!(outcome.failure, 2);
    assert!(s.iter().all(|d| d.transport().frames().is_empty()));
}

#[test]
fn test_short_chunk_ack_is_a_size_mismatch() {
    let mut s = vec![DeviceSession::new(
        DummyDevice::new(0, DummyConfig::default()).with_fault(Fault::ShortAck),
    )];
    let outcome = ops::program(&mut s, Media::SpiNor, 0, &[0x5A; 100], opt::NONE).unwrap();
    assert!(matches!(
        outcome.errors[0].1,
        Error::Protocol(ProtocolError::AckSizeMismatch {
            expected: 100,
            actual: 99
        })
    ));
    assert_eq!(s[0].state(), State::TransferFailed);
}

#[test]
fn test_disconnected_device_fails_alone() {
    let config = DummyConfig {
        count: 2,
        ..Default::default()
    };
    let mut devices = DummyDevice::open_all(&config);
    devices[0] = DummyDevice::new(0, config.clone()).with_fault(Fault::Disconnected);
    let mut s: Vec<_> = devices.into_iter().map(DeviceSession::new).collect();

    let outcome = ops::erase(&mut s, Media::SpiNor, 0, 0x1000, opt::NONE).unwrap();
    assert_eq!((outcome.success, outcome.failure), (1, 1));
    assert!(matches!(outcome.errors[0], (0, Error::Transport(_))));
}

#[test]
fn test_read_pads_sd_sectors() {
    let mut s = sessions(1);
    let payload = pattern(1500);
    ops::program(&mut s, Media::SdEmmc, 0x200, &payload, opt::NONE).unwrap();

    let data = ops::read(&mut s, Media::SdEmmc, 0x200, 1500, opt::NONE).unwrap();
    assert_eq!(data, payload);

    let data = ops::read(&mut s, Media::SpiNor, 0x10, 8, opt::NONE).unwrap();
    assert_eq!(data, vec![0xFF; 8]);
}

#[test]
fn test_read_spans_many_chunks() {
    let mut s = sessions(1);
    let payload = pattern(3 * 4096 + 17);
    ops::program(&mut s, Media::SpiNor, 0x2000, &payload, opt::NONE).unwrap();
    let data = ops::read(&mut s, Media::SpiNor, 0x2000, payload.len() as u64, opt::NONE).unwrap();
    assert_eq!(data.len(), payload.len());
    assert!(data == payload);
}

#[test]
fn test_empty_read_chunk_is_an_error() {
    let mut s = vec![DeviceSession::new(
        DummyDevice::new(0, DummyConfig::default()).with_fault(Fault::EmptyChunk),
    )];
    assert!(matches!(
        ops::read(&mut s, Media::SpiNor, 0, 64, opt::NONE),
        Err(Error::Protocol(ProtocolError::EmptyChunk { remaining: 64 }))
    ));
}

#[test]
fn test_erase_restores_blank_and_reports_progress() {
    let (tx, rx) = mpsc::channel();
    let mut s: Vec<_> = DummyDevice::open_all(&DummyConfig::default())
        .into_iter()
        .map(|d| DeviceSession::new(d).with_reporter(tx.clone()))
        .collect();
    drop(tx);

    ops::program(&mut s, Media::SpiNand, 0, &[0; 8192], opt::NONE).unwrap();
    let outcome = ops::erase(&mut s, Media::SpiNand, 0, 0x2_0000, opt::NONE).unwrap();
    assert!(outcome.all_ok());
    assert!(s[0].transport().storage(Media::SpiNand)[..8192]
        .iter()
        .all(|&b| b == 0xFF));
    drop(s);

    let erase_progress: Vec<u64> = rx
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Advance {
                phase: Phase::Erase,
                done,
                ..
            } => Some(done),
            _ => None,
        })
        .collect();
    assert_eq!(erase_progress, vec![40, 80, 100]);
}

#[test]
fn test_pack_program_writes_each_image() {
    let mut s = sessions(2);
    let first = pattern(5000);
    let second = vec![0x3C; 300];
    let container = pack(&[
        PackInput {
            data: first.clone(),
            offset: 0,
            image_type: 1,
        },
        PackInput {
            data: second.clone(),
            offset: 0x2_0000,
            image_type: 0,
        },
    ]);

    let outcome = ops::pack_program(&mut s, Media::Nand, &container, opt::VERIFY).unwrap();
    assert!(outcome.all_ok());

    for d in &s {
        let dev = d.transport();
        let writes: Vec<_> = dev
            .frames()
            .iter()
            .filter(|f| f.action == Action::Write)
            .collect();
        assert_eq!(writes.len(), 2);
        assert_eq!((writes[0].start, writes[0].option), (0, 1));
        assert_eq!((writes[1].start, writes[1].option), (0x2_0000, 0));

        let nand = dev.storage(Media::Nand);
        assert_eq!(&nand[..first.len()], &first[..]);
        assert_eq!(&nand[0x2_0000..0x2_0000 + second.len()], &second[..]);
    }
}

#[test]
fn test_otp_program_then_read_all() {
    let mut s = sessions(1);
    let mut update = OtpModel {
        mac0: Some([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
        ..Default::default()
    };
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(&[0x9C; 16]);
    update.keys[KeySlot::Huk1.index()] = Some(KeyEntry {
        key,
        size: 128,
        meta: 0,
    });

    let writer = vec![0xE1; 6000];
    let outcome = ops::otp_program(&mut s, &writer, &update, None).unwrap();
    assert!(outcome.all_ok());

    let dev = s[0].transport();
    let frames = dev.frames();
    assert_eq!(frames[0].action, Action::Load);
    assert_eq!(frames[0].start, OTP_WRITER_ADDR);
    assert_eq!(frames[0].length, writer.len() as u64);
    assert_eq!(frames[1].action, Action::Write);
    assert_eq!(frames[1].start, 0);
    // Two writer chunks plus the fuse payload in one piece
    assert_eq!(dev.chunks_received(), 3);
    let (payload, option) = dev.otp_payload().unwrap();
    assert_eq!(payload.len(), 208 + 44);
    assert_eq!(option, frames[1].option);

    let read = ops::otp_read_all(&mut s).unwrap();
    assert_eq!(read.mac0, update.mac0);
    assert_eq!(read.mac1, None);
    assert_eq!(read.key(KeySlot::Huk1).map(|k| k.key), Some(key));
    assert_eq!(read.key(KeySlot::Huk0), None);
}

#[test]
fn test_attach_uploads_both_images() {
    let mut s = sessions(2);
    let ini = vec![0x11; 700];
    let xusb = pattern(9000);
    let outcome = ops::attach(&mut s, &ini, &xusb).unwrap();
    assert!(outcome.all_ok());
    for d in &s {
        assert!(d.transport().is_attached());
        assert_eq!(d.transport().chunks_received(), 3);
        assert!(d.transport().frames().is_empty());
    }
}

#[test]
fn test_msc_export_and_eject() {
    let mut s = sessions(1);
    assert!(ops::msc_toggle(&mut s, 0x40_0000, false).unwrap().all_ok());
    assert!(ops::msc_toggle(&mut s, 0, true).unwrap().all_ok());

    let frames = s[0].transport().frames();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.action == Action::Msc));
    assert_eq!((frames[0].start, frames[0].option), (0x40_0000, opt::NONE));
    assert_eq!(frames[1].option, opt::EJECT);
}

#[test]
fn test_device_info_reflects_geometry() {
    let config = DummyConfig {
        count: 2,
        nand_block: 0x4_0000,
        ..Default::default()
    };
    let mut s: Vec<_> = DummyDevice::open_all(&config)
        .into_iter()
        .map(DeviceSession::new)
        .collect();
    let infos = ops::device_info(&mut s).unwrap();
    let ids: Vec<usize> = infos.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![0, 1]);
    let info = infos[0].1.as_ref().unwrap();
    assert_eq!(info.block_align().nand, 0x4_0000);
    assert_eq!(info.page_size, 2048);
}

#[test]
fn test_cancel_stops_every_device() {
    let flag = Arc::new(AtomicBool::new(false));
    let mut s: Vec<_> = DummyDevice::open_all(&DummyConfig {
        count: 4,
        ..Default::default()
    })
    .into_iter()
    .map(|d| DeviceSession::new(d).with_cancel(flag.clone()))
    .collect();
    flag.store(true, Ordering::Relaxed);

    let outcome = ops::program(&mut s, Media::SpiNor, 0, &[0; 64], opt::NONE).unwrap();
    assert_eq!((outcome.success, outcome.failure), (0, 4));
    assert!(outcome
        .errors
        .iter()
        .all(|(_, e)| matches!(e, Error::Cancelled)));
    assert!(s.iter().all(|d| d.transport().frames().is_empty()));
}

#[test]
fn test_many_devices_share_the_pool() {
    let mut s = sessions(12);
    let payload = pattern(4096 * 2);
    let outcome = ops::program(&mut s, Media::DdrSram, 0, &payload, opt::NONE).unwrap();
    assert_eq!(outcome.success, 12);
    assert!(s
        .iter()
        .all(|d| d.transport().storage(Media::DdrSram)[..payload.len()] == payload[..]));
}
