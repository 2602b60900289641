//! Entry operations
//!
//! Each function validates its arguments against the media rules and decodes
//! any container input first. Only then does it touch a device, fanning out
//! through [`run_all`] for write-side operations. Reads are single-device.

use crate::container::pack::PackImage;
use crate::error::{Error, Result};
use crate::info::DeviceInfo;
use crate::media::{opt, Media};
use crate::orchestrator::{run_all, Outcome};
use crate::otp::{self, OtpModel};
use crate::session::DeviceSession;
use crate::transport::Transport;

fn first<T: Transport>(sessions: &mut [DeviceSession<T>]) -> Result<&mut DeviceSession<T>> {
    sessions.first_mut().ok_or(Error::NoDeviceFound)
}

/// Upload the DDR init image and boot stub to every device
pub fn attach<T: Transport>(
    sessions: &mut [DeviceSession<T>],
    ini: &[u8],
    xusb: &[u8],
) -> Result<Outcome> {
    if ini.is_empty() || xusb.is_empty() {
        return Err(Error::InvalidParameter(
            "attach needs a DDR init image and a boot stub".into(),
        ));
    }
    run_all(sessions, |s| s.attach(ini, xusb))
}

/// Query every device's information block, in session order
pub fn device_info<T: Transport>(
    sessions: &mut [DeviceSession<T>],
) -> Result<Vec<(usize, Result<DeviceInfo>)>> {
    if sessions.is_empty() {
        return Err(Error::NoDeviceFound);
    }
    Ok(sessions
        .iter_mut()
        .map(|s| (s.id(), s.device_info()))
        .collect())
}

/// Write `payload` at `start` on every device
pub fn program<T: Transport>(
    sessions: &mut [DeviceSession<T>],
    media: Media,
    start: u64,
    payload: &[u8],
    option: u32,
) -> Result<Outcome> {
    media.validate_write(option)?;
    run_all(sessions, |s| {
        s.select_media(media);
        s.program(start, payload, option).map(|_| ())
    })
}

/// Erase `length` bytes from `start` on every device
pub fn erase<T: Transport>(
    sessions: &mut [DeviceSession<T>],
    media: Media,
    start: u64,
    length: u64,
    option: u32,
) -> Result<Outcome> {
    media.validate_erase()?;
    run_all(sessions, |s| {
        s.select_media(media);
        s.erase(start, length, option)
    })
}

/// Program every image of a pack container on every device
///
/// The container is parsed once up front; a malformed one is reported before
/// any transfer begins.
pub fn pack_program<T: Transport>(
    sessions: &mut [DeviceSession<T>],
    media: Media,
    container: &[u8],
    option: u32,
) -> Result<Outcome> {
    media.validate_write(option)?;
    let pack = PackImage::parse(container)?;
    log::info!("pack holds {} image(s)", pack.entry_count());
    run_all(sessions, |s| {
        s.select_media(media);
        s.pack_program(&pack, option)
    })
}

/// Burn `update` into every device's fuses
///
/// With `current` given, the update is refused if it touches a locked block.
pub fn otp_program<T: Transport>(
    sessions: &mut [DeviceSession<T>],
    writer: &[u8],
    update: &OtpModel,
    current: Option<&OtpModel>,
) -> Result<Outcome> {
    if writer.is_empty() {
        return Err(Error::InvalidParameter("OTP writer image is empty".into()));
    }
    if let Some(current) = current {
        otp::ensure_writable(current, update)?;
    }
    let (payload, option) = otp::program_payload(update)?;
    if update.disables_secure_boot() {
        log::warn!("this OTP content disables secure boot");
    }
    run_all(sessions, |s| s.otp_program(writer, &payload, option))
}

/// Export SD/eMMC as USB mass storage, reserving `reserve` bytes, or eject it
pub fn msc_toggle<T: Transport>(
    sessions: &mut [DeviceSession<T>],
    reserve: u64,
    eject: bool,
) -> Result<Outcome> {
    let option = if eject { opt::EJECT } else { opt::NONE };
    Media::SdEmmc.validate_storage(option)?;
    run_all(sessions, |s| s.msc(reserve, option))
}

/// Read `length` bytes from the first device
///
/// A zero length returns an empty buffer without touching the device.
pub fn read<T: Transport>(
    sessions: &mut [DeviceSession<T>],
    media: Media,
    start: u64,
    length: u64,
    option: u32,
) -> Result<Vec<u8>> {
    media.validate_read()?;
    let session = first(sessions)?;
    if length == 0 {
        return Ok(Vec::new());
    }
    session.select_media(media);
    session.read_stream(start, length, option)
}

/// Read the raw fuse image from the first device
pub fn otp_read<T: Transport>(
    sessions: &mut [DeviceSession<T>],
    length: u64,
    option: u32,
) -> Result<Vec<u8>> {
    first(sessions)?.otp_read(length, option)
}

/// Read and decode every block and key from the first device
pub fn otp_read_all<T: Transport>(sessions: &mut [DeviceSession<T>]) -> Result<OtpModel> {
    let raw = otp_read(
        sessions,
        otp::READBACK_SIZE as u64,
        otp::READ_ALL_OPTION,
    )?;
    otp::decode_readback(&raw)
}
