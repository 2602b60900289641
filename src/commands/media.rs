//! Write, pack write, read, erase and mass-storage commands

use std::fs::File;
use std::io::Write;
use std::path::Path;

use nuwriter_core::config::{load_json, PackConfig};
use nuwriter_core::container::pack::pack;
use nuwriter_core::{ops, opt, Error, Media};

use super::{is_json, read_file, report, with_sessions};

/// Write `input` at `address` on every device
pub fn cmd_write(
    transport: &str,
    media: Media,
    address: u64,
    input: &Path,
    option: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = read_file(input)?;
    println!(
        "Writing {} bytes to {} at 0x{:08X}",
        data.len(),
        media,
        address
    );
    let outcome = with_sessions(transport, |sessions| {
        ops::program(sessions, media, address, &data, option)
    })?;
    report("programmed", "program", &outcome)
}

/// Load a pack file as-is, or build one from a JSON pack config
fn load_pack(input: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if is_json(input) {
        let config: PackConfig = load_json(input)?;
        let images = config.load_images()?;
        log::info!("Packing {} image(s) from {}", images.len(), input.display());
        Ok(pack(&images))
    } else {
        read_file(input)
    }
}

/// Program every image of a pack on every device
pub fn cmd_write_pack(
    transport: &str,
    media: Media,
    input: &Path,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let container = load_pack(input)?;
    let option = if verify { opt::VERIFY } else { opt::NONE };
    let outcome = with_sessions(transport, |sessions| {
        ops::pack_program(sessions, media, &container, option)
    })?;
    report("programmed", "program", &outcome)
}

/// Read from the first device into `output`
///
/// A zero length reads up to the capacity the device reports.
pub fn cmd_read(
    transport: &str,
    media: Media,
    address: u64,
    length: u64,
    output: &Path,
    with_bad: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let option = if with_bad { opt::WITH_BAD } else { opt::NONE };

    let data = with_sessions(transport, |sessions| {
        let length = match length {
            0 => {
                let info = sessions
                    .first_mut()
                    .ok_or(Error::NoDeviceFound)?
                    .device_info()?;
                let capacity = info.capacity(media).ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "{} does not report its size, give --length",
                        media
                    ))
                })?;
                capacity.saturating_sub(address)
            }
            n => n,
        };
        println!("Reading {} bytes from {} at 0x{:08X}", length, media, address);
        ops::read(sessions, media, address, length, option)
    })?;

    let mut file = File::create(output)?;
    file.write_all(&data)?;
    println!("Wrote {} bytes to {}", data.len(), output.display());
    Ok(())
}

/// Erase `length` bytes from `address`; zero length erases everything
pub fn cmd_erase(
    transport: &str,
    media: Media,
    address: u64,
    length: u64,
    scrub: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let option = if scrub { opt::SCRUB } else { opt::NONE };
    if length == 0 {
        println!("Erasing whole {}", media);
    } else {
        println!(
            "Erasing {} bytes of {} at 0x{:08X}",
            length, media, address
        );
    }
    let outcome = with_sessions(transport, |sessions| {
        ops::erase(sessions, media, address, length, option)
    })?;
    report("erased", "erase", &outcome)
}

/// Export SD/eMMC as mass storage, or stop exporting
pub fn cmd_storage(
    transport: &str,
    reserve: u64,
    eject: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = with_sessions(transport, |sessions| {
        ops::msc_toggle(sessions, reserve, eject)
    })?;
    if eject {
        report("ejected", "eject", &outcome)
    } else {
        report("exported", "export", &outcome)
    }
}
