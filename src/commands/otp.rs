//! OTP fuse commands

use std::fs;
use std::path::Path;

use nuwriter_core::otp::{self, OtpModel};
use nuwriter_core::ops;

use super::{is_json, read_file, report, with_sessions};
use crate::resources;

/// Fuse content from a JSON description or a binary fuse map
fn load_model(path: &Path) -> Result<OtpModel, Box<dyn std::error::Error>> {
    if is_json(path) {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Open {} failed: {}", path.display(), e))?;
        Ok(otp::from_json(&text)?)
    } else {
        Ok(otp::decode(&read_file(path)?)?)
    }
}

/// Burn `input` into every device's fuses
pub fn cmd_write_otp(
    transport: &str,
    input: &Path,
    writer: &str,
    current: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let update = load_model(input)?;
    let current = current.map(load_model).transpose()?;
    let writer = resources::load(writer)?;

    let outcome = with_sessions(transport, |sessions| {
        ops::otp_program(sessions, &writer, &update, current.as_ref())
    })?;
    report("programmed OTP on", "program OTP on", &outcome)
}

/// Read the fuses of the first device
pub fn cmd_read_otp(transport: &str, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if is_json(output) {
        let model = with_sessions(transport, |sessions| ops::otp_read_all(sessions))?;
        fs::write(output, otp::to_json(&model)?)?;
    } else {
        let raw = with_sessions(transport, |sessions| {
            ops::otp_read(sessions, otp::READBACK_SIZE as u64, otp::READ_ALL_OPTION)
        })?;
        fs::write(output, raw)?;
    }
    println!("OTP content saved to {}", output.display());
    Ok(())
}
