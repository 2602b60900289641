//! CLI command implementations
//!
//! Device commands open every device the transport string selects, run one
//! entry operation across them and print the tally. Offline commands (pack,
//! convert) only touch files.

pub mod convert;
pub mod device;
pub mod media;
pub mod otp;
pub mod pack;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use nuwriter_core::{DeviceSession, Outcome};

use crate::progress::ProgressRenderer;
use crate::transports::{open_transports, BoxedTransport};

/// One session per selected device
pub type Sessions = Vec<DeviceSession<BoxedTransport>>;

/// Open the devices, run `f` on them with progress bars, then close them
pub fn with_sessions<R, F>(transport: &str, f: F) -> Result<R, Box<dyn std::error::Error>>
where
    F: FnOnce(&mut Sessions) -> nuwriter_core::Result<R>,
{
    let renderer = ProgressRenderer::start();
    let result = {
        let mut sessions: Sessions = open_transports(transport)?
            .into_iter()
            .map(|t| DeviceSession::new(t).with_reporter(renderer.sender()))
            .collect();
        log::debug!("{} device(s) selected", sessions.len());
        f(&mut sessions)
    };
    renderer.finish();
    Ok(result?)
}

/// Print the tally of a fan-out run; any failure makes the command fail
pub fn report(done: &str, verb: &str, outcome: &Outcome) -> Result<(), Box<dyn std::error::Error>> {
    println!("Successfully {} {} device(s)", done, outcome.success);
    if outcome.failure > 0 {
        for (id, e) in &outcome.errors {
            eprintln!("  device {}: {}", id, e);
        }
        return Err(format!("Failed to {} {} device(s)", verb, outcome.failure).into());
    }
    Ok(())
}

/// Read file contents into a Vec
pub fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut file =
        File::open(path).map_err(|e| format!("Open {} failed: {}", path.display(), e))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    log::info!("Read {} bytes from {}", data.len(), path.display());
    Ok(data)
}

/// Whether `path` names a JSON file
pub fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuwriter_core::Error;

    #[test]
    fn test_report() {
        let ok = Outcome {
            success: 3,
            ..Default::default()
        };
        assert!(report("programmed", "program", &ok).is_ok());

        let bad = Outcome {
            success: 2,
            failure: 1,
            errors: vec![(1, Error::Cancelled)],
        };
        let err = report("programmed", "program", &bad).unwrap_err();
        assert_eq!(err.to_string(), "Failed to program 1 device(s)");
    }

    #[test]
    fn test_is_json() {
        assert!(is_json(Path::new("otp.JSON")));
        assert!(!is_json(Path::new("otp.bin")));
        assert!(!is_json(Path::new("json")));
    }
}
