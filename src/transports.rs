//! Transport registration and dispatch
//!
//! This module provides a centralized registry for all transports, with
//! support for feature-gated inclusion and dynamic help text generation.

use nuwriter_core::Transport;

/// A transport chosen at runtime
pub type BoxedTransport = Box<dyn Transport>;

/// Information about a transport
pub struct TransportInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available transports (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_transports() -> Vec<TransportInfo> {
    let mut transports = Vec::new();

    #[cfg(feature = "usb")]
    transports.push(TransportInfo {
        name: "usb",
        aliases: &[],
        description: "MA35D1 USB boot responder (VID:0416 PID:5963) (index=<n>,all=1,timeout=<ms>)",
    });

    #[cfg(feature = "dummy")]
    transports.push(TransportInfo {
        name: "dummy",
        aliases: &["emu"],
        description: "In-memory responder emulator for testing (count=<n>,size=<bytes>)",
    });

    transports
}

/// Generate help text listing all available transports
pub fn transport_help() -> String {
    let transports = available_transports();

    if transports.is_empty() {
        return "No transports available (recompile with transport features enabled)".to_string();
    }

    let mut help = String::from("Available transports:\n");
    for t in &transports {
        help.push_str(&format!("  {:8} - {}\n", t.name, t.description));
    }
    help
}

/// Resolve a name or alias to the canonical transport name
pub fn find_transport(name: &str) -> Option<&'static str> {
    available_transports()
        .into_iter()
        .find(|t| t.name == name || t.aliases.iter().any(|a| *a == name))
        .map(|t| t.name)
}

/// Open every device selected by a transport string
///
/// The string can be just the name (e.g., "usb") or include parameters
/// (e.g., "usb:all=1" or "dummy:count=3").
pub fn open_transports(transport: &str) -> Result<Vec<BoxedTransport>, Box<dyn std::error::Error>> {
    let (name, options) = parse_transport_string(transport);

    let canonical_name = match find_transport(name) {
        Some(n) => n,
        None => return Err(unknown_transport_error(name)),
    };

    match canonical_name {
        #[cfg(feature = "usb")]
        "usb" => {
            let config = nuwriter_usb::parse_options(&options)
                .map_err(|e| format!("Invalid usb parameters: {}", e))?;
            log::info!("Opening USB boot responder(s)...");
            let devices = nuwriter_usb::UsbTransport::open_all(&config).map_err(|e| {
                format!(
                    "Failed to open USB device: {}\n\
                     Make sure the board is in USB boot mode and you have permissions.",
                    e
                )
            })?;
            Ok(devices
                .into_iter()
                .map(|d| Box::new(d) as BoxedTransport)
                .collect())
        }

        #[cfg(feature = "dummy")]
        "dummy" => {
            let config = nuwriter_dummy::parse_options(&options)
                .map_err(|e| format!("Invalid dummy parameters: {}", e))?;
            log::info!("Emulating {} device(s)", config.count);
            Ok(nuwriter_dummy::DummyDevice::open_all(&config)
                .into_iter()
                .map(|d| Box::new(d) as BoxedTransport)
                .collect())
        }

        _ => Err(unknown_transport_error(name)),
    }
}

/// Parse a transport string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_transport_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn unknown_transport_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown transport: {}\n\n", name);
    msg.push_str(&transport_help());
    msg.push_str("\nUse 'nuwriter list-devices' for attached devices");
    msg.into()
}
