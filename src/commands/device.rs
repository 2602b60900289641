//! Attach, info and device listing

use nuwriter_core::ops;

use super::{report, with_sessions};
use crate::resources;

/// Upload the DDR init image and boot stub, then show what attached
pub fn cmd_attach(transport: &str, ini: &str, xusb: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ini_data = resources::load(ini)?;
    let xusb_data = resources::load(xusb)?;

    let outcome = with_sessions(transport, |sessions| {
        let outcome = ops::attach(sessions, &ini_data, &xusb_data)?;
        if outcome.success > 0 {
            for (id, info) in ops::device_info(sessions)? {
                match info {
                    Ok(info) => log::debug!("device {}:\n{}", id, info),
                    Err(e) => log::warn!("device {}: no info block: {}", id, e),
                }
            }
        }
        Ok(outcome)
    })?;
    report("attached", "attach", &outcome)
}

/// Print every device's information block
pub fn cmd_info(transport: &str) -> Result<(), Box<dyn std::error::Error>> {
    let infos = with_sessions(transport, |sessions| ops::device_info(sessions))?;
    let mut failed = 0;
    for (id, info) in infos {
        println!("Device #{}", id);
        match info {
            Ok(info) => println!("{}\n", info),
            Err(e) => {
                println!("  unavailable: {}\n", e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(format!("Failed to query {} device(s)", failed).into());
    }
    Ok(())
}

/// List attached responders without opening them
pub fn cmd_list_devices() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "usb")]
    {
        let devices = nuwriter_usb::list_devices()?;
        if devices.is_empty() {
            println!("No USB boot responder attached");
        }
        for d in devices {
            println!(
                "  #{:<3} bus {:03} address {:03} ({:04x}:{:04x})",
                d.id,
                d.bus,
                d.address,
                nuwriter_usb::NUWRITER_USB_VENDOR,
                nuwriter_usb::NUWRITER_USB_PRODUCT
            );
        }
        println!();
    }
    print!("{}", crate::transports::transport_help());
    Ok(())
}
