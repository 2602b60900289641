//! nuwriter - Device programming tool for the MA35D1 USB boot responder
//!
//! Attaches to boards in USB boot mode and programs, reads and erases their
//! media, burns OTP fuses and builds the container files they boot from.
//!
//! # Architecture
//!
//! The protocol engine, container codecs and OTP codec live in
//! `nuwriter-core`. Devices are reached through a transport selected with
//! `-t`:
//! - **usb** - the boot responder over USB bulk endpoints
//! - **dummy** - an in-memory responder, useful for trying commands out
//!
//! Every device command runs on all selected devices at once and reports how
//! many succeeded and how many failed.

mod cli;
mod commands;
mod progress;
mod resources;
mod transports;

use clap::Parser;
use cli::{Cli, Commands, PackCommands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let transport = cli.transport.as_str();

    match cli.command {
        Commands::Attach { ini, xusb } => commands::device::cmd_attach(transport, &ini, &xusb),
        Commands::Info => commands::device::cmd_info(transport),
        Commands::ListDevices => commands::device::cmd_list_devices(),
        Commands::Write {
            media,
            address,
            input,
            option,
        } => commands::media::cmd_write(transport, media, address, &input, option),
        Commands::WritePack {
            media,
            input,
            verify,
        } => commands::media::cmd_write_pack(transport, media, &input, verify),
        Commands::WriteOtp {
            input,
            writer,
            current,
        } => commands::otp::cmd_write_otp(transport, &input, &writer, current.as_deref()),
        Commands::Read {
            media,
            address,
            length,
            output,
            with_bad,
        } => commands::media::cmd_read(transport, media, address, length, &output, with_bad),
        Commands::ReadOtp { output } => commands::otp::cmd_read_otp(transport, &output),
        Commands::Erase {
            media,
            address,
            length,
            scrub,
        } => commands::media::cmd_erase(transport, media, address, length, scrub),
        Commands::Storage { reserve, eject } => {
            commands::media::cmd_storage(transport, reserve, eject)
        }
        Commands::Pack(subcmd) => match subcmd {
            PackCommands::Create { config, output } => commands::pack::cmd_create(&config, &output),
            PackCommands::Stuff { config, output } => commands::pack::cmd_stuff(&config, &output),
            PackCommands::Unpack { input, output } => commands::pack::cmd_unpack(&input, &output),
        },
        Commands::Convert { config, output } => commands::convert::cmd_convert(&config, &output),
    }
}
