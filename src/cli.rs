//! CLI argument parsing

use clap::{Parser, Subcommand};
use nuwriter_core::{opt, Media};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u64
fn parse_hex_u64(s: &str) -> Result<u64, String> {
    nuwriter_core::config::parse_int(s).map_err(|e| e.to_string())
}

/// Parse a media name (DDR, SRAM, SD, EMMC, NAND, SPINAND, SPINOR, OTP, USBH)
fn parse_media(s: &str) -> Result<Media, String> {
    match Media::from_name(s) {
        Media::Unknown => Err(format!("Unknown storage media: {}", s)),
        media => Ok(media),
    }
}

/// Parse an option name; "none" means no option
fn parse_option(s: &str) -> Result<u32, String> {
    match opt::from_name(s) {
        opt::NONE if !s.eq_ignore_ascii_case("none") => {
            Err(format!("Unknown option: {}", s))
        }
        option => Ok(option),
    }
}

/// Names of the transports compiled into this build
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn transport_names() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "usb")]
    names.push("usb");
    #[cfg(feature = "dummy")]
    names.push("dummy");
    names
}

/// Generate dynamic help text for the transport argument
fn transport_help() -> String {
    format!(
        "Transport to use, with optional key=value parameters [available: {}]",
        transport_names().join(", ")
    )
}

#[derive(Parser)]
#[command(name = "nuwriter")]
#[command(author, version, about = "MA35D1 USB boot programming tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Transport, e.g. "usb", "usb:all=1" or "dummy:count=3"
    #[arg(short, long, global = true, default_value = "usb", help = transport_help())]
    pub transport: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload the DDR init image and the USB boot stub
    Attach {
        /// DDR init image (looked up in ./, $NUWRITER_DATA_DIR and the data directory's ddrimg/)
        ini: String,

        /// Boot stub image
        #[arg(long, default_value = "xusb.bin")]
        xusb: String,
    },

    /// Show the information block of every device
    Info,

    /// List attached boot responders
    ListDevices,

    /// Write an image to media
    Write {
        /// Target media
        #[arg(short, long, value_parser = parse_media)]
        media: Media,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u64)]
        address: u64,

        /// Image file
        #[arg(short, long)]
        input: PathBuf,

        /// Write option (VERIFY, EXECUTE, RAW, NOCRC)
        #[arg(short, long, value_parser = parse_option, default_value = "none")]
        option: u32,
    },

    /// Program every image of a pack file, or of a pack config
    WritePack {
        /// Target media
        #[arg(short, long, value_parser = parse_media)]
        media: Media,

        /// Pack file, or a JSON pack config
        #[arg(short, long)]
        input: PathBuf,

        /// Verify each image after writing
        #[arg(long)]
        verify: bool,
    },

    /// Burn OTP fuses from a JSON description or a raw fuse map
    WriteOtp {
        /// Fuse content (.json, or a 672-byte binary map)
        #[arg(short, long)]
        input: PathBuf,

        /// OTP writer helper
        #[arg(long, default_value = "opt_writer.bin")]
        writer: String,

        /// Current fuse content; blocks already locked there are refused
        #[arg(long)]
        current: Option<PathBuf>,
    },

    /// Read media contents to a file
    Read {
        /// Source media
        #[arg(short, long, value_parser = parse_media)]
        media: Media,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u64)]
        address: u64,

        /// Length in bytes; 0 reads to the end of the media
        #[arg(short, long, value_parser = parse_hex_u64, default_value = "0")]
        length: u64,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Include bad blocks (NAND)
        #[arg(long)]
        with_bad: bool,
    },

    /// Read the OTP fuses
    ReadOtp {
        /// Output file; .json is decoded, anything else is the raw image
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Erase media
    Erase {
        /// Target media
        #[arg(short, long, value_parser = parse_media)]
        media: Media,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u64, default_value = "0")]
        address: u64,

        /// Length in bytes; 0 erases the whole media
        #[arg(short, long, value_parser = parse_hex_u64, default_value = "0")]
        length: u64,

        /// Scrub bad-block markers as well
        #[arg(long)]
        scrub: bool,
    },

    /// Export SD/eMMC as USB mass storage
    Storage {
        /// Bytes at the start of the media kept out of the export
        #[arg(short, long, value_parser = parse_hex_u64, default_value = "0")]
        reserve: u64,

        /// Stop exporting
        #[arg(long)]
        eject: bool,
    },

    /// Pack container operations
    #[command(subcommand)]
    Pack(PackCommands),

    /// Build secure-boot header, environment block and encrypted images
    Convert {
        /// JSON convert config
        config: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "conv")]
        output: PathBuf,
    },
}

/// Pack-related subcommands
#[derive(Subcommand)]
pub enum PackCommands {
    /// Build a pack file from a JSON config
    Create {
        /// JSON pack config
        config: PathBuf,

        /// Output pack file
        #[arg(short, long, default_value = "pack.bin")]
        output: PathBuf,
    },

    /// Build a flat image with every entry at its offset
    Stuff {
        /// JSON pack config
        config: PathBuf,

        /// Output image
        #[arg(short, long, default_value = "stuff.bin")]
        output: PathBuf,
    },

    /// Split a pack file into its images
    Unpack {
        /// Pack file
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "unpack")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_write() {
        let cli = Cli::try_parse_from([
            "nuwriter", "-t", "dummy", "write", "-m", "spinor", "-a", "0x1000", "-i", "u-boot.bin",
            "-o", "verify",
        ])
        .unwrap();
        assert_eq!(cli.transport, "dummy");
        match cli.command {
            Commands::Write {
                media,
                address,
                option,
                ..
            } => {
                assert_eq!(media, Media::SpiNor);
                assert_eq!(address, 0x1000);
                assert_eq!(option, opt::VERIFY);
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(Cli::try_parse_from(["nuwriter", "read", "-m", "floppy", "-a", "0", "-o", "x"]).is_err());
        assert!(Cli::try_parse_from([
            "nuwriter", "write", "-m", "nand", "-a", "0", "-i", "x", "-o", "sideways"
        ])
        .is_err());
    }
}
