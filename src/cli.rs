//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flashfs")]
#[command(author, version, about = "Circular append-only log over a flash image", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the flash image file
    #[arg(long, global = true, default_value = "flashfs.img")]
    pub image: PathBuf,

    /// Path to the TOML config file (arming_erase_free_space, background_erase)
    #[arg(long, global = true, default_value = "flashfs.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Format a new image: erase every sector and reset head/tail to zero
    Format {
        /// Program granularity, in bytes
        #[arg(long, default_value_t = 2048)]
        page_size: u32,
        /// Erase granularity, in bytes
        #[arg(long, default_value_t = 16 * 1024)]
        sector_size: u32,
        /// Number of sectors in the region
        #[arg(long, default_value_t = 8)]
        sectors: u32,
    },
    /// Recover head/tail from the image and print them
    Status,
    /// Append bytes to the log
    Write {
        /// Text to append (UTF-8)
        #[arg(long, conflicts_with = "hex")]
        text: Option<String>,
        /// Bytes to append, as hex (e.g. deadbeef)
        #[arg(long, conflicts_with = "text")]
        hex: Option<String>,
        /// Drive tick() after writing to let the erase controller catch up
        #[arg(long, default_value_t = 0)]
        tick: u32,
    },
    /// Read `len` bytes starting at `addr` (absolute device address)
    Dump {
        #[arg(value_parser = parse_u32)]
        addr: u32,
        len: u32,
    },
    /// Erase the entire image and reset head/tail to zero
    EraseAll,
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}
