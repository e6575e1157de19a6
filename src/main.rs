//! flashfs - demo CLI for a circular append-only log over a file-backed
//! flash image.
//!
//! Ties `flashfs-core` to a file-backed [`FlashDevice`](flashfs_core::device::FlashDevice)
//! so the write-pointer recovery, background erase controller, and circular
//! bookkeeping can be exercised interactively across separate process
//! invocations, the way the core would behave across a device reboot.

mod cli;
mod config;
mod file_flash;

use clap::Parser;
use cli::{Cli, Commands};
use file_flash::FileBackedFlash;
use flashfs_core::error::Error as CoreError;
use flashfs_core::recovery::RepairPolicy;
use flashfs_core::Flashfs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
enum DemoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("flashfs error: {0}")]
    Core(#[from] CoreError),
    #[error("image not found at {0}; run `flashfs format` first")]
    NoImage(String),
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), DemoError> {
    match &cli.command {
        Commands::Format {
            page_size,
            sector_size,
            sectors,
        } => cmd_format(&cli.image, *page_size, *sector_size, *sectors),
        Commands::Status => cmd_status(&cli.image, &cli.config),
        Commands::Write { text, hex, tick } => {
            cmd_write(&cli.image, &cli.config, text.as_deref(), hex.as_deref(), *tick)
        }
        Commands::Dump { addr, len } => cmd_dump(&cli.image, &cli.config, *addr, *len),
        Commands::EraseAll => cmd_erase_all(&cli.image, &cli.config),
    }
}

fn open_device(image: &Path) -> Result<FileBackedFlash, DemoError> {
    if !image.exists() {
        return Err(DemoError::NoImage(image.display().to_string()));
    }
    // Geometry isn't persisted anywhere (the spec keeps no superblock), so
    // the demo re-derives page/sector size from the same defaults `format`
    // used; a real board would bake these into the driver instead.
    Ok(FileBackedFlash::open(image, 2048, 16 * 1024)?)
}

fn open_fs(image: &Path, config_path: &Path) -> Result<Flashfs<FileBackedFlash>, DemoError> {
    let device = open_device(image)?;
    let cfg = config::load(config_path)?;
    match Flashfs::init(device, cfg) {
        Ok(fs) => Ok(fs),
        Err((device, CoreError::Corruption)) => {
            log::warn!("pointer recovery found more than one boundary; repairing as full");
            Ok(Flashfs::init_with_repair(device, cfg, RepairPolicy::TreatAsFull)?)
        }
        Err((_, e)) => Err(e.into()),
    }
}

fn cmd_format(image: &Path, page_size: u32, sector_size: u32, sectors: u32) -> Result<(), DemoError> {
    FileBackedFlash::format(image, page_size, sector_size, sectors)?;
    log::info!(
        "formatted {} ({} sectors x {} bytes, page {})",
        image.display(),
        sectors,
        sector_size,
        page_size
    );
    Ok(())
}

fn cmd_status(image: &Path, config_path: &Path) -> Result<(), DemoError> {
    let fs = open_fs(image, config_path)?;
    println!("total_size: {}", fs.total_size());
    println!("used_space: {}", fs.used_space());
    println!("free_space: {}", fs.free_space());
    println!("is_eof:     {}", fs.is_eof());
    Ok(())
}

fn cmd_write(
    image: &Path,
    config_path: &Path,
    text: Option<&str>,
    hex: Option<&str>,
    ticks: u32,
) -> Result<(), DemoError> {
    let payload = match (text, hex) {
        (Some(t), _) => t.as_bytes().to_vec(),
        (None, Some(h)) => parse_hex(h)?,
        (None, None) => return Err(DemoError::InvalidHex("no --text or --hex given".into())),
    };

    let mut fs = open_fs(image, config_path)?;
    let mut offset = 0usize;
    while offset < payload.len() {
        let n = fs.write_bytes(&payload[offset..])?;
        offset += n;
        if n == 0 {
            // Buffer full and the page it was handed to is still in
            // flight; drive the erase controller and the pending program
            // forward until there's room again.
            fs.tick()?;
        }
    }
    fs.flush_sync()?;
    for _ in 0..ticks {
        fs.tick()?;
    }
    log::info!("wrote {offset} bytes; used_space now {}", fs.used_space());
    Ok(())
}

fn cmd_dump(image: &Path, config_path: &Path, addr: u32, len: u32) -> Result<(), DemoError> {
    let mut fs = open_fs(image, config_path)?;
    let mut buf = vec![0u8; len as usize];
    fs.read_absolute(addr, &mut buf)?;
    for chunk in buf.chunks(16) {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("{}", hex.join(" "));
    }
    Ok(())
}

fn cmd_erase_all(image: &Path, config_path: &Path) -> Result<(), DemoError> {
    let mut fs = open_fs(image, config_path)?;
    fs.erase_all()?;
    log::info!("erased entire region; free_space now {}", fs.free_space());
    Ok(())
}

fn parse_hex(s: &str) -> Result<Vec<u8>, DemoError> {
    if s.len() % 2 != 0 {
        return Err(DemoError::InvalidHex(s.to_string()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| DemoError::InvalidHex(s.to_string())))
        .collect()
}
