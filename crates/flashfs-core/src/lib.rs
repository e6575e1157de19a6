//! flashfs-core - A circular, append-only log filesystem over raw flash
//!
//! Streams bytes forward into a sector-aligned region of a flash device;
//! when the region fills, the oldest sector is reclaimed and writing
//! continues. There is no random access, no file names, and no metadata
//! beyond the stream itself — every byte's position is recovered from the
//! medium on boot rather than from a superblock.
//!
//! `no_std` by default; enable `std` for the full error trait impl and
//! `serde` (de)serialization of [`config::FlashfsConfig`].
//!
//! # Example
//!
//! ```ignore
//! use flashfs_core::{Flashfs, FlashfsConfig};
//!
//! fn log_bytes<D: flashfs_core::device::FlashDevice>(device: D, data: &[u8]) {
//!     let mut fs = Flashfs::init(device, FlashfsConfig::default()).ok().unwrap();
//!     fs.write_bytes(data).unwrap();
//!     fs.flush_sync().unwrap();
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod buffer;
pub mod config;
pub mod device;
pub mod erase;
pub mod error;
pub mod fs;
pub mod geometry;
pub mod recovery;

pub use config::FlashfsConfig;
pub use error::{Error, Result};
pub use fs::Flashfs;
pub use geometry::Region;
