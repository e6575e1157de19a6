//! Error types for flashfs-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The region is full and no more space can be reclaimed: either loop
    /// mode is disabled, or loop mode is enabled but the erase controller
    /// has latched [`Error::DeviceFault`].
    EndOfMedium,
    /// A write was refused because an arming-time erase pass is in progress.
    BusyErasing,
    /// The flash device reported a failure. Latches until `init` or
    /// `eraseAll`; every write after this fails with `DeviceFault`.
    DeviceFault,
    /// Pointer recovery found more than one written/free boundary while
    /// scanning the region.
    Corruption,
    /// Geometry reported by the flash device cannot back a region:
    /// region size not a multiple of sector size, sector size not a
    /// multiple of page size, or page size not a power of two.
    InvalidGeometry,
    /// Address or length is not aligned to the granularity the operation
    /// requires (page for programs, sector for erases).
    InvalidAlignment,
    /// Address (or address + length) falls outside `[regionStart, regionEnd)`.
    AddressOutOfBounds,
    /// The device's page size exceeds the compiled-in buffer capacity.
    PageTooLarge,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfMedium => write!(f, "region is full, no space could be reclaimed"),
            Self::BusyErasing => write!(f, "arming-time erase pass in progress"),
            Self::DeviceFault => write!(f, "flash device reported a fault"),
            Self::Corruption => write!(f, "more than one written/free boundary in region"),
            Self::InvalidGeometry => write!(f, "flash device geometry is invalid for a region"),
            Self::InvalidAlignment => write!(f, "address or length is not properly aligned"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::PageTooLarge => {
                write!(f, "device page size exceeds compiled-in buffer capacity")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
