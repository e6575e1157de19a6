//! Region geometry derived from the flash device
//!
//! A [`Region`] is a contiguous, sector-aligned byte range on the flash
//! device. It never issues device I/O; it only does address arithmetic,
//! so every other component shares one definition of page/sector indices
//! and of the circular distance metric used throughout the core.

use crate::device::FlashDevice;
use crate::error::{Error, Result};

/// Geometry of the region this filesystem manages.
///
/// All addresses handed back to callers are absolute device addresses
/// (i.e. already offset by `region_start`); internally, most arithmetic
/// is done in region-relative terms so the circular distance metric
/// doesn't need to special-case `region_start != 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    page_size: u32,
    sector_size: u32,
    region_start: u32,
    region_end: u32,
    pages_per_sector: u32,
    num_pages: u32,
    num_sectors: u32,
}

impl Region {
    /// Build a region from explicit geometry, validating the constraints
    /// `4.B` requires: page size a power of two, sector size a whole
    /// multiple of page size, region size a whole multiple of sector size.
    pub fn new(
        page_size: u32,
        sector_size: u32,
        region_start: u32,
        region_end: u32,
    ) -> Result<Self> {
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(Error::InvalidGeometry);
        }
        if sector_size == 0 || sector_size % page_size != 0 {
            return Err(Error::InvalidGeometry);
        }
        if region_end <= region_start {
            return Err(Error::InvalidGeometry);
        }
        let region_size = region_end - region_start;
        if region_size % sector_size != 0 {
            return Err(Error::InvalidGeometry);
        }

        Ok(Self {
            page_size,
            sector_size,
            region_start,
            region_end,
            pages_per_sector: sector_size / page_size,
            num_pages: region_size / page_size,
            num_sectors: region_size / sector_size,
        })
    }

    /// Build a region from a [`FlashDevice`]'s reported geometry.
    pub fn from_device<D: FlashDevice + ?Sized>(device: &D) -> Result<Self> {
        Self::new(
            device.page_size(),
            device.sector_size(),
            device.region_start(),
            device.region_end(),
        )
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Sector (erase granularity) size in bytes.
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// First absolute address of the region.
    pub fn region_start(&self) -> u32 {
        self.region_start
    }

    /// One past the last absolute address of the region.
    pub fn region_end(&self) -> u32 {
        self.region_end
    }

    /// Total size of the region in bytes.
    pub fn size(&self) -> u32 {
        self.region_end - self.region_start
    }

    /// Number of pages in the region.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Number of sectors in the region.
    pub fn num_sectors(&self) -> u32 {
        self.num_sectors
    }

    /// Number of pages per sector.
    pub fn pages_per_sector(&self) -> u32 {
        self.pages_per_sector
    }

    /// Absolute start address of the `index`-th page.
    pub fn page_addr(&self, index: u32) -> u32 {
        self.region_start + index * self.page_size
    }

    /// Absolute start address of the `index`-th sector.
    pub fn sector_addr(&self, index: u32) -> u32 {
        self.region_start + index * self.sector_size
    }

    /// Page index containing `addr` (must be within the region).
    pub fn page_index(&self, addr: u32) -> u32 {
        (addr - self.region_start) / self.page_size
    }

    /// Sector index containing `addr` (must be within the region).
    pub fn sector_index(&self, addr: u32) -> u32 {
        (addr - self.region_start) / self.sector_size
    }

    /// True iff `addr` falls on a page boundary.
    pub fn is_page_aligned(&self, addr: u32) -> bool {
        (addr - self.region_start) % self.page_size == 0
    }

    /// True iff `addr` falls on a sector boundary.
    pub fn is_sector_aligned(&self, addr: u32) -> bool {
        (addr - self.region_start) % self.sector_size == 0
    }

    /// True iff `addr` lies in `[region_start, region_end)`.
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.region_start && addr < self.region_end
    }

    /// Circular distance from `from` to `to`, both absolute addresses,
    /// measured forward (wrapping at `region_end` back to `region_start`).
    pub fn circular_distance(&self, from: u32, to: u32) -> u32 {
        let size = self.size();
        let from_rel = from - self.region_start;
        let to_rel = to - self.region_start;
        if to_rel >= from_rel {
            to_rel - from_rel
        } else {
            size - from_rel + to_rel
        }
    }

    /// Advance `addr` by `delta` bytes, wrapping circularly within the region.
    pub fn advance(&self, addr: u32, delta: u32) -> u32 {
        let size = self.size();
        let rel = (addr - self.region_start + delta) % size;
        self.region_start + rel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Region {
        // pageSize = 2048, sectorSize = 8 * pageSize = 16 KiB, 8 sectors -> 128 KiB
        Region::new(2048, 16 * 1024, 0, 128 * 1024).unwrap()
    }

    #[test]
    fn rejects_non_power_of_two_page_size() {
        assert_eq!(
            Region::new(3000, 16 * 1024, 0, 128 * 1024).unwrap_err(),
            Error::InvalidGeometry
        );
    }

    #[test]
    fn rejects_sector_not_multiple_of_page() {
        assert_eq!(
            Region::new(2048, 3000, 0, 128 * 1024).unwrap_err(),
            Error::InvalidGeometry
        );
    }

    #[test]
    fn rejects_region_not_multiple_of_sector() {
        assert_eq!(
            Region::new(2048, 16 * 1024, 0, 128 * 1024 + 1).unwrap_err(),
            Error::InvalidGeometry
        );
    }

    #[test]
    fn counts_pages_and_sectors() {
        let r = region();
        assert_eq!(r.num_pages(), 64);
        assert_eq!(r.num_sectors(), 8);
        assert_eq!(r.pages_per_sector(), 8);
    }

    #[test]
    fn circular_distance_wraps() {
        let r = region();
        assert_eq!(r.circular_distance(0, 2048), 2048);
        assert_eq!(r.circular_distance(128 * 1024 - 2048, 0), 2048);
        assert_eq!(r.circular_distance(100, 100), 0);
    }

    #[test]
    fn advance_wraps_at_region_end() {
        let r = region();
        assert_eq!(r.advance(128 * 1024 - 2048, 2048), 0);
        assert_eq!(r.advance(0, 16 * 1024), 16 * 1024);
    }
}
