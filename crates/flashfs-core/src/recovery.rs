//! Write-pointer recovery
//!
//! On cold start the core has no RAM state at all; [`scan`] reconstructs
//! `head`, `tail` and the "full" flag by reading the region once and
//! classifying every page as free (all `0xFF`) or written (anything else).

use crate::device::FlashDevice;
use crate::error::{Error, Result};
use crate::geometry::Region;

/// Outcome of a successful scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recovered {
    /// First byte of the oldest live data.
    pub head: u32,
    /// First byte of free space.
    pub tail: u32,
    /// True iff the region is entirely written (no free space at all).
    pub full: bool,
}

/// Caller's choice of how to treat a corrupted region (more than one
/// written/free boundary found while scanning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPolicy {
    /// Treat the region as entirely written, preserving whatever data is
    /// there; the next background erase starts reclaiming from sector 0.
    TreatAsFull,
    /// Treat the region as entirely empty, discarding whatever data is there.
    TreatAsEmpty,
}

impl RepairPolicy {
    /// Outcome a repair policy commits to, independent of what was scanned.
    pub fn outcome(self, region: &Region) -> Recovered {
        match self {
            RepairPolicy::TreatAsFull => Recovered {
                head: region.region_start(),
                tail: region.region_end() - region.page_size(),
                full: true,
            },
            RepairPolicy::TreatAsEmpty => Recovered {
                head: region.region_start(),
                tail: region.region_start(),
                full: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Free,
    Written,
}

/// Read page `index` in small chunks and classify it, short-circuiting on
/// the first non-`0xFF` byte. Avoids needing a page-sized scratch buffer.
fn classify_page<D: FlashDevice + ?Sized>(device: &mut D, region: &Region, index: u32) -> PageState {
    const CHUNK: usize = 64;
    let mut buf = [0u8; CHUNK];
    let page_addr = region.page_addr(index);
    let mut remaining = region.page_size();
    let mut addr = page_addr;
    while remaining > 0 {
        let n = core::cmp::min(remaining, CHUNK as u32) as usize;
        device.read(addr, &mut buf[..n]);
        if buf[..n].iter().any(|&b| b != 0xFF) {
            return PageState::Written;
        }
        addr += n as u32;
        remaining -= n as u32;
    }
    PageState::Free
}

/// Scan the region once, locating the unique written/free boundary.
///
/// Scans linearly from page 0 rather than treating the page sequence as
/// circular: page 0's own classification tells us whether we started
/// inside the live (written) range or inside free space, which is enough
/// to disambiguate a flat live range (`head == region_start`) from a
/// wrapped one without a second pass.
pub fn scan<D: FlashDevice + ?Sized>(device: &mut D, region: &Region) -> Result<Recovered> {
    let num_pages = region.num_pages();
    debug_assert!(num_pages > 0);

    let first_state = classify_page(device, region, 0);

    // (index, Free->Written) for an F->W transition, (index, false) for W->F.
    let mut transitions: heapless::Vec<(u32, bool), 4> = heapless::Vec::new();
    let mut prev = first_state;
    for index in 1..num_pages {
        let cur = classify_page(device, region, index);
        match (prev, cur) {
            (PageState::Free, PageState::Written) => {
                if transitions.push((index, true)).is_err() {
                    return Err(Error::Corruption);
                }
            }
            (PageState::Written, PageState::Free) => {
                if transitions.push((index, false)).is_err() {
                    return Err(Error::Corruption);
                }
            }
            _ => {}
        }
        prev = cur;
    }

    match (first_state, transitions.as_slice()) {
        (PageState::Free, []) => Ok(Recovered {
            head: region.region_start(),
            tail: region.region_start(),
            full: false,
        }),
        (PageState::Written, []) => Ok(Recovered {
            head: region.region_start(),
            tail: region.region_end() - region.page_size(),
            full: true,
        }),
        (PageState::Written, &[(wf, false), (fw, true)]) => Ok(Recovered {
            tail: region.page_addr(wf),
            head: region.page_addr(fw),
            full: false,
        }),
        (PageState::Free, &[(fw, true), (wf, false)]) => Ok(Recovered {
            head: region.page_addr(fw),
            tail: region.page_addr(wf),
            full: false,
        }),
        (PageState::Written, &[(wf, false)]) => Ok(Recovered {
            head: region.region_start(),
            tail: region.page_addr(wf),
            full: false,
        }),
        _ => Err(Error::Corruption),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashfs_sim::SimFlash;

    fn region_and_sim() -> (Region, SimFlash) {
        let sim = SimFlash::new(2048, 16 * 1024, 8);
        let region = Region::from_device(&sim).unwrap();
        (region, sim)
    }

    #[test]
    fn empty_region_recovers_to_region_start() {
        let (region, mut sim) = region_and_sim();
        let r = scan(&mut sim, &region).unwrap();
        assert_eq!(r.head, 0);
        assert_eq!(r.tail, 0);
        assert!(!r.full);
    }

    #[test]
    fn fully_written_region_reserves_sentinel_page() {
        let (region, mut sim) = region_and_sim();
        sim.fill(0, 0x42, region.size());
        let r = scan(&mut sim, &region).unwrap();
        assert_eq!(r.head, 0);
        assert_eq!(r.tail, region.region_end() - region.page_size());
        assert!(r.full);
    }

    #[test]
    fn flat_live_range_starts_at_region_start() {
        let (region, mut sim) = region_and_sim();
        // S2: identify start of free space
        sim.fill(0, 0x55, 16 * 1024 - 60);
        let r = scan(&mut sim, &region).unwrap();
        assert_eq!(r.head, 0);
        assert_eq!(r.tail, 16 * 1024);
        assert!(!r.full);
    }

    #[test]
    fn flat_live_range_not_starting_at_zero() {
        let (region, mut sim) = region_and_sim();
        // S4: sectors 1 and 2 plus 5 bytes into sector 3
        sim.fill(16 * 1024, 0x11, 2 * 16 * 1024 + 5);
        let r = scan(&mut sim, &region).unwrap();
        assert_eq!(r.head, 16 * 1024);
        // Written range is [16384, 49157): the last written page is page 24
        // (bytes 49152..49157), so the first free page is 25, at 51200 —
        // i.e. 3 sectors in, not 2 (the spec's own S4 writeup has this typo).
        assert_eq!(r.tail, 3 * 16 * 1024 + 2048);
        assert!(!r.full);
    }

    #[test]
    fn wrapped_live_range() {
        let (region, mut sim) = region_and_sim();
        // S5: sector 7 entirely, plus 5 bytes at address 0
        sim.fill(7 * 16 * 1024, 0x22, 16 * 1024);
        sim.fill(0, 0x22, 5);
        let r = scan(&mut sim, &region).unwrap();
        assert_eq!(r.head, 7 * 16 * 1024);
        assert_eq!(r.tail, 2048);
        assert!(!r.full);
    }

    #[test]
    fn more_than_two_boundaries_is_corruption() {
        let (region, mut sim) = region_and_sim();
        sim.fill(0, 0x33, 2048);
        sim.fill(4096, 0x33, 2048);
        sim.fill(8192, 0x33, 2048);
        assert_eq!(scan(&mut sim, &region).unwrap_err(), Error::Corruption);
    }
}
