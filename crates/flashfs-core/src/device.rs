//! Flash device abstraction (consumed interface)
//!
//! This is the interface the core consumes rather than implements: a
//! low-level driver binds it to the board's sector/page geometry and to
//! whatever DMA or bit-banged protocol actually moves bytes. The core
//! never assumes a program or erase completes within a bounded time; it
//! only submits the operation and polls [`FlashDevice::is_ready`].

use crate::error::Result;

/// Opaque handle over raw flash, as consumed by [`crate::Flashfs`].
///
/// Implementations are expected to be thin: geometry constants plus a
/// three-phase page program (`program_begin` / `program_continue` /
/// `program_finish`) and a sector erase, both of which *submit* work and
/// return promptly, with completion observed separately through
/// [`is_ready`](FlashDevice::is_ready). This mirrors real NOR flash
/// controllers, where the DMA engine or SPI state machine runs after the
/// submitting call returns.
pub trait FlashDevice {
    /// Program granularity, in bytes. Must be a power of two.
    fn page_size(&self) -> u32;

    /// Erase granularity, in bytes. Must be a whole multiple of `page_size`.
    fn sector_size(&self) -> u32;

    /// First absolute address of the region this device exposes.
    fn region_start(&self) -> u32;

    /// One past the last absolute address of the region this device exposes.
    fn region_end(&self) -> u32;

    /// Read `buf.len()` bytes starting at `addr`.
    ///
    /// Synchronous; never fails for addresses within
    /// `[region_start, region_end)`.
    fn read(&mut self, addr: u32, buf: &mut [u8]);

    /// Begin programming the page at `addr`.
    ///
    /// `addr` must be page-aligned. Programming a page that is not
    /// currently free (all `0xFF`) is undefined behavior at the device
    /// level; the core never does this (invariant 3).
    fn program_begin(&mut self, addr: u32) -> Result<()>;

    /// Feed up to `page_size()` bytes into the page program started by
    /// [`program_begin`](FlashDevice::program_begin). May be called more
    /// than once; the sum of all `bytes` across calls must not exceed
    /// `page_size()`.
    fn program_continue(&mut self, bytes: &[u8]) -> Result<()>;

    /// Commit the page program. Returns once the operation has been
    /// submitted to the device, not once it has completed — poll
    /// [`is_ready`](FlashDevice::is_ready) to observe completion.
    fn program_finish(&mut self) -> Result<()>;

    /// Submit an erase of the sector starting at `addr`.
    ///
    /// `addr` must be sector-aligned. Returns once the erase has been
    /// submitted, not once it has completed.
    fn erase_sector(&mut self, addr: u32) -> Result<()>;

    /// Poll whether the most recently submitted program or erase has
    /// completed. The core calls this from [`crate::Flashfs::tick`] and
    /// from the blocking `flush_sync` / `close` / foreground-emergency
    /// paths; it never assumes completion within a bounded number of
    /// polls.
    fn is_ready(&mut self) -> bool;
}
