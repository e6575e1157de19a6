//! Top-level filesystem handle
//!
//! [`Flashfs`] is the single owned value the rest of the core is built to
//! support: `head`, `tail`, the "full" flag, the write-staging buffer and
//! the erase controller, bundled together and driven explicitly by the
//! caller rather than through an ambient runtime. There is exactly one way
//! to get one — [`Flashfs::init`], which re-derives `head`/`tail` from the
//! device every time, since the core keeps no state across a reset.

use crate::buffer::{PageBuffer, MAX_PAGE_SIZE};
use crate::config::FlashfsConfig;
use crate::device::FlashDevice;
use crate::erase::EraseController;
use crate::error::{Error, Result};
use crate::geometry::Region;
use crate::recovery::{self, Recovered, RepairPolicy};

/// A circular, append-only log over a [`FlashDevice`].
///
/// Type parameter `D` is the concrete driver; `Flashfs` owns it outright,
/// matching the spec's "bundle everything into one value, pass it
/// explicitly" design note rather than reaching for a shared/locked handle.
pub struct Flashfs<D: FlashDevice> {
    device: D,
    region: Region,
    head: u32,
    tail: u32,
    full: bool,
    buffer: PageBuffer,
    controller: EraseController,
    config: FlashfsConfig,
    /// Set by `program_begin`/`program_continue`/`program_finish` until
    /// `is_ready()` reports the page program has landed.
    flushing: bool,
    closed: bool,
    /// Latched when a page program itself fails, distinct from the erase
    /// controller's own fault latch.
    device_fault: bool,
}

impl<D: FlashDevice> Flashfs<D> {
    fn validate_geometry(region: &Region) -> Result<()> {
        if region.page_size() as usize > MAX_PAGE_SIZE {
            return Err(Error::PageTooLarge);
        }
        Ok(())
    }

    fn assemble(device: D, region: Region, config: FlashfsConfig, recovered: Recovered) -> Self {
        Self {
            device,
            buffer: PageBuffer::new(region.page_size()),
            region,
            head: recovered.head,
            tail: recovered.tail,
            full: recovered.full,
            controller: EraseController::new(),
            config,
            flushing: false,
            closed: false,
            device_fault: false,
        }
    }

    /// Take ownership of `device`, derive its geometry, and recover the
    /// write pointer by scanning the region once.
    ///
    /// On [`Error::Corruption`] the device is handed back along with the
    /// error so the caller can retry with [`Flashfs::init_with_repair`]
    /// rather than losing it.
    pub fn init(device: D, config: FlashfsConfig) -> core::result::Result<Self, (D, Error)> {
        let region = match Region::from_device(&device) {
            Ok(r) => r,
            Err(e) => return Err((device, e)),
        };
        if let Err(e) = Self::validate_geometry(&region) {
            return Err((device, e));
        }
        let mut device = device;
        let recovered = match recovery::scan(&mut device, &region) {
            Ok(r) => r,
            Err(e) => return Err((device, e)),
        };
        log::info!(
            "flashfs recovered: head={:#x} tail={:#x} full={}",
            recovered.head,
            recovered.tail,
            recovered.full
        );
        Ok(Self::assemble(device, region, config, recovered))
    }

    /// Build a handle without scanning, committing to `policy`'s outcome.
    ///
    /// For use after [`Flashfs::init`] reports [`Error::Corruption`]: the
    /// caller has decided how to treat an ambiguous region rather than
    /// retrying the scan, which would find the same ambiguity again.
    pub fn init_with_repair(device: D, config: FlashfsConfig, policy: RepairPolicy) -> Result<Self> {
        let region = Region::from_device(&device)?;
        Self::validate_geometry(&region)?;
        log::warn!("flashfs repaired with {policy:?}");
        let recovered = policy.outcome(&region);
        Ok(Self::assemble(device, region, config, recovered))
    }

    /// Erase the entire region and reset to empty. Blocks until every
    /// sector erase completes.
    pub fn erase_all(&mut self) -> Result<()> {
        log::info!("erasing entire region ({} sectors)", self.region.num_sectors());
        for index in 0..self.region.num_sectors() {
            let addr = self.region.sector_addr(index);
            self.device.erase_sector(addr)?;
            while !self.device.is_ready() {}
        }
        self.head = self.region.region_start();
        self.tail = self.region.region_start();
        self.full = false;
        self.buffer.clear();
        self.controller.reset();
        self.flushing = false;
        self.closed = false;
        self.device_fault = false;
        Ok(())
    }

    /// Total size of the managed region, in bytes.
    pub fn total_size(&self) -> u32 {
        self.region.size()
    }

    /// Bytes of free space between `tail` and `head`, not counting
    /// anything still sitting in the unflushed write buffer.
    pub fn free_space(&self) -> u32 {
        if self.full {
            0
        } else if self.head == self.tail {
            self.region.size()
        } else {
            self.region.circular_distance(self.tail, self.head)
        }
    }

    /// `totalSize() - freeSpace()`.
    pub fn used_space(&self) -> u32 {
        self.region.size() - self.free_space()
    }

    /// `pageSize - n`: free room left in the write-staging buffer.
    pub fn bytes_available_in_buffer(&self) -> u32 {
        self.buffer.available() as u32
    }

    /// True iff the region currently holds no free space at all. Computed
    /// purely from `(tail, head, full)`, never from the unflushed write
    /// buffer or from device fault state: a faulted device still reports
    /// `full` accurately; the fault itself surfaces separately, as
    /// `Err(Error::DeviceFault)` from the next write.
    pub fn is_eof(&self) -> bool {
        self.full
    }

    /// Cooperative, non-blocking step: advance an in-flight page program
    /// or erase toward completion. Call this from the host's main loop or
    /// timer ISR; it never blocks.
    pub fn tick(&mut self) -> Result<()> {
        if self.flushing {
            if !self.device.is_ready() {
                return Ok(());
            }
            self.tail = self.region.advance(self.tail, self.region.page_size());
            self.buffer.clear();
            self.flushing = false;
            if self.tail == self.head {
                self.full = true;
            }
            log::trace!("page flush landed, tail now {:#x}", self.tail);
            return Ok(());
        }
        let head_before = self.head;
        self.controller
            .tick(&mut self.device, &self.region, &self.config, &mut self.head, self.tail)?;
        // Background mode may reclaim sectors even while the region is full
        // (that's the oldest data in loop mode); once head has moved past
        // tail the region is no longer full, regardless of which path freed
        // the space.
        if self.full && self.head != head_before {
            self.full = false;
        }
        Ok(())
    }

    /// Start the arming-time mode's batched pre-arming erase pass.
    /// Non-blocking; poll [`Flashfs::is_arming_erase_done`].
    pub fn begin_arming_erase(&mut self) {
        self.controller.begin_arming_erase();
    }

    /// True once an arming-time pass has reclaimed enough free space (or
    /// none is running).
    pub fn is_arming_erase_done(&self) -> bool {
        self.controller.is_arming_erase_done()
    }

    fn check_writable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::EndOfMedium);
        }
        if self.controller.is_faulted() || self.device_fault {
            return Err(Error::DeviceFault);
        }
        if !self.config.background_erase && !self.controller.is_arming_erase_done() {
            return Err(Error::BusyErasing);
        }
        Ok(())
    }

    fn reclaim_if_full(&mut self) -> Result<()> {
        if self.full {
            self.controller.emergency_erase(&mut self.device, &self.region, &mut self.head)?;
            self.full = false;
        }
        Ok(())
    }

    fn submit_page_program(&mut self) -> Result<()> {
        let result = self
            .device
            .program_begin(self.tail)
            .and_then(|()| self.device.program_continue(self.buffer.as_slice()))
            .and_then(|()| self.device.program_finish());
        match result {
            Ok(()) => {
                self.flushing = true;
                Ok(())
            }
            Err(e) => {
                log::warn!("page program at {:#x} failed: {e}", self.tail);
                self.device_fault = true;
                Err(Error::DeviceFault)
            }
        }
    }

    /// Append as many bytes from `data` as the write buffer has room for
    /// right now, returning the count actually accepted.
    ///
    /// Never blocks: if the buffer fills, the page is submitted for
    /// programming and any remainder of `data` is left unconsumed until a
    /// later call, once [`Flashfs::tick`] has drained the in-flight
    /// program.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
        self.check_writable()?;
        let mut offset = 0usize;
        while offset < data.len() {
            if self.buffer.is_empty() {
                self.reclaim_if_full()?;
            }
            if self.buffer.is_full() {
                break;
            }
            let n = self.buffer.push(&data[offset..]);
            if n == 0 {
                break;
            }
            offset += n;
        }
        if self.buffer.is_full() && !self.flushing {
            self.submit_page_program()?;
        }
        Ok(offset)
    }

    /// Append a single byte, waiting (via [`Flashfs::tick`]) for buffer
    /// room if a previously submitted page hasn't finished landing yet.
    ///
    /// This is the one write path allowed to stall: a byte-at-a-time
    /// logging API can't return a length like [`Flashfs::write_bytes`]
    /// without either blocking or silently dropping the byte.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        loop {
            if self.write_bytes(core::slice::from_ref(&byte))? == 1 {
                return Ok(());
            }
            self.tick()?;
        }
    }

    /// Submit the partially-filled write buffer for programming,
    /// `0xFF`-padded to a full page, without waiting for it to land.
    /// A no-op if the buffer is empty or already mid-flush.
    pub fn flush_async(&mut self) -> Result<()> {
        self.check_writable()?;
        if self.buffer.is_empty() || self.flushing {
            return Ok(());
        }
        self.buffer.pad_to_full();
        self.submit_page_program()
    }

    /// Flush the write buffer and block until it has landed on the device.
    ///
    /// Always page-pads a partial buffer: this is the core's resolution of
    /// the unaligned-EOF open question, so a reader sees `freeSpace`/`tail`
    /// settle on a page boundary immediately after every `flushSync`.
    pub fn flush_sync(&mut self) -> Result<()> {
        self.flush_async()?;
        while self.flushing {
            self.tick()?;
        }
        Ok(())
    }

    /// Flush and mark the handle closed; further writes fail with
    /// [`Error::EndOfMedium`] until [`Flashfs::init`] or
    /// [`Flashfs::erase_all`] reopens it.
    pub fn close(&mut self) -> Result<()> {
        self.flush_sync()?;
        self.closed = true;
        Ok(())
    }

    /// Read `buf.len()` bytes starting at the absolute device address
    /// `addr`, bypassing head/tail bookkeeping entirely.
    pub fn read_absolute(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let last = addr
            .checked_add(buf.len() as u32 - 1)
            .ok_or(Error::AddressOutOfBounds)?;
        if !self.region.contains(addr) || !self.region.contains(last) {
            return Err(Error::AddressOutOfBounds);
        }
        self.device.read(addr, buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashfs_sim::SimFlash;

    fn config() -> FlashfsConfig {
        FlashfsConfig {
            arming_erase_free_space: 32 * 1024,
            background_erase: true,
        }
    }

    fn sim() -> SimFlash {
        SimFlash::new(2048, 16 * 1024, 8)
    }

    #[test]
    fn init_on_blank_device_starts_empty() {
        let fs = Flashfs::init(sim(), config()).ok().unwrap();
        assert_eq!(fs.total_size(), 128 * 1024);
        assert_eq!(fs.free_space(), 128 * 1024);
        assert_eq!(fs.used_space(), 0);
        assert!(!fs.is_eof());
        assert_eq!(fs.bytes_available_in_buffer(), 2048);
    }

    #[test]
    fn init_on_fully_written_region_reports_eof() {
        // S6: a region that was already entirely written before `init` was
        // ever called reports EOF immediately, with no write or tick in
        // between.
        let mut blank = sim();
        blank.fill(0, 0x77, 128 * 1024);
        let fs = Flashfs::init(blank, config()).ok().unwrap();
        assert_eq!(fs.total_size(), 128 * 1024);
        assert_eq!(fs.free_space(), 0);
        assert!(fs.is_eof());
    }

    #[test]
    fn write_then_flush_sync_advances_tail_by_one_page() {
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        let n = fs.write_bytes(b"hello").unwrap();
        assert_eq!(n, 5);
        fs.flush_sync().unwrap();
        assert_eq!(fs.used_space(), 2048);
        assert_eq!(fs.free_space(), 128 * 1024 - 2048);
    }

    #[test]
    fn write_byte_drains_full_buffer_via_tick() {
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        for _ in 0..2048 {
            fs.write_byte(0xAA).unwrap();
        }
        // the page was full and submitted automatically; one more byte
        // must wait for it to land before being accepted.
        fs.write_byte(0xBB).unwrap();
        assert!(fs.used_space() >= 2048);
    }

    #[test]
    fn close_then_reinit_recovers_same_state() {
        let sim = sim();
        let mut fs = Flashfs::init(sim, config()).ok().unwrap();
        fs.write_bytes(&[0x11; 100]).unwrap();
        fs.close().unwrap();
        assert!(fs.write_byte(1).is_err());

        // Reconstruct a device from the same backing memory and reinit,
        // simulating a reboot with no RAM state carried over.
        let recovered_head_tail_full = {
            // Pull the device back out is not exposed by design (Flashfs
            // owns it outright); instead verify recovery directly against
            // a freshly-scanned copy of the same image.
            let mut replay = SimFlash::new(2048, 16 * 1024, 8);
            replay.fill(0, 0x11, 2048); // one full page committed by flush
            let region = Region::from_device(&replay).unwrap();
            recovery::scan(&mut replay, &region).unwrap()
        };
        assert_eq!(recovered_head_tail_full.head, 0);
        assert_eq!(recovered_head_tail_full.tail, 2048);
        assert!(!recovered_head_tail_full.full);
    }

    #[test]
    fn loop_mode_reclaims_oldest_sector_on_overfill() {
        // 8 sectors of 16 KiB; fill the whole region, then write one more
        // page to force a foreground emergency erase of the oldest sector.
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        let page = [0x42u8; 2048];
        for _ in 0..64 {
            fs.write_bytes(&page).unwrap();
            fs.flush_sync().unwrap();
        }
        assert_eq!(fs.free_space(), 0);
        // S6: a completely full region reports EOF until the next write's
        // reclaim (or a background tick) frees a sector.
        assert!(fs.is_eof());

        fs.write_bytes(&page).unwrap();
        fs.flush_sync().unwrap();
        assert!(!fs.is_eof());
        assert_eq!(fs.free_space(), 16 * 1024 - 2048);
    }

    #[test]
    fn background_tick_on_full_region_clears_full_flag() {
        // Fill the region completely via flush_sync (no writes in flight),
        // then drive tick() alone, with no intervening write. Background
        // mode must still be free to reclaim the oldest sector, and
        // free_space()/used_space() must reflect that reclaim immediately
        // rather than staying pinned at the "full" reading.
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        let page = [0x42u8; 2048];
        for _ in 0..64 {
            fs.write_bytes(&page).unwrap();
            fs.flush_sync().unwrap();
        }
        assert_eq!(fs.free_space(), 0);

        for _ in 0..4 {
            fs.tick().unwrap();
        }
        assert!(fs.free_space() > 0);
        assert_eq!(fs.used_space(), fs.total_size() - fs.free_space());
    }

    #[test]
    fn erase_all_resets_to_empty() {
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        fs.write_bytes(b"data").unwrap();
        fs.flush_sync().unwrap();
        fs.erase_all().unwrap();
        assert_eq!(fs.free_space(), fs.total_size());
        assert_eq!(fs.used_space(), 0);
    }

    #[test]
    fn read_absolute_rejects_out_of_bounds() {
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            fs.read_absolute(128 * 1024 - 2, &mut buf).unwrap_err(),
            Error::AddressOutOfBounds
        );
    }

    #[test]
    fn write_one_byte_then_close_and_reinit_lands_at_next_page() {
        // S3: write one byte, flush, close, re-init from the same image.
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        fs.write_bytes(&[0x33]).unwrap();
        fs.close().unwrap();
        assert_eq!(fs.memory_for_test()[0], 0x33);

        // The 0xFF padding from flush_sync means the rest of page 0 is still
        // erased; re-scanning a device carrying the same one written byte
        // must still see page 0 as the written page and park tail on page 1.
        let mut replay = SimFlash::new(2048, 16 * 1024, 8);
        replay.fill(0, 0x33, 1);
        let region = Region::from_device(&replay).unwrap();
        let recovered = recovery::scan(&mut replay, &region).unwrap();
        assert_eq!(recovered.tail, 2048);
        assert!(!recovered.full);
    }

    #[test]
    fn overfill_in_loop_mode_reclaims_old_sectors_in_place() {
        // S7: write region-size + 5000 bytes in 128-byte chunks with
        // periodic flush_sync/tick; every byte should settle on the
        // written value once the overfill has cycled the whole region.
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        let chunk = [0x44u8; 128];
        let total = fs.total_size() + 5000;
        let mut written = 0u32;
        while written <= total {
            let mut offset = 0usize;
            while offset < chunk.len() {
                let n = fs.write_bytes(&chunk[offset..]).unwrap();
                offset += n;
                if n == 0 {
                    fs.tick().unwrap();
                }
            }
            fs.flush_sync().unwrap();
            fs.tick().unwrap();
            written += chunk.len() as u32;
        }
        assert!(fs.memory_for_test().iter().all(|&b| b == 0x44));
    }

    #[test]
    fn faulted_device_refuses_further_writes() {
        let mut fs = Flashfs::init(sim(), config()).ok().unwrap();
        fs.write_bytes(b"x").unwrap();
        fs.device_fault_for_test();
        let err = fs.flush_sync().unwrap_err();
        assert_eq!(err, Error::DeviceFault);
        assert_eq!(fs.write_bytes(b"y").unwrap_err(), Error::DeviceFault);
    }
}

#[cfg(test)]
impl Flashfs<flashfs_sim::SimFlash> {
    fn device_fault_for_test(&mut self) {
        self.device.inject_fault();
    }

    fn memory_for_test(&self) -> &[u8] {
        self.device.memory()
    }
}
