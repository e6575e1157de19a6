//! flashfs-sim - In-memory flash emulator for testing
//!
//! Provides [`SimFlash`], a [`FlashDevice`] that emulates raw NOR flash in
//! memory: erase fills a sector with `0xFF`, and program ANDs new bytes
//! into old ones (so a page can only have its bits cleared, never set,
//! matching real flash and making double-programs and overlapping erases
//! show up as data corruption in tests rather than panics). It's useful
//! for exercising `flashfs-core` and for interactive demos without real
//! hardware.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use flashfs_core::device::FlashDevice;
use flashfs_core::error::{Error, Result};

/// In-memory flash emulator.
///
/// Geometry is fixed at construction; the whole region starts at address
/// 0 (the design assumes `region_start` is implicitly sector 0 of the
/// partition, per the spec this crate is modeled on).
#[cfg(feature = "alloc")]
pub struct SimFlash {
    page_size: u32,
    sector_size: u32,
    region_end: u32,
    data: Vec<u8>,
    /// Staging area for an in-progress page program.
    pending_addr: Option<u32>,
    pending: Vec<u8>,
    /// Address of an in-flight erase, if any.
    erasing: Option<u32>,
    /// Number of `is_ready` polls remaining before an in-flight operation
    /// reports done. Lets tests exercise tick()-driven polling instead of
    /// operations completing within the first poll.
    busy_ticks: u32,
    ticks_left: u32,
    fault: bool,
}

#[cfg(feature = "alloc")]
impl SimFlash {
    /// Create a new emulator with the given geometry.
    pub fn new(page_size: u32, sector_size: u32, num_sectors: u32) -> Self {
        let region_end = sector_size * num_sectors;
        Self {
            page_size,
            sector_size,
            region_end,
            data: vec![0xFFu8; region_end as usize],
            pending_addr: None,
            pending: Vec::new(),
            erasing: None,
            busy_ticks: 0,
            ticks_left: 0,
            fault: false,
        }
    }

    /// Make every program/erase take `ticks` extra `is_ready` polls
    /// before completing, to exercise tick()-driven polling.
    pub fn with_busy_ticks(mut self, ticks: u32) -> Self {
        self.busy_ticks = ticks;
        self
    }

    /// Fill `len` bytes starting at `addr` with `byte`, bypassing the
    /// program/erase protocol. Used to seed a region for pointer-recovery
    /// tests.
    pub fn fill(&mut self, addr: u32, byte: u8, len: u32) {
        let start = addr as usize;
        let end = start + len as usize;
        self.data[start..end].fill(byte);
    }

    /// Raw contents, for test assertions.
    pub fn memory(&self) -> &[u8] {
        &self.data
    }

    /// Force the next operation to report [`Error::DeviceFault`] and make
    /// [`FlashDevice::is_ready`] report the device stuck, as if the
    /// driver below had failed.
    pub fn inject_fault(&mut self) {
        self.fault = true;
    }
}

#[cfg(feature = "alloc")]
impl FlashDevice for SimFlash {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn region_start(&self) -> u32 {
        0
    }

    fn region_end(&self) -> u32 {
        self.region_end
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) {
        let start = addr as usize;
        let end = start + buf.len();
        buf.copy_from_slice(&self.data[start..end]);
    }

    fn program_begin(&mut self, addr: u32) -> Result<()> {
        if self.fault {
            return Err(Error::DeviceFault);
        }
        if addr % self.page_size != 0 {
            return Err(Error::InvalidAlignment);
        }
        self.pending_addr = Some(addr);
        self.pending.clear();
        Ok(())
    }

    fn program_continue(&mut self, bytes: &[u8]) -> Result<()> {
        if self.fault {
            return Err(Error::DeviceFault);
        }
        if self.pending.len() + bytes.len() > self.page_size as usize {
            return Err(Error::InvalidAlignment);
        }
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    fn program_finish(&mut self) -> Result<()> {
        if self.fault {
            return Err(Error::DeviceFault);
        }
        let addr = self.pending_addr.take().ok_or(Error::InvalidAlignment)?;
        let start = addr as usize;
        for (i, &byte) in self.pending.iter().enumerate() {
            self.data[start + i] &= byte;
        }
        self.pending.clear();
        self.ticks_left = self.busy_ticks;
        Ok(())
    }

    fn erase_sector(&mut self, addr: u32) -> Result<()> {
        if self.fault {
            return Err(Error::DeviceFault);
        }
        if addr % self.sector_size != 0 {
            return Err(Error::InvalidAlignment);
        }
        self.erasing = Some(addr);
        self.ticks_left = self.busy_ticks;
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        if self.fault {
            return false;
        }
        if self.ticks_left > 0 {
            self.ticks_left -= 1;
            return false;
        }
        if let Some(addr) = self.erasing.take() {
            let start = addr as usize;
            let end = start + self.sector_size as usize;
            self.data[start..end].fill(0xFF);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_is_bitwise_and() {
        let mut flash = SimFlash::new(256, 4096, 4);
        flash.program_begin(0).unwrap();
        flash.program_continue(&[0x0F; 256]).unwrap();
        flash.program_finish().unwrap();
        while !flash.is_ready() {}

        flash.program_begin(0).unwrap();
        flash.program_continue(&[0xF0; 256]).unwrap();
        flash.program_finish().unwrap();
        while !flash.is_ready() {}

        assert!(flash.memory()[..256].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn erase_resets_to_0xff() {
        let mut flash = SimFlash::new(256, 4096, 4);
        flash.program_begin(0).unwrap();
        flash.program_continue(&[0x00; 256]).unwrap();
        flash.program_finish().unwrap();
        while !flash.is_ready() {}

        flash.erase_sector(0).unwrap();
        while !flash.is_ready() {}

        assert!(flash.memory()[..4096].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn busy_ticks_delay_readiness() {
        let mut flash = SimFlash::new(256, 4096, 4).with_busy_ticks(3);
        flash.erase_sector(0).unwrap();
        assert!(!flash.is_ready());
        assert!(!flash.is_ready());
        assert!(!flash.is_ready());
        assert!(flash.is_ready());
    }
}
