//! File-backed [`FlashDevice`] for the demo binary
//!
//! Stands in for a real NOR flash chip by mapping the region onto a plain
//! file: `read` seeks and reads, `program_*` ANDs new bytes into old ones
//! (so double-programming a page without an intervening erase corrupts
//! data instead of erroring, matching real flash), and `erase_sector`
//! fills with `0xFF`. Unlike [`flashfs_sim::SimFlash`] this device
//! persists across process invocations, which is what lets the demo CLI
//! show pointer recovery surviving a simulated reboot.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use flashfs_core::device::FlashDevice;
use flashfs_core::error::{Error, Result};

/// A flash region backed by a regular file on disk.
pub struct FileBackedFlash {
    file: File,
    page_size: u32,
    sector_size: u32,
    region_end: u32,
    pending_addr: Option<u32>,
    pending: Vec<u8>,
    erasing: Option<u32>,
}

impl FileBackedFlash {
    /// Open an existing image file, trusting its length as `region_end`.
    pub fn open(path: &Path, page_size: u32, sector_size: u32) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let region_end = file.metadata()?.len() as u32;
        Ok(Self {
            file,
            page_size,
            sector_size,
            region_end,
            pending_addr: None,
            pending: Vec::new(),
            erasing: None,
        })
    }

    /// Create a fresh image file of `num_sectors * sector_size` bytes, all
    /// `0xFF` (an erased device). Overwrites any existing file at `path`.
    pub fn format(
        path: &Path,
        page_size: u32,
        sector_size: u32,
        num_sectors: u32,
    ) -> std::io::Result<Self> {
        let region_end = sector_size * num_sectors;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&vec![0xFFu8; region_end as usize])?;
        file.flush()?;
        Ok(Self {
            file,
            page_size,
            sector_size,
            region_end,
            pending_addr: None,
            pending: Vec::new(),
            erasing: None,
        })
    }
}

impl FlashDevice for FileBackedFlash {
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
        self.file.seek(SeekFrom::Start(addr as u64)).expect("seek");
        self.file.read_exact(buf).expect("read");
    }

    fn program_begin(&mut self, addr: u32) -> Result<()> {
        if addr % self.page_size != 0 {
            return Err(Error::InvalidAlignment);
        }
        self.pending_addr = Some(addr);
        self.pending.clear();
        Ok(())
    }

    fn program_continue(&mut self, bytes: &[u8]) -> Result<()> {
        if self.pending.len() + bytes.len() > self.page_size as usize {
            return Err(Error::InvalidAlignment);
        }
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    fn program_finish(&mut self) -> Result<()> {
        let addr = self.pending_addr.take().ok_or(Error::InvalidAlignment)?;
        let mut existing = vec![0u8; self.pending.len()];
        self.file.seek(SeekFrom::Start(addr as u64)).map_err(|_| Error::DeviceFault)?;
        self.file.read_exact(&mut existing).map_err(|_| Error::DeviceFault)?;
        for (dst, &src) in existing.iter_mut().zip(self.pending.iter()) {
            *dst &= src;
        }
        self.file.seek(SeekFrom::Start(addr as u64)).map_err(|_| Error::DeviceFault)?;
        self.file.write_all(&existing).map_err(|_| Error::DeviceFault)?;
        self.pending.clear();
        Ok(())
    }

    fn erase_sector(&mut self, addr: u32) -> Result<()> {
        if addr % self.sector_size != 0 {
            return Err(Error::InvalidAlignment);
        }
        self.erasing = Some(addr);
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        if let Some(addr) = self.erasing.take() {
            let fill = vec![0xFFu8; self.sector_size as usize];
            let _ = self.file.seek(SeekFrom::Start(addr as u64));
            let _ = self.file.write_all(&fill);
        }
        true
    }
}
