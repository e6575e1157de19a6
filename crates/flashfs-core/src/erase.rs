//! Background erase controller
//!
//! Drives sector erases ahead of `tail`, keeping at least
//! `config.arming_erase_free_space` bytes of contiguous free space
//! available. The same stepwise, non-blocking machinery backs both
//! operating modes from `4.E`: in background mode `tick()` erases
//! whenever free space drops below the threshold; in arming-time mode
//! `begin_arming_erase()` arms the same `tick()` loop to keep pumping
//! regardless of `config.background_erase` until the threshold is met,
//! and `is_arming_erase_done()` reports when that happens.

use crate::config::FlashfsConfig;
use crate::device::FlashDevice;
use crate::error::{Error, Result};
use crate::geometry::Region;

/// State of the background erase controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Nothing in flight.
    Idle,
    /// An erase of the sector at `head` has been submitted and is being
    /// polled for completion.
    Erasing,
    /// The device reported a failure. Writes are refused until `init` or
    /// `eraseAll`.
    Faulted,
}

/// Drives background/arming-time sector erases.
pub struct EraseController {
    state: ControllerState,
    /// Set by `begin_arming_erase`; makes `tick()` keep erasing toward
    /// the threshold even when `config.background_erase` is false.
    arming: bool,
}

impl EraseController {
    /// A freshly booted controller, idle and unfaulted.
    pub fn new() -> Self {
        Self {
            state: ControllerState::Idle,
            arming: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// True once the device has reported a failure.
    pub fn is_faulted(&self) -> bool {
        self.state == ControllerState::Faulted
    }

    /// `freeAhead = (head - tail) mod regionSize`.
    fn free_ahead(region: &Region, head: u32, tail: u32) -> u32 {
        region.circular_distance(tail, head)
    }

    /// Cooperative, non-blocking step. Poll any in-flight erase for
    /// completion; if idle and free space is below the threshold (either
    /// because we're in background mode, or because an arming pass is
    /// running), submit an erase of the sector at `head`.
    ///
    /// Never blocks. Call from a host main loop or timer ISR.
    pub fn tick<D: FlashDevice + ?Sized>(
        &mut self,
        device: &mut D,
        region: &Region,
        config: &FlashfsConfig,
        head: &mut u32,
        tail: u32,
    ) -> Result<()> {
        if self.state == ControllerState::Faulted {
            return Err(Error::DeviceFault);
        }

        if self.state == ControllerState::Erasing {
            if !device.is_ready() {
                return Ok(());
            }
            *head = region.advance(*head, region.sector_size());
            log::debug!("erase of sector at {head:#x} completed, head advanced");
            self.state = ControllerState::Idle;
        }

        let free_ahead = Self::free_ahead(region, *head, tail);
        let below_threshold = free_ahead < config.arming_erase_free_space;

        if self.arming && !below_threshold {
            log::debug!("arming erase pass done, head now {head:#x}");
            self.arming = false;
        }

        if (config.background_erase || self.arming) && below_threshold && device.is_ready() {
            match device.erase_sector(*head) {
                Ok(()) => {
                    log::trace!("erase of sector at {head:#x} submitted");
                    self.state = ControllerState::Erasing;
                }
                Err(e) => {
                    log::warn!("erase submission failed: {e}");
                    self.state = ControllerState::Faulted;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Start the arming-time mode's batched pre-arming pass: arms `tick()`
    /// to keep erasing toward the threshold even though
    /// `config.background_erase` is false. Non-blocking; poll
    /// [`is_arming_erase_done`](Self::is_arming_erase_done).
    pub fn begin_arming_erase(&mut self) {
        log::debug!("arming erase pass starting");
        self.arming = true;
    }

    /// True once a pass started by `begin_arming_erase` has driven free
    /// space back up to the threshold (or none is running).
    pub fn is_arming_erase_done(&self) -> bool {
        !self.arming
    }

    /// Blocking convenience over `begin_arming_erase` / `tick` for hosts
    /// that have no main loop of their own to drive `tick()` from.
    pub fn drive_arming_pass<D: FlashDevice + ?Sized>(
        &mut self,
        device: &mut D,
        region: &Region,
        config: &FlashfsConfig,
        head: &mut u32,
        tail: u32,
    ) -> Result<()> {
        self.begin_arming_erase();
        while !self.is_arming_erase_done() {
            self.tick(device, region, config, head, tail)?;
        }
        Ok(())
    }

    /// Foreground emergency path: the writer is about to overtake `head`.
    /// Drives one sector erase to completion regardless of mode,
    /// stalling the producer but preserving invariant 4.
    pub fn emergency_erase<D: FlashDevice + ?Sized>(
        &mut self,
        device: &mut D,
        region: &Region,
        head: &mut u32,
    ) -> Result<()> {
        log::warn!("foreground emergency erase at head={head:#x}");
        if let Err(e) = device.erase_sector(*head) {
            self.state = ControllerState::Faulted;
            return Err(e);
        }
        while !device.is_ready() {}
        *head = region.advance(*head, region.sector_size());
        self.state = ControllerState::Idle;
        Ok(())
    }

    /// Reset to a fresh, unfaulted idle state (used by `init`/`eraseAll`).
    pub fn reset(&mut self) {
        self.state = ControllerState::Idle;
        self.arming = false;
    }
}

impl Default for EraseController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashfs_sim::SimFlash;

    fn region() -> Region {
        Region::new(2048, 16 * 1024, 0, 128 * 1024).unwrap()
    }

    #[test]
    fn tick_submits_erase_below_threshold_and_advances_head_on_ready() {
        let region = region();
        let mut sim = SimFlash::new(2048, 16 * 1024, 8);
        let config = FlashfsConfig {
            arming_erase_free_space: 32 * 1024,
            background_erase: true,
        };
        let mut controller = EraseController::new();
        let mut head = 0u32;
        let tail = 128 * 1024 - 16 * 1024; // only one sector free ahead

        controller
            .tick(&mut sim, &region, &config, &mut head, tail)
            .unwrap();
        assert_eq!(controller.state(), ControllerState::Erasing);
        assert_eq!(head, 0);

        controller
            .tick(&mut sim, &region, &config, &mut head, tail)
            .unwrap();
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(head, 16 * 1024);
    }

    #[test]
    fn arming_time_mode_does_not_erase_from_plain_tick() {
        let region = region();
        let mut sim = SimFlash::new(2048, 16 * 1024, 8);
        let config = FlashfsConfig {
            arming_erase_free_space: 32 * 1024,
            background_erase: false,
        };
        let mut controller = EraseController::new();
        let mut head = 0u32;
        let tail = 128 * 1024 - 16 * 1024;

        controller
            .tick(&mut sim, &region, &config, &mut head, tail)
            .unwrap();
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(head, 0);
    }

    #[test]
    fn arming_pass_reclaims_until_threshold_met() {
        let region = region();
        let mut sim = SimFlash::new(2048, 16 * 1024, 8);
        let config = FlashfsConfig {
            arming_erase_free_space: 32 * 1024,
            background_erase: false,
        };
        let mut controller = EraseController::new();
        let mut head = 0u32;
        let tail = 128 * 1024 - 16 * 1024;

        controller
            .drive_arming_pass(&mut sim, &region, &config, &mut head, tail)
            .unwrap();
        assert_eq!(head, 32 * 1024);
        assert!(controller.is_arming_erase_done());
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[test]
    fn device_fault_latches_controller() {
        let region = region();
        let mut sim = SimFlash::new(2048, 16 * 1024, 8);
        sim.inject_fault();
        let config = FlashfsConfig {
            arming_erase_free_space: 32 * 1024,
            background_erase: true,
        };
        let mut controller = EraseController::new();
        let mut head = 0u32;
        let tail = 128 * 1024 - 16 * 1024;

        assert!(controller
            .tick(&mut sim, &region, &config, &mut head, tail)
            .is_err());
        assert!(controller.is_faulted());
    }
}
