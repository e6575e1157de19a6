//! Consumed configuration
//!
//! Two tunables, persisted by the host's configuration store (out of
//! scope for this crate — see the `flashfs` demo binary for a TOML-backed
//! example adapter). The core treats this as an opaque, `Copy` value
//! supplied at construction and swappable at runtime; it performs no I/O
//! of its own to load or store it.

/// Tunables for the background erase controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashfsConfig {
    /// Minimum free space, in bytes, the controller must maintain ahead
    /// of `tail`.
    pub arming_erase_free_space: u32,
    /// `true` for background mode (erase opportunistically from `tick`),
    /// `false` for arming-time mode (a single batched pass before writes
    /// are allowed to start).
    pub background_erase: bool,
}

impl Default for FlashfsConfig {
    fn default() -> Self {
        Self {
            arming_erase_free_space: 2 * 1024 * 1024,
            background_erase: true,
        }
    }
}
