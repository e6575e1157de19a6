//! TOML-backed configuration adapter
//!
//! The core treats [`FlashfsConfig`] as an opaque value it neither loads
//! nor saves; this module is the host-side adapter the demo binary uses
//! to round-trip the two tunables through a TOML file, in the same
//! shape the donor crate's own layout files use.
//!
//! ```toml
//! arming_erase_free_space = 32768
//! background_erase = true
//! ```

use std::fs;
use std::path::Path;

use flashfs_core::FlashfsConfig;

/// Errors loading or saving a [`FlashfsConfig`] TOML file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The file's contents were not valid config TOML.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The config could not be serialized back to TOML.
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Load a [`FlashfsConfig`] from `path`, falling back to
/// [`FlashfsConfig::default`] if the file does not exist.
pub fn load(path: &Path) -> Result<FlashfsConfig, ConfigError> {
    if !path.exists() {
        log::info!("no config at {path:?}, using defaults");
        return Ok(FlashfsConfig::default());
    }
    let text = fs::read_to_string(path)?;
    let config: FlashfsConfig = toml::from_str(&text)?;
    Ok(config)
}

/// Save `config` to `path` as TOML.
pub fn save(path: &Path, config: &FlashfsConfig) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config)?;
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load(Path::new("/nonexistent/flashfs.toml")).unwrap();
        assert_eq!(config, FlashfsConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = std::env::temp_dir().join("flashfs-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("flashfs.toml");
        let config = FlashfsConfig {
            arming_erase_free_space: 64 * 1024,
            background_erase: false,
        };
        save(&path, &config).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
