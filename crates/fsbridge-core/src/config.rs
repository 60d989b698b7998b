//! Configuration management for fsbridge.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.

use crate::error::{FsError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One gibibyte, the default reported capacity
const GIB: u64 = 1024 * 1024 * 1024;

/// Main configuration structure for fsbridge.
///
/// ## Example Configuration File (fsbridge.toml)
///
/// ```toml
/// [general]
/// log_level = "info"
///
/// [volume]
/// label = "fsbridge"
/// filesystem_name = "Dokan"
/// serial = 0x19831116
///
/// [capacity]
/// mode = "static"
/// total_bytes = 1073741824
/// available_bytes = 1073741824
///
/// [mount]
/// write_protect = false
/// timeout_ms = 0
///
/// [driver]
/// alt_stream = true
/// removable = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Volume identity reported to Windows
    pub volume: VolumeConfig,

    /// Capacity numbers or their source
    pub capacity: CapacityConfig,

    /// Per-mount native options
    pub mount: MountConfig,

    /// Process-wide driver flags
    pub driver: DriverFlags,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            log_level: "info".to_string(),
        }
    }
}

/// Volume identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Volume label shown in Explorer
    pub label: String,

    /// Filesystem name reported by GetVolumeInformation
    pub filesystem_name: String,

    /// Volume serial number
    pub serial: u32,

    /// Longest path component the volume accepts
    pub max_component_length: u32,

    /// FILE_* filesystem flags reported to callers
    pub filesystem_flags: u32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            label: "fsbridge".to_string(),
            filesystem_name: "Dokan".to_string(),
            serial: 0x1983_1116,
            max_component_length: 256,
            filesystem_flags: 0,
        }
    }
}

/// Where capacity numbers come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityMode {
    /// Report the configured totals
    #[default]
    Static,

    /// Ask the backend on every query
    Backend,
}

/// Capacity configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub mode: CapacityMode,

    /// Total bytes reported in static mode
    pub total_bytes: u64,

    /// Available bytes reported in static mode
    pub available_bytes: u64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        CapacityConfig {
            mode: CapacityMode::Static,
            total_bytes: GIB,
            available_bytes: GIB,
        }
    }
}

/// Native per-mount options
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Refuse every mutating request
    pub write_protect: bool,

    /// Per-request timeout in milliseconds (0 = driver default)
    pub timeout_ms: u32,

    /// Allocation unit size in bytes (0 = driver default)
    pub allocation_unit_size: u32,

    /// Sector size in bytes (0 = driver default)
    pub sector_size: u32,

    /// Give up waiting for the mount handshake after this many seconds
    pub mount_timeout_secs: Option<u64>,

    /// Ask the driver to serve requests on a single thread
    pub single_thread: bool,
}

/// Process-wide driver flags.
///
/// These are shared by every mount in the process; the registry applies
/// them to each native option block it builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverFlags {
    /// Enable alternate data stream paths (`file:stream`)
    pub alt_stream: bool,

    /// Native debug output
    pub debug: bool,

    /// Send native debug output to stderr
    pub stderr: bool,

    /// Present the volume as a network drive
    pub network: bool,

    /// Present the volume as removable media
    pub removable: bool,

    /// Register the volume with the mount manager
    pub mount_manager: bool,

    /// Make the volume visible to the current session only
    pub current_session: bool,

    /// Let the driver handle byte-range locks in user mode
    pub filelock_user_mode: bool,
}

impl Default for DriverFlags {
    fn default() -> Self {
        DriverFlags {
            alt_stream: true,
            debug: false,
            stderr: false,
            network: false,
            removable: false,
            mount_manager: false,
            current_session: false,
            filelock_user_mode: false,
        }
    }
}

/// The mount-time option block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MountOptions {
    pub volume: VolumeConfig,
    pub capacity: CapacityConfig,
    pub mount: MountConfig,
}

impl MountOptions {
    /// Set the volume label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.volume.label = label.into();
        self
    }

    /// Set the write-protect flag
    pub fn with_write_protect(mut self, write_protect: bool) -> Self {
        self.mount.write_protect = write_protect;
        self
    }

    /// Report capacity from the backend instead of static numbers
    pub fn with_capacity_mode(mut self, mode: CapacityMode) -> Self {
        self.capacity.mode = mode;
        self
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "fsbridge").ok_or_else(|| FsError::Config {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("fsbridge.toml"))
    }

    /// The mount-time option block described by this configuration.
    pub fn mount_options(&self) -> MountOptions {
        MountOptions {
            volume: self.volume.clone(),
            capacity: self.capacity.clone(),
            mount: self.mount.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.volume.filesystem_name, "Dokan");
        assert_eq!(config.volume.max_component_length, 256);
        assert_eq!(config.capacity.total_bytes, GIB);
        assert_eq!(config.capacity.mode, CapacityMode::Static);
        assert!(config.driver.alt_stream);
        assert!(!config.mount.write_protect);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("test.toml");

        let mut config = Config::default();
        config.volume.label = "scratch".to_string();
        config.capacity.mode = CapacityMode::Backend;
        config.mount.mount_timeout_secs = Some(5);
        config.driver.removable = true;

        config.save_to(&config_path).unwrap();
        let loaded = Config::load_from(&config_path).unwrap();

        assert_eq!(loaded.volume.label, "scratch");
        assert_eq!(loaded.capacity.mode, CapacityMode::Backend);
        assert_eq!(loaded.mount.mount_timeout_secs, Some(5));
        assert!(loaded.driver.removable);
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [mount]
            write_protect = true

            [capacity]
            mode = "backend"
            "#,
        )
        .unwrap();

        assert!(config.mount.write_protect);
        assert_eq!(config.capacity.mode, CapacityMode::Backend);
        assert_eq!(config.capacity.available_bytes, GIB);
        assert_eq!(config.volume.filesystem_name, "Dokan");
        assert!(config.driver.alt_stream);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        fs::write(&config_path, "[mount\nwrite_protect = ").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(matches!(err, FsError::Config { .. }));
    }

    #[test]
    fn test_mount_options_builders() {
        let options = Config::default()
            .mount_options()
            .with_label("data")
            .with_write_protect(true);

        assert_eq!(options.volume.label, "data");
        assert!(options.mount.write_protect);
    }
}
