//! Configuration system.
//!
//! Layered configuration in the usual order: built-in defaults, then an
//! optional TOML file, then `FLASHBRIDGE_*` environment overrides. Validation
//! runs after the layers merge so a bad geometry fails before boot rather than
//! mid-session.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::sync::{DEFAULT_RESERVED_DIR, MAX_REL_PATH};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Staging disk geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Total staging disk size in bytes.
    #[serde(default = "default_capacity")]
    pub capacity_bytes: usize,

    /// Erase block size; also the logical block size reported to the host.
    #[serde(default = "default_erase_block")]
    pub erase_block_size: usize,
}

/// Mount-point labels for the two fixed volumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    #[serde(default = "default_persistent_mount")]
    pub persistent: String,

    #[serde(default = "default_staging_mount")]
    pub staging: String,
}

/// Quiescence detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Consecutive quiet poll samples required before the commit edge fires.
    #[serde(default = "default_settle_samples")]
    pub settle_samples: u32,
}

/// USB identity and enumeration timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbConfig {
    #[serde(default = "default_vendor")]
    pub vendor: String,

    #[serde(default = "default_product")]
    pub product: String,

    #[serde(default = "default_revision")]
    pub revision: String,

    /// How long the device stays disconnected before announcing, so host
    /// enumeration completes cleanly. Environment-dependent.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Whether a hardware timer is available for the reconnect delay; when
    /// false a calibrated busy loop is used instead.
    #[serde(default = "default_true")]
    pub timer_available: bool,
}

/// Synchronizer exclusions and bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Host-artifact directory excluded from both sync directions.
    #[serde(default = "default_reserved_dir")]
    pub reserved_dir: String,

    /// Maximum relative path length inside a tree.
    #[serde(default = "default_max_rel_path")]
    pub max_rel_path: usize,
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub staging: StagingConfig,

    #[serde(default)]
    pub mounts: MountConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub usb: UsbConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_capacity() -> usize {
    64 * 1024
}

fn default_erase_block() -> usize {
    512
}

fn default_persistent_mount() -> String {
    "/flash".to_string()
}

fn default_staging_mount() -> String {
    "/ram".to_string()
}

fn default_settle_samples() -> u32 {
    3
}

fn default_vendor() -> String {
    "TinyUSB".to_string()
}

fn default_product() -> String {
    "Mass Storage".to_string()
}

fn default_revision() -> String {
    "1.0".to_string()
}

fn default_reconnect_delay() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

fn default_reserved_dir() -> String {
    DEFAULT_RESERVED_DIR.to_string()
}

fn default_max_rel_path() -> usize {
    MAX_REL_PATH
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity(),
            erase_block_size: default_erase_block(),
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            persistent: default_persistent_mount(),
            staging: default_staging_mount(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            settle_samples: default_settle_samples(),
        }
    }
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor: default_vendor(),
            product: default_product(),
            revision: default_revision(),
            reconnect_delay_ms: default_reconnect_delay(),
            timer_available: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reserved_dir: default_reserved_dir(),
            max_rel_path: default_max_rel_path(),
        }
    }
}

impl BridgeConfig {
    /// Load defaults, then an optional TOML file, then `FLASHBRIDGE_*`
    /// environment overrides (e.g. `FLASHBRIDGE_DETECTOR__SETTLE_SAMPLES=5`).
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("FLASHBRIDGE").separator("__"));

        let config: BridgeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject geometries and tunings the rest of the system assumes away.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.staging.erase_block_size == 0 {
            return Err(ConfigError::Invalid(
                "staging.erase_block_size must be nonzero".to_string(),
            ));
        }
        if self.staging.capacity_bytes == 0
            || self.staging.capacity_bytes % self.staging.erase_block_size != 0
        {
            return Err(ConfigError::Invalid(format!(
                "staging.capacity_bytes ({}) must be a nonzero multiple of erase_block_size ({})",
                self.staging.capacity_bytes, self.staging.erase_block_size
            )));
        }
        if self.detector.settle_samples == 0 {
            return Err(ConfigError::Invalid(
                "detector.settle_samples must be at least 1".to_string(),
            ));
        }
        if self.sync.max_rel_path == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_rel_path must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
