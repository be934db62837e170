//! Logging system.
//!
//! Structured logging via the `tracing` crate. This is the diagnostic channel
//! the error-handling design depends on: every non-fatal fault (skipped sync
//! entries, failed remounts, device errors on the data path) is reported here
//! so the host never sees a protocol-level anomaly.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Optional log file; stdout when absent.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format, stdout only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            file: None,
            color: default_true(),
        }
    }
}

/// Initialize the logging system.
///
/// The `FLASHBRIDGE_LOG` environment variable overrides the configured level
/// filter when set.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ConfigError> {
    let filter = build_env_filter(config);
    let base = Registry::default().with(filter);

    let json = config.map(|c| c.format == "json").unwrap_or(false);
    let use_color = config.map(|c| c.color).unwrap_or(true);
    let file = config.and_then(|c| c.file.clone());

    let file_writer = match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::Invalid(format!("failed to create log directory: {}", e))
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| {
                    ConfigError::Invalid(format!("failed to open log file {:?}: {}", path, e))
                })?;
            Some(file)
        }
        None => None,
    };

    match (json, file_writer) {
        (true, Some(writer)) => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .init(),
        (true, None) => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stdout),
            )
            .init(),
        (false, Some(writer)) => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init(),
        (false, None) => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(std::io::stdout),
            )
            .init(),
    }

    Ok(())
}

fn build_env_filter(config: Option<&LoggingConfig>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env("FLASHBRIDGE_LOG") {
        return filter;
    }
    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    EnvFilter::new(level)
}
