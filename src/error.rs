//! Error types for the flashbridge staging and synchronization pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Block-device contract violations.
///
/// These indicate a protocol-layer bug (the host or a filesystem driver issuing
/// misaligned or out-of-range requests) and are surfaced loudly rather than
/// silently recovered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("span {offset}+{len} exceeds device capacity {capacity}")]
    OutOfRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("span {offset}+{len} is not aligned to erase block size {block_size}")]
    Misaligned {
        offset: usize,
        len: usize,
        block_size: usize,
    },
}

/// Mounted-filesystem errors.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("volume {0} is not mounted")]
    NotMounted(String),

    #[error("volume {0} is already mounted")]
    AlreadyMounted(String),

    #[error("format of volume {label} failed: {source}")]
    Format {
        label: String,
        source: std::io::Error,
    },

    #[error("mount of volume {label} failed: {source}")]
    Mount {
        label: String,
        source: std::io::Error,
    },

    #[error("unmount of volume {0} failed")]
    Unmount(String),

    #[error("no such entry: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FsError {
    /// Wrap an `io::Error` with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FsError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Per-entry synchronization failures.
///
/// These are logged and skipped by the tree walks; they never abort sibling
/// processing.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("relative path exceeds {limit} bytes: {path}")]
    PathTooLong { path: PathBuf, limit: usize },

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Fatal session-level failures.
///
/// Only boot-time initialization can fail this way; the runtime loop degrades
/// and retries instead of returning errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("boot failed: {0}")]
    Boot(String),

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
