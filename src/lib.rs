//! Flashbridge: USB mass-storage bridge over a RAM staging disk.
//!
//! Exposes a persistent, flash-resident filesystem to a host as a writable
//! mass-storage volume. The volume the host actually sees is a volatile
//! in-memory disk; the two directory trees are synchronized at write-quiescence
//! points (hydration flash to RAM at boot, commit plus tombstone sweep RAM to
//! flash when the host stops writing).

pub mod block;
pub mod config;
pub mod error;
pub mod hw;
pub mod logging;
pub mod quiesce;
pub mod scsi;
pub mod session;
pub mod sync;
pub mod vfs;
