//! Write-quiescence detection.
//!
//! Host write commands arrive in bursts: a single file copy issues many block
//! writes with short gaps between commands. Committing after every block write
//! would be wasteful and unsafe (the file may be half-written), so the session
//! commits only on the falling edge of a burst. The detector samples a shared
//! activity counter once per poll tick and fires exactly once per burst, after
//! the counter has held still for a configurable number of consecutive samples.
//!
//! The debounce is expressed in poll ticks rather than wall-clock time: a
//! working hardware timer is not guaranteed at the point the detector runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared write-activity counter.
///
/// The storage endpoint ticks it on every host write command; the detector
/// only ever reads it.
#[derive(Debug, Clone, Default)]
pub struct WriteActivity {
    writes: Arc<AtomicU64>,
}

impl WriteActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one host write command.
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Total writes observed so far.
    pub fn count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

/// Event emitted on the falling edge of a write burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiesceEvent {
    WritesSettled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
}

/// Edge-triggered burst detector.
///
/// Two states: `Idle` and `Active`. A sample showing new activity moves to
/// `Active` and resets the quiet run; `settle_samples` consecutive quiet
/// samples while `Active` emit [`QuiesceEvent::WritesSettled`] once and return
/// to `Idle`. Steady idle and rising edges never emit.
#[derive(Debug)]
pub struct QuiesceDetector {
    phase: Phase,
    last_seen: u64,
    quiet_run: u32,
    settle_samples: u32,
}

impl QuiesceDetector {
    /// `settle_samples` is the number of consecutive quiet polls required
    /// before the edge fires; at least 1. Larger values absorb the command
    /// gaps some hosts leave inside a single logical write.
    pub fn new(settle_samples: u32) -> Self {
        Self {
            phase: Phase::Idle,
            last_seen: 0,
            quiet_run: 0,
            settle_samples: settle_samples.max(1),
        }
    }

    /// Take one poll sample of the activity counter.
    pub fn sample(&mut self, activity: &WriteActivity) -> Option<QuiesceEvent> {
        let seen = activity.count();
        let busy = seen != self.last_seen;
        self.last_seen = seen;

        if busy {
            if self.phase == Phase::Idle {
                debug!(writes = seen, "host write burst started");
            }
            self.phase = Phase::Active;
            self.quiet_run = 0;
            return None;
        }

        if self.phase == Phase::Active {
            self.quiet_run += 1;
            if self.quiet_run >= self.settle_samples {
                self.phase = Phase::Idle;
                self.quiet_run = 0;
                debug!(writes = seen, "host write burst settled");
                return Some(QuiesceEvent::WritesSettled);
            }
        }
        None
    }
}
