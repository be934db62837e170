//! Hardware readiness and delay capabilities.
//!
//! Boot must ensure the persistent flash is readable while code executes from
//! RAM; that one-shot bring-up is behind [`FlashReadiness`]. Delays come in two
//! flavors behind the same [`Delay`] interface: the normal timer-backed delay,
//! and a calibrated busy loop for the brief post-boot window where no scheduler
//! timer is available yet. The busy-wait hack is isolated to [`SpinDelay`].

use std::time::{Duration, Instant};
use tracing::debug;

/// One-shot hardware bring-up for the persistent medium.
pub trait FlashReadiness {
    /// Ensure the flash controller is readable. Invoked exactly once at boot;
    /// repeat calls are no-ops.
    fn ensure_readable(&mut self);
}

/// Hosted builds have nothing to bring up.
#[derive(Debug, Default)]
pub struct NoopReadiness {
    done: bool,
}

impl FlashReadiness for NoopReadiness {
    fn ensure_readable(&mut self) {
        if !self.done {
            self.done = true;
            debug!("flash readiness: nothing to do on hosted build");
        }
    }
}

/// Blocking delay primitive.
pub trait Delay {
    fn delay_ms(&self, ms: u64);
}

/// Timer-backed delay for when the scheduler clock is available.
#[derive(Debug, Default)]
pub struct TimerDelay;

impl Delay for TimerDelay {
    fn delay_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Calibrated busy loop for the window where no timer runs yet.
#[derive(Debug)]
pub struct SpinDelay;

impl Delay for SpinDelay {
    fn delay_ms(&self, ms: u64) {
        let deadline = Instant::now() + Duration::from_millis(ms);
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

/// Pick the delay implementation for the current environment.
pub fn delay_source(timer_available: bool) -> Box<dyn Delay> {
    if timer_available {
        Box::new(TimerDelay)
    } else {
        Box::new(SpinDelay)
    }
}
