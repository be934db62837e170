//! Session controller.
//!
//! Owns the staging and persistent volumes, the mass-storage endpoint, the
//! quiescence detector and the synchronizer, and drives the whole lifecycle:
//! boot-time hydration (flash to RAM), then a cooperative poll loop that reacts
//! to write-quiescence edges by remounting the staging volume and committing
//! its tree back to flash, followed by a tombstone sweep.
//!
//! Single logical thread of control: the transport service call is the only
//! suspension point, so the host protocol handler and the synchronizer are
//! never live at the same instant and the staging store stays single-writer by
//! construction.

use crate::block::BlockDevice;
use crate::config::BridgeConfig;
use crate::error::SessionError;
use crate::hw::{delay_source, Delay, FlashReadiness};
use crate::quiesce::{QuiesceDetector, QuiesceEvent, WriteActivity};
use crate::scsi::{MassStorage, Transport};
use crate::sync::{SyncOptions, SyncStats, Synchronizer};
use crate::vfs::Volume;
use tracing::{info, warn};

/// Poll interval of the hosted run loop.
const POLL_INTERVAL_MS: u64 = 10;

/// Result of one commit pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub replicated: SyncStats,
    pub swept: SyncStats,
}

/// Top-level controller owning every shared handle explicitly.
pub struct SessionController<P, S, D>
where
    P: Volume,
    S: Volume,
    D: BlockDevice,
{
    persistent: P,
    staging: S,
    msc: MassStorage<D>,
    activity: WriteActivity,
    detector: QuiesceDetector,
    synchronizer: Synchronizer,
    delay: Box<dyn Delay>,
    reconnect_delay_ms: u64,
    /// A settled burst whose commit could not start yet (remount failed).
    commit_pending: bool,
}

impl<P, S, D> SessionController<P, S, D>
where
    P: Volume,
    S: Volume,
    D: BlockDevice,
{
    pub fn new(config: &BridgeConfig, persistent: P, staging: S, msc: MassStorage<D>) -> Self {
        let activity = msc.activity();
        Self {
            persistent,
            staging,
            activity,
            msc,
            detector: QuiesceDetector::new(config.detector.settle_samples),
            synchronizer: Synchronizer::new(SyncOptions {
                reserved_dir: config.sync.reserved_dir.clone(),
                max_rel_path: config.sync.max_rel_path,
            }),
            delay: delay_source(config.usb.timer_available),
            reconnect_delay_ms: config.usb.reconnect_delay_ms,
            commit_pending: false,
        }
    }

    /// Boot sequence: hardware readiness, mounts, format, hydration, announce.
    ///
    /// Any failure here is fatal; the device cannot offer a usable volume.
    pub fn boot<T: Transport<D>>(
        &mut self,
        readiness: &mut dyn FlashReadiness,
        transport: &mut T,
    ) -> Result<SyncStats, SessionError> {
        readiness.ensure_readable();

        self.persistent.mount()?;
        info!(volume = self.persistent.label(), "persistent store mounted");

        self.staging.format()?;
        self.staging.mount()?;
        info!(volume = self.staging.label(), "staging store formatted and mounted");

        let stats = self
            .synchronizer
            .replicate(&self.persistent, &mut self.staging);
        info!(files = stats.files_copied, "hydration complete");

        // Stay disconnected long enough for the host to finish enumerating.
        self.delay.delay_ms(self.reconnect_delay_ms);
        transport.announce(&mut self.msc);
        info!("storage-class availability announced");

        Ok(stats)
    }

    /// One cooperative loop iteration: service the transport, sample the
    /// detector, and run the commit pipeline when a burst has settled.
    pub fn service<T: Transport<D>>(&mut self, transport: &mut T) -> Option<CommitReport> {
        transport.service(&mut self.msc);

        if self.detector.sample(&self.activity) == Some(QuiesceEvent::WritesSettled) {
            self.commit_pending = true;
        }

        if self.commit_pending {
            if let Some(report) = self.try_commit() {
                self.commit_pending = false;
                return Some(report);
            }
        }
        None
    }

    /// Run forever, the hosted equivalent of the firmware main loop.
    pub fn run<T: Transport<D>>(&mut self, transport: &mut T) -> ! {
        loop {
            self.service(transport);
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }
    }

    /// Remount staging, then commit and sweep.
    ///
    /// The remount forces the staging filesystem driver to re-read its own
    /// superstructure: the host may have rewritten it directly through block
    /// I/O, bypassing any cached state. Remount failure is not fatal; the
    /// pending commit is retried on a later poll.
    fn try_commit(&mut self) -> Option<CommitReport> {
        if self.staging.is_mounted() {
            if let Err(e) = self.staging.unmount() {
                warn!(error = %e, "unmount failed, commit aborted");
                return None;
            }
        }
        if let Err(e) = self.staging.mount() {
            warn!(error = %e, "remount failed, will retry on next poll");
            return None;
        }
        // A completed mount cycle clears any logical eject.
        self.msc.reload();

        info!("commit started");
        let replicated = self
            .synchronizer
            .replicate(&self.staging, &mut self.persistent);
        let swept = self
            .synchronizer
            .sweep(&self.staging, &mut self.persistent);
        info!(
            copied = replicated.files_copied,
            removed = swept.entries_removed,
            "commit finished"
        );
        Some(CommitReport { replicated, swept })
    }

    pub fn persistent(&self) -> &P {
        &self.persistent
    }

    pub fn staging(&self) -> &S {
        &self.staging
    }

    pub fn staging_mut(&mut self) -> &mut S {
        &mut self.staging
    }

    pub fn mass_storage(&self) -> &MassStorage<D> {
        &self.msc
    }

    pub fn mass_storage_mut(&mut self) -> &mut MassStorage<D> {
        &mut self.msc
    }

    pub fn commit_pending(&self) -> bool {
        self.commit_pending
    }
}
