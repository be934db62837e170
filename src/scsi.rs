//! Storage-class protocol endpoint.
//!
//! Answers the four request classes a mass-storage host issues: identification,
//! capacity inquiry, block reads, and block writes, plus unit-readiness and a
//! load/eject control. Device-level failures on the data path are logged on the
//! diagnostic channel and never surfaced as protocol errors, so the host always
//! sees a responsive volume; sense data is reserved for readiness and
//! unsupported commands.
//!
//! The USB transport state machine itself is an external collaborator, reduced
//! here to the [`Transport`] seam and the attach/suspend lifecycle callbacks.

use crate::block::{BlockDevice, Capacity};
use crate::quiesce::WriteActivity;
use std::collections::VecDeque;
use tracing::{debug, error, info};

/// Fixed identification strings, space-padded to the wire widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InquiryData {
    pub vendor_id: [u8; 8],
    pub product_id: [u8; 16],
    pub product_rev: [u8; 4],
}

impl InquiryData {
    pub fn new(vendor: &str, product: &str, revision: &str) -> Self {
        Self {
            vendor_id: pad(vendor),
            product_id: pad(product),
            product_rev: pad(revision),
        }
    }
}

fn pad<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (dst, src) in out.iter_mut().zip(s.bytes()) {
        *dst = src;
    }
    out
}

/// SCSI sense triple reported for failed readiness and illegal requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseData {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseData {
    /// NOT READY, medium not present.
    pub const MEDIUM_NOT_PRESENT: SenseData = SenseData {
        key: 0x02,
        asc: 0x3A,
        ascq: 0x00,
    };

    /// ILLEGAL REQUEST, invalid command operation code.
    pub const INVALID_COMMAND: SenseData = SenseData {
        key: 0x05,
        asc: 0x20,
        ascq: 0x00,
    };
}

/// One host request, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Inquiry,
    TestUnitReady,
    ReadCapacity,
    Read { lba: u32, blocks: u32 },
    Write { lba: u32, data: Vec<u8> },
    StartStop { start: bool, load_eject: bool },
    Passthrough([u8; 16]),
}

/// Reply to one host request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostReply {
    Inquiry(InquiryData),
    Capacity(Capacity),
    Ready,
    NotReady(SenseData),
    Data(Vec<u8>),
    Done,
    Unsupported(SenseData),
}

/// The mass-storage logical unit: owns the staging block device and the
/// write-activity counter sampled by the quiescence detector.
pub struct MassStorage<D: BlockDevice> {
    device: D,
    inquiry: InquiryData,
    activity: WriteActivity,
    ejected: bool,
    host_attached: bool,
}

impl<D: BlockDevice> MassStorage<D> {
    pub fn new(device: D, inquiry: InquiryData) -> Self {
        Self {
            device,
            inquiry,
            activity: WriteActivity::new(),
            ejected: false,
            host_attached: false,
        }
    }

    /// Counter handle for the quiescence detector.
    pub fn activity(&self) -> WriteActivity {
        self.activity.clone()
    }

    /// Direct access for the session controller's staging driver.
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Transport attach callback.
    pub fn on_attach(&mut self) {
        self.host_attached = true;
        info!("host attached");
    }

    /// Transport suspend callback.
    pub fn on_suspend(&mut self) {
        self.host_attached = false;
        info!("host suspended");
    }

    pub fn host_attached(&self) -> bool {
        self.host_attached
    }

    /// Clear a logical eject for the next mount cycle.
    pub fn reload(&mut self) {
        self.ejected = false;
    }

    pub fn is_writable(&self) -> bool {
        true
    }

    pub fn inquiry(&self) -> InquiryData {
        self.inquiry
    }

    pub fn capacity(&self) -> Capacity {
        self.device.capacity()
    }

    /// Readiness query; fails once the host has logically ejected the medium.
    pub fn test_unit_ready(&self) -> Result<(), SenseData> {
        if self.ejected {
            Err(SenseData::MEDIUM_NOT_PRESENT)
        } else {
            Ok(())
        }
    }

    /// Serve a block read from the staging store.
    ///
    /// In-range reads always succeed; a device error is logged and the span
    /// zero-filled rather than failing the transfer.
    pub fn read10(&self, lba: u32, buf: &mut [u8]) -> usize {
        let block_size = self.device.capacity().block_size as usize;
        let offset = lba as usize * block_size;
        if let Err(e) = self.device.read(offset, buf) {
            error!(lba, error = %e, "read failed");
            buf.fill(0);
        }
        buf.len()
    }

    /// Serve a block write: erase-then-program of the addressed span.
    ///
    /// Failures are logged, not reported to the host; the write still counts
    /// as activity so the quiescence detector sees the burst.
    pub fn write10(&mut self, lba: u32, data: &[u8]) -> usize {
        let block_size = self.device.capacity().block_size as usize;
        let offset = lba as usize * block_size;
        if let Err(e) = self.device.erase(offset, data.len()) {
            error!(lba, error = %e, "erase failed");
        }
        if let Err(e) = self.device.program(offset, data) {
            error!(lba, error = %e, "program failed");
        }
        self.activity.record_write();
        data.len()
    }

    /// Load/eject control; eject marks the medium logically absent.
    pub fn start_stop(&mut self, start: bool, load_eject: bool) {
        if load_eject && !start {
            info!("host ejected medium");
            self.ejected = true;
        }
    }

    /// Pass-through maintenance command: reported as unsupported, never a
    /// crash.
    pub fn passthrough(&mut self, cmd: &[u8; 16]) -> SenseData {
        debug!(opcode = cmd[0], "unsupported SCSI command");
        SenseData::INVALID_COMMAND
    }

    /// Dispatch one host request.
    pub fn handle(&mut self, command: HostCommand) -> HostReply {
        match command {
            HostCommand::Inquiry => HostReply::Inquiry(self.inquiry()),
            HostCommand::ReadCapacity => HostReply::Capacity(self.capacity()),
            HostCommand::TestUnitReady => match self.test_unit_ready() {
                Ok(()) => HostReply::Ready,
                Err(sense) => HostReply::NotReady(sense),
            },
            HostCommand::Read { lba, blocks } => {
                let block_size = self.device.capacity().block_size as usize;
                let mut buf = vec![0u8; blocks as usize * block_size];
                self.read10(lba, &mut buf);
                HostReply::Data(buf)
            }
            HostCommand::Write { lba, data } => {
                self.write10(lba, &data);
                HostReply::Done
            }
            HostCommand::StartStop { start, load_eject } => {
                self.start_stop(start, load_eject);
                HostReply::Done
            }
            HostCommand::Passthrough(cmd) => HostReply::Unsupported(self.passthrough(&cmd)),
        }
    }
}

/// Transport seam: delivers host commands to the logical unit.
///
/// `service` is the single suspension point of the session loop; it returns
/// control between commands so housekeeping can run.
pub trait Transport<D: BlockDevice> {
    /// Announce storage-class availability to the host.
    fn announce(&mut self, msc: &mut MassStorage<D>);

    /// Deliver at most one pending host command.
    fn service(&mut self, msc: &mut MassStorage<D>);
}

/// Scripted transport for hosted runs and tests: replays a queued command
/// script, one command per service call, and records the replies.
#[derive(Default)]
pub struct ScriptedTransport {
    script: VecDeque<HostCommand>,
    replies: Vec<HostReply>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: HostCommand) {
        self.script.push_back(command);
    }

    pub fn replies(&self) -> &[HostReply] {
        &self.replies
    }

    pub fn is_drained(&self) -> bool {
        self.script.is_empty()
    }
}

impl<D: BlockDevice> Transport<D> for ScriptedTransport {
    fn announce(&mut self, msc: &mut MassStorage<D>) {
        msc.on_attach();
    }

    fn service(&mut self, msc: &mut MassStorage<D>) {
        if let Some(command) = self.script.pop_front() {
            let reply = msc.handle(command);
            self.replies.push(reply);
        }
    }
}
