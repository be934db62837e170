//! Erase-block-addressable staging store.
//!
//! The staging disk presented to the host over the storage-class protocol is a
//! plain heap buffer, but it honors the same read/erase/program contract as real
//! NOR flash so the rest of the system cannot tell the two apart. Erase and
//! program operate at erase-block granularity; reads are byte-addressed within
//! the device bounds.

use crate::error::BlockError;

/// Fill pattern an erased span reads back as, matching NOR flash.
pub const ERASED_BYTE: u8 = 0xFF;

/// Device geometry reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    /// Number of erase blocks.
    pub block_count: u32,
    /// Erase block size in bytes; also the logical block size on the wire.
    pub block_size: u32,
}

/// Abstract block device for the staging store.
///
/// No internal locking: the session loop guarantees only one of the host
/// protocol handler and the synchronizer touches the device at any instant.
pub trait BlockDevice {
    /// Device geometry.
    fn capacity(&self) -> Capacity;

    /// Read `buf.len()` bytes starting at `offset`.
    ///
    /// Never fails for in-range spans.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), BlockError>;

    /// Reset the span to [`ERASED_BYTE`]. Offset and length must be
    /// block-aligned.
    fn erase(&mut self, offset: usize, len: usize) -> Result<(), BlockError>;

    /// Write bytes into a previously erased span.
    ///
    /// The result is undefined if the span was not erased first; callers must
    /// erase-then-program within one write cycle.
    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BlockError>;
}

/// Heap-backed block device.
///
/// Created once at boot with a fixed capacity and never resized. Mutated by
/// host write commands and by the staging filesystem's own metadata writes.
pub struct HeapBlockDevice {
    data: Vec<u8>,
    block_size: usize,
}

impl HeapBlockDevice {
    /// Allocate a device of `size` bytes with the given erase block size.
    ///
    /// `size` must be a nonzero multiple of `block_size`; the session
    /// controller validates this from configuration before construction.
    pub fn new(size: usize, block_size: usize) -> Self {
        debug_assert!(block_size > 0 && size % block_size == 0);
        Self {
            data: vec![ERASED_BYTE; size],
            block_size,
        }
    }

    /// Total size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), BlockError> {
        if offset.checked_add(len).map_or(true, |end| end > self.data.len()) {
            return Err(BlockError::OutOfRange {
                offset,
                len,
                capacity: self.data.len(),
            });
        }
        Ok(())
    }

    fn check_aligned(&self, offset: usize, len: usize) -> Result<(), BlockError> {
        if offset % self.block_size != 0 || len % self.block_size != 0 {
            return Err(BlockError::Misaligned {
                offset,
                len,
                block_size: self.block_size,
            });
        }
        Ok(())
    }
}

impl BlockDevice for HeapBlockDevice {
    fn capacity(&self) -> Capacity {
        Capacity {
            block_count: (self.data.len() / self.block_size) as u32,
            block_size: self.block_size as u32,
        }
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        self.check_range(offset, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn erase(&mut self, offset: usize, len: usize) -> Result<(), BlockError> {
        self.check_aligned(offset, len)?;
        self.check_range(offset, len)?;
        self.data[offset..offset + len].fill(ERASED_BYTE);
        Ok(())
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BlockError> {
        self.check_range(offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}
