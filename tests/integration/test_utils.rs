//! Shared test utilities for integration tests
//!
//! Directory-backed volume fixtures, byte-for-byte tree comparison, and fault
//! injection wrappers used by the synchronizer and session tests.

use flashbridge::error::FsError;
use flashbridge::vfs::{DirEntry, DirVolume, Volume};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Create, format and mount a directory-backed volume under `root`.
pub fn mounted_volume(label: &str, root: &Path) -> DirVolume {
    let mut vol = DirVolume::new(label, root);
    vol.format().unwrap();
    vol.mount().unwrap();
    vol
}

/// Mount a pre-seeded volume without formatting it, like the persistent store
/// at boot.
pub fn attach_volume(label: &str, root: &Path) -> DirVolume {
    fs::create_dir_all(root).unwrap();
    let mut vol = DirVolume::new(label, root);
    vol.mount().unwrap();
    vol
}

/// Write a file, creating parent directories on the host side.
pub fn seed_file(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Collect every entry under `root` as relative path -> file bytes
/// (directories map to `None`).
pub fn tree_contents(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
        if entry.file_type().is_dir() {
            out.insert(rel, None);
        } else {
            out.insert(rel, Some(fs::read(entry.path()).unwrap()));
        }
    }
    out
}

/// Assert two trees are byte-for-byte identical.
pub fn assert_trees_equal(a: &Path, b: &Path) {
    assert_eq!(tree_contents(a), tree_contents(b));
}

/// Volume wrapper that fails writes to one relative path, simulating an I/O
/// fault mid-copy.
pub struct FaultyVolume {
    inner: DirVolume,
    fail_write: PathBuf,
}

impl FaultyVolume {
    pub fn new(inner: DirVolume, fail_write: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            fail_write: fail_write.into(),
        }
    }
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "injected write fault",
        ))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Volume for FaultyVolume {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn format(&mut self) -> Result<(), FsError> {
        self.inner.format()
    }

    fn mount(&mut self) -> Result<(), FsError> {
        self.inner.mount()
    }

    fn unmount(&mut self) -> Result<(), FsError> {
        self.inner.unmount()
    }

    fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>, FsError> {
        self.inner.read_dir(rel)
    }

    fn metadata(&self, rel: &Path) -> Result<DirEntry, FsError> {
        self.inner.metadata(rel)
    }

    fn create_dir(&mut self, rel: &Path) -> Result<(), FsError> {
        self.inner.create_dir(rel)
    }

    fn open_read(&self, rel: &Path) -> Result<Box<dyn Read + '_>, FsError> {
        self.inner.open_read(rel)
    }

    fn create_write(&mut self, rel: &Path) -> Result<Box<dyn Write + '_>, FsError> {
        if rel == self.fail_write.as_path() {
            return Ok(Box::new(FailingWriter));
        }
        self.inner.create_write(rel)
    }

    fn remove_file(&mut self, rel: &Path) -> Result<(), FsError> {
        self.inner.remove_file(rel)
    }

    fn remove_dir(&mut self, rel: &Path) -> Result<(), FsError> {
        self.inner.remove_dir(rel)
    }
}

/// Volume wrapper whose next N mount attempts fail, for remount-retry tests.
pub struct FlakyMountVolume {
    inner: DirVolume,
    failures_left: u32,
}

impl FlakyMountVolume {
    pub fn new(inner: DirVolume, failures: u32) -> Self {
        Self {
            inner,
            failures_left: failures,
        }
    }

    /// Make the next `n` mount attempts fail.
    pub fn arm_failures(&mut self, n: u32) {
        self.failures_left = n;
    }
}

impl Volume for FlakyMountVolume {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn format(&mut self) -> Result<(), FsError> {
        self.inner.format()
    }

    fn mount(&mut self) -> Result<(), FsError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(FsError::Mount {
                label: self.inner.label().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "injected mount fault"),
            });
        }
        self.inner.mount()
    }

    fn unmount(&mut self) -> Result<(), FsError> {
        self.inner.unmount()
    }

    fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>, FsError> {
        self.inner.read_dir(rel)
    }

    fn metadata(&self, rel: &Path) -> Result<DirEntry, FsError> {
        self.inner.metadata(rel)
    }

    fn create_dir(&mut self, rel: &Path) -> Result<(), FsError> {
        self.inner.create_dir(rel)
    }

    fn open_read(&self, rel: &Path) -> Result<Box<dyn Read + '_>, FsError> {
        self.inner.open_read(rel)
    }

    fn create_write(&mut self, rel: &Path) -> Result<Box<dyn Write + '_>, FsError> {
        self.inner.create_write(rel)
    }

    fn remove_file(&mut self, rel: &Path) -> Result<(), FsError> {
        self.inner.remove_file(rel)
    }

    fn remove_dir(&mut self, rel: &Path) -> Result<(), FsError> {
        self.inner.remove_dir(rel)
    }
}
