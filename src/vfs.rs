//! Mounted filesystem handles.
//!
//! The persistent flash filesystem and the staging FAT driver are external
//! collaborators; this module defines the mount/format/read/write seam the
//! session controller and the tree synchronizer consume, plus a host-directory
//! implementation used for hosted runs and tests. A mount point has zero or one
//! active handle at a time, and every tree operation is only valid while the
//! volume is mounted.

use crate::error::FsError;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Entry classification for synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A directory entry, identified by name relative to its parent.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Byte length for files; 0 for directories.
    pub len: u64,
}

/// A mountable filesystem bound to one backing store.
///
/// Tree operations take paths relative to the volume root and fail with
/// [`FsError::NotMounted`] while the volume is unmounted.
pub trait Volume {
    /// Mount-point label, e.g. `/flash` or `/ram`.
    fn label(&self) -> &str;

    /// Re-create an empty filesystem on the backing store.
    fn format(&mut self) -> Result<(), FsError>;

    fn mount(&mut self) -> Result<(), FsError>;

    fn unmount(&mut self) -> Result<(), FsError>;

    fn is_mounted(&self) -> bool;

    /// List the entries of a directory.
    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>, FsError>;

    /// Look up a single entry.
    fn metadata(&self, rel: &Path) -> Result<DirEntry, FsError>;

    /// Create a directory. Idempotent: an already existing directory is
    /// success, not an error.
    fn create_dir(&mut self, rel: &Path) -> Result<(), FsError>;

    /// Open a file for reading.
    fn open_read(&self, rel: &Path) -> Result<Box<dyn Read + '_>, FsError>;

    /// Create or truncate a file for writing.
    fn create_write(&mut self, rel: &Path) -> Result<Box<dyn Write + '_>, FsError>;

    fn remove_file(&mut self, rel: &Path) -> Result<(), FsError>;

    /// Remove a directory. The caller empties it first.
    fn remove_dir(&mut self, rel: &Path) -> Result<(), FsError>;
}

/// Host-directory-backed volume.
///
/// Stands in for the littlefs and FAT drivers on hosted builds: each mount
/// point maps to a directory on the host filesystem. Remounting re-reads the
/// backing tree from scratch, which models the on-device driver re-reading its
/// superstructure after the host rewrote it through block I/O.
pub struct DirVolume {
    label: String,
    root: PathBuf,
    mounted: bool,
}

impl DirVolume {
    pub fn new(label: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            root: root.into(),
            mounted: false,
        }
    }

    /// Backing directory on the host.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_mounted(&self) -> Result<(), FsError> {
        if self.mounted {
            Ok(())
        } else {
            Err(FsError::NotMounted(self.label.clone()))
        }
    }

    fn abs(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    /// All entries under the root as sorted relative paths.
    ///
    /// Sorted for determinism so listings and test diffs are stable.
    pub fn snapshot(&self) -> Result<Vec<(PathBuf, EntryKind)>, FsError> {
        self.ensure_mounted()?;
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| {
                FsError::io(
                    &self.root,
                    std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                )
            })?;
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .expect("walkdir yields paths under root")
                .to_path_buf();
            let kind = if entry.file_type().is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            out.push((rel, kind));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

impl Volume for DirVolume {
    fn label(&self) -> &str {
        &self.label
    }

    fn format(&mut self) -> Result<(), FsError> {
        if self.mounted {
            return Err(FsError::AlreadyMounted(self.label.clone()));
        }
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|e| FsError::Format {
                label: self.label.clone(),
                source: e,
            })?;
        }
        fs::create_dir_all(&self.root).map_err(|e| FsError::Format {
            label: self.label.clone(),
            source: e,
        })?;
        debug!(volume = %self.label, "formatted");
        Ok(())
    }

    fn mount(&mut self) -> Result<(), FsError> {
        if self.mounted {
            return Err(FsError::AlreadyMounted(self.label.clone()));
        }
        if !self.root.is_dir() {
            return Err(FsError::Mount {
                label: self.label.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("backing directory {} missing", self.root.display()),
                ),
            });
        }
        self.mounted = true;
        debug!(volume = %self.label, root = %self.root.display(), "mounted");
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), FsError> {
        self.ensure_mounted()?;
        self.mounted = false;
        debug!(volume = %self.label, "unmounted");
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>, FsError> {
        self.ensure_mounted()?;
        let dir = self.abs(rel);
        if !dir.exists() {
            return Err(FsError::NotFound(rel.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(FsError::NotADirectory(rel.to_path_buf()));
        }
        let mut entries = Vec::new();
        for ent in fs::read_dir(&dir).map_err(|e| FsError::io(&dir, e))? {
            let ent = ent.map_err(|e| FsError::io(&dir, e))?;
            let meta = ent.metadata().map_err(|e| FsError::io(ent.path(), e))?;
            let kind = if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(DirEntry {
                name: ent.file_name().to_string_lossy().into_owned(),
                kind,
                len: if meta.is_file() { meta.len() } else { 0 },
            });
        }
        Ok(entries)
    }

    fn metadata(&self, rel: &Path) -> Result<DirEntry, FsError> {
        self.ensure_mounted()?;
        let path = self.abs(rel);
        let meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FsError::NotFound(rel.to_path_buf()))
            }
            Err(e) => return Err(FsError::io(&path, e)),
        };
        let name = rel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(DirEntry {
            name,
            kind: if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            len: if meta.is_file() { meta.len() } else { 0 },
        })
    }

    fn create_dir(&mut self, rel: &Path) -> Result<(), FsError> {
        self.ensure_mounted()?;
        let dir = self.abs(rel);
        match fs::create_dir(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(FsError::io(&dir, e)),
        }
    }

    fn open_read(&self, rel: &Path) -> Result<Box<dyn Read + '_>, FsError> {
        self.ensure_mounted()?;
        let path = self.abs(rel);
        let file = fs::File::open(&path).map_err(|e| FsError::io(&path, e))?;
        Ok(Box::new(file))
    }

    fn create_write(&mut self, rel: &Path) -> Result<Box<dyn Write + '_>, FsError> {
        self.ensure_mounted()?;
        let path = self.abs(rel);
        let file = fs::File::create(&path).map_err(|e| FsError::io(&path, e))?;
        Ok(Box::new(file))
    }

    fn remove_file(&mut self, rel: &Path) -> Result<(), FsError> {
        self.ensure_mounted()?;
        let path = self.abs(rel);
        fs::remove_file(&path).map_err(|e| FsError::io(&path, e))
    }

    fn remove_dir(&mut self, rel: &Path) -> Result<(), FsError> {
        self.ensure_mounted()?;
        let path = self.abs(rel);
        fs::remove_dir(&path).map_err(|e| FsError::io(&path, e))
    }
}
