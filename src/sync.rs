//! Directory-tree synchronization between the staging and persistent volumes.
//!
//! Two operations, both iterative walks over [`Volume`] handles:
//!
//! - [`Synchronizer::replicate`] copies every file and directory of a source
//!   tree onto a destination tree, overwriting destination files. Used in the
//!   hydration direction (flash to RAM at boot) and the commit direction (RAM
//!   to flash at quiescence).
//! - [`Synchronizer::sweep`] deletes candidate-tree entries that no longer
//!   exist in a reference tree, propagating host-side deletions to flash.
//!
//! Hidden (dot-prefixed) names and one reserved host-artifact directory are
//! excluded in both directions. A failure on one entry is logged and skipped;
//! sibling entries are still processed. Both operations are idempotent.

use crate::error::{FsError, SyncError};
use crate::vfs::{EntryKind, Volume};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Copy buffer size: constant memory regardless of file size.
pub const COPY_CHUNK: usize = 512;

/// Default bound on relative path length within a tree.
pub const MAX_REL_PATH: usize = 256;

/// Host-artifact directory common desktop systems create on removable media.
pub const DEFAULT_RESERVED_DIR: &str = "System Volume Information";

/// Exclusion rules and walk bounds.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Directory name excluded from both synchronization directions.
    pub reserved_dir: String,
    /// Maximum relative path length; longer entries fail with `PathTooLong`.
    pub max_rel_path: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reserved_dir: DEFAULT_RESERVED_DIR.to_string(),
            max_rel_path: MAX_REL_PATH,
        }
    }
}

/// Counters reported after each walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub files_copied: u64,
    pub dirs_created: u64,
    pub entries_removed: u64,
    pub entries_skipped: u64,
}

/// Tree synchronizer.
pub struct Synchronizer {
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    /// Whether a name is excluded from synchronization.
    fn excluded(&self, name: &str) -> bool {
        name.starts_with('.') || name == self.options.reserved_dir
    }

    fn check_path(&self, rel: &Path) -> Result<(), SyncError> {
        if rel.as_os_str().len() > self.options.max_rel_path {
            return Err(SyncError::PathTooLong {
                path: rel.to_path_buf(),
                limit: self.options.max_rel_path,
            });
        }
        Ok(())
    }

    /// Replicate the source tree onto the destination tree.
    ///
    /// Directories are created idempotently; files are copied whole,
    /// overwriting any existing destination file. Ordering within a directory
    /// is whatever the volume reports; entries are independent.
    pub fn replicate<S, D>(&self, src: &S, dst: &mut D) -> SyncStats
    where
        S: Volume + ?Sized,
        D: Volume + ?Sized,
    {
        let mut stats = SyncStats::default();
        // Iterative walk: explicit stack instead of recursion, so tree depth
        // is bounded by heap rather than call stack.
        let mut pending: Vec<PathBuf> = vec![PathBuf::new()];

        while let Some(dir) = pending.pop() {
            let entries = match src.read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                    stats.entries_skipped += 1;
                    continue;
                }
            };

            for entry in entries {
                if self.excluded(&entry.name) {
                    continue;
                }
                let rel = dir.join(&entry.name);
                if let Err(e) = self.check_path(&rel) {
                    warn!(path = %rel.display(), error = %e, "skipping entry");
                    stats.entries_skipped += 1;
                    continue;
                }

                match entry.kind {
                    EntryKind::Directory => match dst.create_dir(&rel) {
                        Ok(()) => {
                            stats.dirs_created += 1;
                            pending.push(rel);
                        }
                        Err(e) => {
                            warn!(path = %rel.display(), error = %e, "skipping directory");
                            stats.entries_skipped += 1;
                        }
                    },
                    EntryKind::File => match self.copy_file(src, dst, &rel) {
                        Ok(bytes) => {
                            debug!(path = %rel.display(), bytes, "copied");
                            stats.files_copied += 1;
                        }
                        Err(e) => {
                            warn!(path = %rel.display(), error = %e, "skipping file");
                            stats.entries_skipped += 1;
                        }
                    },
                }
            }
        }

        info!(
            src = src.label(),
            dst = dst.label(),
            files = stats.files_copied,
            skipped = stats.entries_skipped,
            "replicate finished"
        );
        stats
    }

    /// Stream one file from source to destination through a fixed buffer.
    fn copy_file<S, D>(&self, src: &S, dst: &mut D, rel: &Path) -> Result<u64, SyncError>
    where
        S: Volume + ?Sized,
        D: Volume + ?Sized,
    {
        let mut reader = src.open_read(rel)?;
        let mut writer = dst.create_write(rel)?;
        let mut buf = [0u8; COPY_CHUNK];
        let mut total = 0u64;
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| FsError::io(rel, e))?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buf[..n])
                .map_err(|e| FsError::io(rel, e))?;
            total += n as u64;
        }
        writer.flush().map_err(|e| FsError::io(rel, e))?;
        Ok(total)
    }

    /// Delete candidate-tree entries absent from the reference tree.
    ///
    /// A directory missing from the reference is emptied and removed; a
    /// directory present in the reference is never deleted, even when the
    /// sweep leaves it empty.
    pub fn sweep<R, C>(&self, reference: &R, candidate: &mut C) -> SyncStats
    where
        R: Volume + ?Sized,
        C: Volume + ?Sized,
    {
        let mut stats = SyncStats::default();
        let mut pending: Vec<PathBuf> = vec![PathBuf::new()];

        while let Some(dir) = pending.pop() {
            let entries = match candidate.read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                    stats.entries_skipped += 1;
                    continue;
                }
            };

            for entry in entries {
                if self.excluded(&entry.name) {
                    continue;
                }
                let rel = dir.join(&entry.name);
                if let Err(e) = self.check_path(&rel) {
                    warn!(path = %rel.display(), error = %e, "skipping entry");
                    stats.entries_skipped += 1;
                    continue;
                }

                let present = match reference.metadata(&rel) {
                    Ok(_) => true,
                    Err(FsError::NotFound(_)) => false,
                    Err(e) => {
                        warn!(path = %rel.display(), error = %e, "skipping entry");
                        stats.entries_skipped += 1;
                        continue;
                    }
                };

                match (entry.kind, present) {
                    (_, true) => {
                        if entry.kind == EntryKind::Directory {
                            pending.push(rel);
                        }
                    }
                    (EntryKind::File, false) => match candidate.remove_file(&rel) {
                        Ok(()) => {
                            debug!(path = %rel.display(), "removed");
                            stats.entries_removed += 1;
                        }
                        Err(e) => {
                            warn!(path = %rel.display(), error = %e, "failed to remove");
                            stats.entries_skipped += 1;
                        }
                    },
                    (EntryKind::Directory, false) => {
                        self.remove_tree(candidate, &rel, &mut stats);
                    }
                }
            }
        }

        info!(
            reference = reference.label(),
            candidate = candidate.label(),
            removed = stats.entries_removed,
            skipped = stats.entries_skipped,
            "sweep finished"
        );
        stats
    }

    /// Remove a whole subtree: files as discovered, directories bottom-up.
    fn remove_tree<C>(&self, vol: &mut C, root: &Path, stats: &mut SyncStats)
    where
        C: Volume + ?Sized,
    {
        let mut dirs = vec![root.to_path_buf()];
        let mut next = 0;
        while next < dirs.len() {
            let dir = dirs[next].clone();
            next += 1;
            let entries = match vol.read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                    stats.entries_skipped += 1;
                    continue;
                }
            };
            for entry in entries {
                let rel = dir.join(&entry.name);
                match entry.kind {
                    EntryKind::Directory => dirs.push(rel),
                    EntryKind::File => match vol.remove_file(&rel) {
                        Ok(()) => stats.entries_removed += 1,
                        Err(e) => {
                            warn!(path = %rel.display(), error = %e, "failed to remove");
                            stats.entries_skipped += 1;
                        }
                    },
                }
            }
        }
        for dir in dirs.iter().rev() {
            match vol.remove_dir(dir) {
                Ok(()) => stats.entries_removed += 1,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to remove directory");
                    stats.entries_skipped += 1;
                }
            }
        }
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(SyncOptions::default())
    }
}
