//! # Passthrough Backend
//!
//! Serves a host directory tree through the VFS vocabulary.
//!
//! ## Overview
//!
//! [`PassthroughFs`] maps every open handle to a host file descriptor held
//! in an insertion-ordered table. Handle ids come from the backend's own
//! monotone counters (directory ids start at 1 — 0 stays the root sentinel
//! — and wrap past 0), so a host that hands out descriptor 0 can never
//! collide with the sentinel.
//!
//! Iteration reads the host directory live — there is no snapshot — and
//! skips entries whose names fail [`SafePath`](crate::SafePath) validation
//! as well as entries that vanish between listing and stat. `readv`/`writev`
//! drive the per-handle cursor and batch iovecs in groups of up to 16 into
//! host `preadv`/`pwritev`; the positional variants bypass the cursor
//! entirely.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::host;
use crate::iter::{DirIterator, IterState};
use crate::path::SafePath;
use crate::types::{
    Dir, DirDeleteOptions, DirEntry, DirOpenOptions, File, FileOpenOptions, Kind, Stat, Whence,
};

struct HostDir {
    fd: OwnedFd,
}

struct HostFile {
    fd: OwnedFd,
    cursor: u64,
}

/// A backend over a host directory tree.
///
/// Dropping the backend closes every descriptor still in its tables, so
/// outstanding handles never leak past deinit.
pub struct PassthroughFs {
    root: OwnedFd,
    dirs: RwLock<IndexMap<u32, HostDir>>,
    files: RwLock<IndexMap<u32, HostFile>>,
    next_dir: AtomicU32,
    next_file: AtomicU32,
}

impl PassthroughFs {
    /// Open `path` on the host and serve the tree below it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_fd(host::open_root(path.as_ref())?))
    }

    /// Serve the tree below an already-open host directory.
    ///
    /// Ownership of the descriptor transfers to the backend; it is closed
    /// on drop.
    pub fn from_fd(root: OwnedFd) -> Self {
        PassthroughFs {
            root,
            dirs: RwLock::new(IndexMap::new()),
            files: RwLock::new(IndexMap::new()),
            next_dir: AtomicU32::new(1),
            next_file: AtomicU32::new(1),
        }
    }

    fn dir_fd<'m>(&'m self, dirs: &'m IndexMap<u32, HostDir>, dir: Dir) -> Result<BorrowedFd<'m>> {
        if dir.is_root() {
            Ok(self.root.as_fd())
        } else {
            dirs.get(&dir.as_raw())
                .map(|d| d.fd.as_fd())
                .ok_or(Error::FileNotFound)
        }
    }

    fn alloc_dir_id(&self) -> u32 {
        loop {
            let id = self.next_dir.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn alloc_file_id(&self) -> u32 {
        self.next_file.fetch_add(1, Ordering::Relaxed)
    }
}

/// The host path for a facade-relative lookup; the empty path means the
/// directory itself.
fn rel(path: SafePath<'_>) -> &str {
    if path.is_empty() { "." } else { path.as_str() }
}

impl Backend for PassthroughFs {
    fn open_dir(&self, parent: Dir, path: SafePath<'_>, options: DirOpenOptions) -> Result<Dir> {
        let fd = {
            let dirs = self.dirs.read().unwrap();
            let parent_fd = self.dir_fd(&dirs, parent)?;
            if options.create {
                host::make_open_path(parent_fd, path.as_str())?
            } else {
                host::open_dir_at(parent_fd, rel(path))?
            }
        };
        let id = self.alloc_dir_id();
        self.dirs.write().unwrap().insert(id, HostDir { fd });
        Ok(Dir::from_raw(id))
    }

    fn close_dir(&self, dir: Dir) {
        if dir.is_root() {
            return;
        }
        if self.dirs.write().unwrap().shift_remove(&dir.as_raw()).is_none() {
            log::trace!("close_dir on unknown handle {}", dir.as_raw());
        }
    }

    fn delete_dir(&self, parent: Dir, path: SafePath<'_>, options: DirDeleteOptions) -> Result<()> {
        let dirs = self.dirs.read().unwrap();
        let parent_fd = self.dir_fd(&dirs, parent)?;
        if options.recursive {
            host::remove_dir_all_at(parent_fd, rel(path))
        } else {
            host::remove_dir_at(parent_fd, rel(path))
        }
    }

    fn stat(&self, parent: Dir, path: SafePath<'_>) -> Result<Stat> {
        let dirs = self.dirs.read().unwrap();
        let parent_fd = self.dir_fd(&dirs, parent)?;
        host::stat_at(parent_fd, rel(path))
    }

    fn iterate(&self, dir: Dir) -> Result<DirIterator> {
        let (stat_fd, reader) = {
            let dirs = self.dirs.read().unwrap();
            let fd = self.dir_fd(&dirs, dir)?;
            (host::dup(fd)?, host::read_dir(fd)?)
        };
        Ok(DirIterator::new(
            dir,
            Box::new(PassthroughIter { stat_fd, reader }),
        ))
    }

    fn open_file(&self, parent: Dir, path: SafePath<'_>, options: FileOpenOptions) -> Result<File> {
        let fd = {
            let dirs = self.dirs.read().unwrap();
            let parent_fd = self.dir_fd(&dirs, parent)?;
            host::open_file_at(parent_fd, path.as_str(), options.mode, options.create)?
        };
        if host::stat_fd(fd.as_fd())?.kind == Kind::Dir {
            return Err(Error::IsDir);
        }
        let id = self.alloc_file_id();
        self.files
            .write()
            .unwrap()
            .insert(id, HostFile { fd, cursor: 0 });
        Ok(File::from_raw(id))
    }

    fn close_file(&self, file: File) {
        if self
            .files
            .write()
            .unwrap()
            .shift_remove(&file.as_raw())
            .is_none()
        {
            log::trace!("close_file on unknown handle {}", file.as_raw());
        }
    }

    fn delete_file(&self, parent: Dir, path: SafePath<'_>) -> Result<()> {
        let dirs = self.dirs.read().unwrap();
        let parent_fd = self.dir_fd(&dirs, parent)?;
        host::unlink_file_at(parent_fd, rel(path))
    }

    fn seek(&self, file: File, offset: u64, whence: Whence) -> Result<u64> {
        let mut files = self.files.write().unwrap();
        let f = files.get_mut(&file.as_raw()).ok_or(Error::Unseekable)?;
        f.cursor = match whence {
            Whence::Set => offset,
            Whence::Forward => f.cursor.saturating_add(offset),
            Whence::Backward => f.cursor.saturating_sub(offset),
            Whence::FromEnd => host::file_size(f.fd.as_fd())?.saturating_sub(offset),
        };
        Ok(f.cursor)
    }

    fn readv(&self, file: File, bufs: &mut [&mut [u8]]) -> Result<usize> {
        let mut files = self.files.write().unwrap();
        let f = files
            .get_mut(&file.as_raw())
            .ok_or(Error::NotOpenForReading)?;
        let n = host::preadv_batched(f.fd.as_fd(), bufs, f.cursor)?;
        f.cursor += n as u64;
        Ok(n)
    }

    fn preadv(&self, file: File, bufs: &mut [&mut [u8]], offset: u64) -> Result<usize> {
        let files = self.files.read().unwrap();
        let f = files.get(&file.as_raw()).ok_or(Error::NotOpenForReading)?;
        host::preadv_batched(f.fd.as_fd(), bufs, offset)
    }

    fn writev(&self, file: File, bufs: &[&[u8]]) -> Result<usize> {
        let mut files = self.files.write().unwrap();
        let f = files
            .get_mut(&file.as_raw())
            .ok_or(Error::NotOpenForWriting)?;
        let n = host::pwritev_batched(f.fd.as_fd(), bufs, f.cursor)?;
        f.cursor += n as u64;
        Ok(n)
    }

    fn pwritev(&self, file: File, bufs: &[&[u8]], offset: u64) -> Result<usize> {
        let files = self.files.read().unwrap();
        let f = files.get(&file.as_raw()).ok_or(Error::NotOpenForWriting)?;
        host::pwritev_batched(f.fd.as_fd(), bufs, offset)
    }
}

struct PassthroughIter {
    /// Private dup of the directory, so stat keeps working even if the
    /// caller closes the `Dir` mid-iteration.
    stat_fd: OwnedFd,
    reader: rustix::fs::Dir,
}

impl IterState for PassthroughIter {
    fn next(&mut self) -> Result<Option<DirEntry>> {
        loop {
            let Some(entry) = self.reader.next() else {
                return Ok(None);
            };
            let entry = entry.map_err(host::map_dir_errno)?;
            let Ok(name) = entry.file_name().to_str() else {
                log::warn!("skipping non-utf8 directory entry");
                continue;
            };
            if name == "." || name == ".." {
                continue;
            }
            if SafePath::new(name).is_err() {
                log::warn!("skipping unsafe directory entry {name:?}");
                continue;
            }
            let stat = match host::stat_at(self.stat_fd.as_fd(), name) {
                Ok(stat) => stat,
                // The entry raced with a concurrent deletion.
                Err(Error::FileNotFound) => continue,
                Err(err) => return Err(err),
            };
            return Ok(Some(DirEntry {
                basename: name.to_string(),
                stat,
            }));
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.reader.rewind();
        Ok(())
    }
}
