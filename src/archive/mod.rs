//! # Archive Backend
//!
//! Read-only filesystem over an append-only archive file.
//!
//! ## Overview
//!
//! [`ArchiveFs`] parses the archive once at construction (see
//! [`format`]), building an insertion-ordered path index of every file
//! plus a synthesized directory entry for each proper path prefix. The
//! empty-string key is the archive root. File contents are served by
//! offset into the backing file, which is shared by every open handle —
//! reads therefore use positional `preadv` only, and each handle keeps its
//! cursor in the backend.
//!
//! Handles pack the index position into the value:
//!
//! ```text
//! [ 11 bits generation | 20 bits path index | 1 bit kind ]   (kind in bit 0)
//! ```
//!
//! The generation counter increments on every handle issued (wrapping), so
//! reopening a path yields a different integer and stale handles are
//! detectable by value. Directory kind is 0, making the root directory the
//! all-zero handle — exactly the VFS root sentinel.
//!
//! Write and delete operations fail with `Unsupported`; `open_file`
//! rejects write modes with `PermissionDenied`.

mod format;

pub use format::{ArchiveBuilder, FormatError};

use std::os::fd::AsFd;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::host;
use crate::iter::{DirIterator, IterState};
use crate::path::SafePath;
use crate::types::{Dir, DirEntry, DirOpenOptions, File, FileOpenOptions, Kind, Stat};
use crate::types::Whence;

const KIND_BIT: u32 = 1;
const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = (1 << 11) - 1;

fn encode(is_file: bool, index: u32, generation: u32) -> u32 {
    (is_file as u32)
        | ((index & INDEX_MASK) << 1)
        | ((generation & GENERATION_MASK) << (1 + INDEX_BITS))
}

fn decode(raw: u32) -> (bool, u32) {
    (raw & KIND_BIT == KIND_BIT, (raw >> 1) & INDEX_MASK)
}

struct IndexedEntry {
    stat: Stat,
    data_offset: u64,
}

struct OpenFile {
    path_index: u32,
    cursor: u64,
}

/// A read-only backend over an archive file.
pub struct ArchiveFs {
    file: std::fs::File,
    /// Path → entry, in archive order; position feeds the handle bits.
    index: IndexMap<String, IndexedEntry>,
    open_files: RwLock<IndexMap<u32, OpenFile>>,
    generation: AtomicU32,
}

impl ArchiveFs {
    /// Parse `file` and serve its contents.
    pub fn new(mut file: std::fs::File) -> Result<Self> {
        let entries = format::read_entries(&mut file).map_err(|err| {
            log::error!("archive rejected: {err}");
            Error::Unexpected {
                operation: "archive_init",
            }
        })?;

        let mut index = IndexMap::with_capacity(entries.len() + 1);
        index.insert(String::new(), dir_entry());
        for entry in entries {
            // Iteration must never emit an unsafe basename, so entries the
            // path discipline rejects are dropped up front.
            match SafePath::new(&entry.path) {
                Ok(p) if !p.is_absolute() && !p.is_empty() => {}
                _ => {
                    log::warn!("skipping archive entry with unsafe path {:?}", entry.path);
                    continue;
                }
            }
            index.insert(
                entry.path,
                IndexedEntry {
                    stat: Stat {
                        kind: Kind::File,
                        size: entry.size,
                        mtime: entry.mtime as i128,
                        ctime: entry.mtime as i128,
                    },
                    data_offset: entry.data_offset,
                },
            );
        }

        // Synthesize the intermediate directories implied by file paths.
        let paths: Vec<String> = index.keys().skip(1).cloned().collect();
        for path in paths {
            for (position, _) in path.match_indices('/') {
                let prefix = &path[..position];
                if !index.contains_key(prefix) {
                    index.insert(prefix.to_string(), dir_entry());
                }
            }
        }

        if index.len() > INDEX_MASK as usize + 1 {
            log::error!("archive holds {} paths, above the handle limit", index.len());
            return Err(Error::Unexpected {
                operation: "archive_init",
            });
        }

        Ok(ArchiveFs {
            file,
            index,
            open_files: RwLock::new(IndexMap::new()),
            generation: AtomicU32::new(1),
        })
    }

    /// Open the archive at `path` on the host and serve its contents.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(std::fs::File::open(path)?)
    }

    fn next_generation(&self) -> u32 {
        self.generation.fetch_add(1, Ordering::Relaxed) & GENERATION_MASK
    }

    /// The indexed path a directory handle refers to.
    fn dir_path(&self, dir: Dir) -> Result<&str> {
        if dir.is_root() {
            return Ok("");
        }
        let (is_file, position) = decode(dir.as_raw());
        if is_file {
            return Err(Error::NotDir);
        }
        let (path, entry) = self
            .index
            .get_index(position as usize)
            .ok_or(Error::FileNotFound)?;
        if entry.stat.kind != Kind::Dir {
            return Err(Error::NotDir);
        }
        Ok(path)
    }

    fn entry_at(&self, position: u32) -> Option<&IndexedEntry> {
        self.index.get_index(position as usize).map(|(_, e)| e)
    }
}

fn dir_entry() -> IndexedEntry {
    IndexedEntry {
        stat: Stat {
            kind: Kind::Dir,
            size: 0,
            mtime: 0,
            ctime: 0,
        },
        data_offset: 0,
    }
}

fn join(parent: &str, sub: &str) -> String {
    if parent.is_empty() {
        sub.to_string()
    } else if sub.is_empty() {
        parent.to_string()
    } else {
        format!("{parent}/{sub}")
    }
}

/// Shrink `bufs` so their total length does not exceed `limit`.
fn clamp_bufs<'b>(bufs: &'b mut [&mut [u8]], limit: u64) -> Vec<&'b mut [u8]> {
    let mut remaining = limit;
    let mut out = Vec::with_capacity(bufs.len());
    for buf in bufs.iter_mut() {
        if remaining == 0 {
            break;
        }
        let take = (buf.len() as u64).min(remaining) as usize;
        remaining -= take as u64;
        out.push(&mut buf[..take]);
    }
    out
}

impl Backend for ArchiveFs {
    fn open_dir(&self, parent: Dir, path: SafePath<'_>, options: DirOpenOptions) -> Result<Dir> {
        if options.create {
            return Err(Error::Unsupported {
                operation: "open_dir",
            });
        }
        let full = join(self.dir_path(parent)?, path.as_str());
        let (position, _, entry) = self.index.get_full(&full).ok_or(Error::FileNotFound)?;
        if entry.stat.kind != Kind::Dir {
            return Err(Error::NotDir);
        }
        Ok(Dir::from_raw(encode(
            false,
            position as u32,
            self.next_generation(),
        )))
    }

    // close_dir: the default no-op; directory handles hold no state.

    fn stat(&self, parent: Dir, path: SafePath<'_>) -> Result<Stat> {
        let full = join(self.dir_path(parent)?, path.as_str());
        self.index
            .get(&full)
            .map(|e| e.stat)
            .ok_or(Error::FileNotFound)
    }

    fn iterate(&self, dir: Dir) -> Result<DirIterator> {
        let parent = self.dir_path(dir)?;
        let mut entries = Vec::new();
        for (path, entry) in &self.index {
            if let Some(basename) = child_basename(parent, path) {
                entries.push(DirEntry {
                    basename: basename.to_string(),
                    stat: entry.stat,
                });
            }
        }
        Ok(DirIterator::new(
            dir,
            Box::new(SnapshotIter {
                entries,
                position: 0,
            }),
        ))
    }

    fn open_file(&self, parent: Dir, path: SafePath<'_>, options: FileOpenOptions) -> Result<File> {
        if options.create {
            return Err(Error::PermissionDenied {
                operation: "open_file",
            });
        }
        if options.mode.is_writable() {
            return Err(Error::PermissionDenied {
                operation: "open_file",
            });
        }
        let full = join(self.dir_path(parent)?, path.as_str());
        let (position, _, entry) = self.index.get_full(&full).ok_or(Error::FileNotFound)?;
        if entry.stat.kind == Kind::Dir {
            return Err(Error::IsDir);
        }
        let mut open_files = self.open_files.write().unwrap();
        // The generation makes reopened handles distinct; step past the
        // rare value that is still live.
        let raw = loop {
            let raw = encode(true, position as u32, self.next_generation());
            if !open_files.contains_key(&raw) {
                break raw;
            }
        };
        open_files.insert(
            raw,
            OpenFile {
                path_index: position as u32,
                cursor: 0,
            },
        );
        Ok(File::from_raw(raw))
    }

    fn close_file(&self, file: File) {
        self.open_files.write().unwrap().swap_remove(&file.as_raw());
    }

    fn seek(&self, file: File, offset: u64, whence: Whence) -> Result<u64> {
        let mut open_files = self.open_files.write().unwrap();
        let f = open_files
            .get_mut(&file.as_raw())
            .ok_or(Error::Unseekable)?;
        let size = self
            .entry_at(f.path_index)
            .map(|e| e.stat.size)
            .ok_or(Error::Unseekable)?;
        f.cursor = match whence {
            Whence::Set => offset,
            Whence::Forward => f.cursor.saturating_add(offset),
            Whence::Backward => f.cursor.saturating_sub(offset),
            Whence::FromEnd => size.saturating_sub(offset),
        };
        Ok(f.cursor)
    }

    fn readv(&self, file: File, bufs: &mut [&mut [u8]]) -> Result<usize> {
        let mut open_files = self.open_files.write().unwrap();
        let f = open_files
            .get_mut(&file.as_raw())
            .ok_or(Error::NotOpenForReading)?;
        let entry = self.entry_at(f.path_index).ok_or(Error::NotOpenForReading)?;
        let remaining = entry.stat.size.saturating_sub(f.cursor);
        let mut clamped = clamp_bufs(bufs, remaining);
        let n = host::preadv_batched(self.file.as_fd(), &mut clamped, entry.data_offset + f.cursor)?;
        f.cursor += n as u64;
        Ok(n)
    }

    fn preadv(&self, file: File, bufs: &mut [&mut [u8]], offset: u64) -> Result<usize> {
        let open_files = self.open_files.read().unwrap();
        let f = open_files
            .get(&file.as_raw())
            .ok_or(Error::NotOpenForReading)?;
        let entry = self.entry_at(f.path_index).ok_or(Error::NotOpenForReading)?;
        let remaining = entry.stat.size.saturating_sub(offset);
        let mut clamped = clamp_bufs(bufs, remaining);
        host::preadv_batched(self.file.as_fd(), &mut clamped, entry.data_offset + offset)
    }

    // writev/pwritev/delete_file/delete_dir: the default Unsupported stubs.
}

/// The basename when `path` is a direct child of `parent`.
fn child_basename<'p>(parent: &str, path: &'p str) -> Option<&'p str> {
    if path.is_empty() {
        return None;
    }
    let tail = if parent.is_empty() {
        path
    } else {
        path.strip_prefix(parent)?.strip_prefix('/')?
    };
    if tail.is_empty() || tail.contains('/') {
        None
    } else {
        Some(tail)
    }
}

struct SnapshotIter {
    entries: Vec<DirEntry>,
    position: usize,
}

impl IterState for SnapshotIter {
    fn next(&mut self) -> Result<Option<DirEntry>> {
        let entry = self.entries.get(self.position).cloned();
        self.position += entry.is_some() as usize;
        Ok(entry)
    }

    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Fs, Vfs};
    use crate::types::{DirDeleteOptions, FileMode, Permissions};
    use std::io::Write as _;

    fn fixture() -> Vfs<ArchiveFs> {
        let mut builder = ArchiveBuilder::new();
        builder
            .add_file("a.txt", 5_000_000_000, b"alpha")
            .add_file("dir/b.txt", 6_000_000_000, b"bravo!")
            .add_file("dir/sub/c.txt", 7_000_000_000, b"charlie");
        let mut bytes = Vec::new();
        builder.write_to(&mut bytes).unwrap();
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        Vfs::new(ArchiveFs::new(file).unwrap(), Permissions::all())
    }

    fn path(s: &str) -> SafePath<'_> {
        SafePath::new(s).unwrap()
    }

    #[test]
    fn root_lists_files_and_synthesized_dirs() {
        let vfs = fixture();
        let mut names: Vec<_> = vfs
            .iterate(Dir::ROOT)
            .unwrap()
            .map(|e| e.unwrap())
            .map(|e| (e.basename, e.stat.kind))
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                ("a.txt".to_string(), Kind::File),
                ("dir".to_string(), Kind::Dir)
            ]
        );
    }

    #[test]
    fn nested_dirs_resolve_and_list() {
        let vfs = fixture();
        let dir = vfs
            .open_dir(Dir::ROOT, path("dir"), DirOpenOptions::ITERATE)
            .unwrap();
        let names: Vec<_> = vfs
            .iterate(dir)
            .unwrap()
            .map(|e| e.unwrap().basename)
            .collect();
        assert_eq!(names, ["b.txt", "sub"]);
        vfs.close_dir(dir);
    }

    #[test]
    fn stat_reports_archive_metadata() {
        let vfs = fixture();
        let s = vfs.stat(Dir::ROOT, path("dir/b.txt")).unwrap();
        assert_eq!(s.kind, Kind::File);
        assert_eq!(s.size, 6);
        assert_eq!(s.mtime, 6_000_000_000);
        assert_eq!(s.ctime, s.mtime);

        let d = vfs.stat(Dir::ROOT, path("dir/sub")).unwrap();
        assert_eq!(d.kind, Kind::Dir);
        assert_eq!(d.size, 0);
        assert_eq!(d.mtime, 0);
    }

    #[test]
    fn reads_serve_contents_by_offset() {
        let vfs = fixture();
        let f = vfs
            .open_file(Dir::ROOT, path("dir/sub/c.txt"), FileOpenOptions::READ)
            .unwrap();
        let mut buf = [0u8; 16];
        let n = {
            let mut bufs: [&mut [u8]; 1] = [&mut buf];
            vfs.readv(f, &mut bufs).unwrap()
        };
        assert_eq!(n, 7);
        assert_eq!(&buf[..n], b"charlie");
        // Cursor is at the end now; further reads return 0.
        let mut bufs: [&mut [u8]; 1] = [&mut buf];
        assert_eq!(vfs.readv(f, &mut bufs).unwrap(), 0);
        vfs.close_file(f);
    }

    #[test]
    fn positional_reads_leave_the_cursor_alone() {
        let vfs = fixture();
        let f = vfs
            .open_file(Dir::ROOT, path("a.txt"), FileOpenOptions::READ)
            .unwrap();
        let mut buf = [0u8; 3];
        let n = {
            let mut bufs: [&mut [u8]; 1] = [&mut buf];
            vfs.preadv(f, &mut bufs, 2).unwrap()
        };
        assert_eq!((n, &buf[..3]), (3, &b"pha"[..]));
        // The cursor is still at 0.
        let mut whole = [0u8; 5];
        let n = {
            let mut bufs: [&mut [u8]; 1] = [&mut whole];
            vfs.readv(f, &mut bufs).unwrap()
        };
        assert_eq!((n, &whole[..]), (5, &b"alpha"[..]));
        vfs.close_file(f);
    }

    #[test]
    fn seek_from_end_saturates() {
        let vfs = fixture();
        let f = vfs
            .open_file(Dir::ROOT, path("a.txt"), FileOpenOptions::READ)
            .unwrap();
        assert_eq!(vfs.seek(f, 2, Whence::FromEnd).unwrap(), 3);
        assert_eq!(vfs.seek(f, 99, Whence::FromEnd).unwrap(), 0);
        vfs.close_file(f);
    }

    #[test]
    fn reopening_a_path_yields_a_fresh_handle_value() {
        let vfs = fixture();
        let first = vfs
            .open_file(Dir::ROOT, path("a.txt"), FileOpenOptions::READ)
            .unwrap();
        vfs.close_file(first);
        let second = vfs
            .open_file(Dir::ROOT, path("a.txt"), FileOpenOptions::READ)
            .unwrap();
        assert_ne!(first.as_raw(), second.as_raw());
        vfs.close_file(second);
    }

    #[test]
    fn write_surface_is_rejected() {
        let vfs = fixture();
        assert!(matches!(
            vfs.open_file(Dir::ROOT, path("a.txt"), FileOpenOptions::WRITE),
            Err(Error::PermissionDenied { .. })
        ));
        assert!(matches!(
            vfs.open_file(
                Dir::ROOT,
                path("a.txt"),
                FileOpenOptions {
                    mode: FileMode::ReadWrite,
                    create: false
                }
            ),
            Err(Error::PermissionDenied { .. })
        ));
        assert!(matches!(
            vfs.open_dir(Dir::ROOT, path("dir"), DirOpenOptions::CREATE),
            Err(Error::Unsupported { .. })
        ));
        assert!(matches!(
            vfs.delete_file(Dir::ROOT, path("a.txt")),
            Err(Error::Unsupported { .. })
        ));
        assert!(matches!(
            vfs.delete_dir(Dir::ROOT, path("dir"), DirDeleteOptions::default()),
            Err(Error::Unsupported { .. })
        ));
        let f = vfs
            .open_file(Dir::ROOT, path("a.txt"), FileOpenOptions::READ)
            .unwrap();
        assert!(matches!(
            vfs.writev(f, &[b"nope"]),
            Err(Error::Unsupported { .. })
        ));
        vfs.close_file(f);
    }

    #[test]
    fn structural_errors_distinguish_dirs_and_files() {
        let vfs = fixture();
        assert!(matches!(
            vfs.open_file(Dir::ROOT, path("dir"), FileOpenOptions::READ),
            Err(Error::IsDir)
        ));
        assert!(matches!(
            vfs.open_dir(Dir::ROOT, path("a.txt"), DirOpenOptions::ITERATE),
            Err(Error::NotDir)
        ));
        assert!(matches!(
            vfs.stat(Dir::ROOT, path("missing")),
            Err(Error::FileNotFound)
        ));
    }

    #[test]
    fn closed_handles_stop_reading() {
        let vfs = fixture();
        let f = vfs
            .open_file(Dir::ROOT, path("a.txt"), FileOpenOptions::READ)
            .unwrap();
        vfs.close_file(f);
        let mut buf = [0u8; 4];
        let mut bufs: [&mut [u8]; 1] = [&mut buf];
        assert!(matches!(
            vfs.readv(f, &mut bufs),
            Err(Error::NotOpenForReading)
        ));
    }
}
