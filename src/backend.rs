//! # The Backend Trait
//!
//! The raw operation vocabulary every backend implements.
//!
//! ## Overview
//!
//! [`Backend`] is the dispatch surface below the [`Vfs`](crate::Vfs) facade.
//! The facade owns the policy — capability gating, chroot root rebinding,
//! path relativization — and the backend owns the mechanics: handle tables,
//! host descriptors, archive offsets.
//!
//! Every operation has a default body returning
//! [`Error::Unsupported`](crate::Error::Unsupported) (the `close_*`
//! operations default to no-ops), so a backend implements only the
//! capabilities it actually has. The read-only archive backend, for
//! example, never mentions `writev` or `delete_file` at all.
//!
//! ## Contract
//!
//! - Paths arriving here are already validated and **relative**; the parent
//!   [`Dir`] is already rebound (the root sentinel the facade passes refers
//!   to the backend's own root, not to a chroot).
//! - Every successful open records the handle in a table keyed by the
//!   public id so the backend's `Drop` can release it.
//! - Closing an unknown handle is silent; other operations on unknown
//!   handles return a deterministic error.

use crate::error::{Error, Result};
use crate::iter::DirIterator;
use crate::path::SafePath;
use crate::types::{
    Dir, DirDeleteOptions, DirOpenOptions, File, FileOpenOptions, Stat, Whence,
};

/// The raw operation vocabulary over opaque handles.
///
/// See the [module docs](self) for the dispatch contract. Methods the
/// backend omits fail with `Unsupported`.
#[allow(unused_variables)]
pub trait Backend: Send + Sync {
    /// Open a directory under `parent`.
    fn open_dir(&self, parent: Dir, path: SafePath<'_>, options: DirOpenOptions) -> Result<Dir> {
        Err(Error::Unsupported {
            operation: "open_dir",
        })
    }

    /// Close a directory handle. Unknown handles are ignored.
    fn close_dir(&self, dir: Dir) {}

    /// Delete a directory under `parent`.
    fn delete_dir(
        &self,
        parent: Dir,
        path: SafePath<'_>,
        options: DirDeleteOptions,
    ) -> Result<()> {
        Err(Error::Unsupported {
            operation: "delete_dir",
        })
    }

    /// Stat the object at `path` under `parent`.
    fn stat(&self, parent: Dir, path: SafePath<'_>) -> Result<Stat> {
        Err(Error::Unsupported { operation: "stat" })
    }

    /// Begin iterating `dir`.
    fn iterate(&self, dir: Dir) -> Result<DirIterator> {
        Err(Error::Unsupported {
            operation: "iterate",
        })
    }

    /// Open a file under `parent`.
    fn open_file(&self, parent: Dir, path: SafePath<'_>, options: FileOpenOptions) -> Result<File> {
        Err(Error::Unsupported {
            operation: "open_file",
        })
    }

    /// Close a file handle. Unknown handles are ignored.
    fn close_file(&self, file: File) {}

    /// Delete the file at `path` under `parent`.
    fn delete_file(&self, parent: Dir, path: SafePath<'_>) -> Result<()> {
        Err(Error::Unsupported {
            operation: "delete_file",
        })
    }

    /// Move the per-handle cursor; returns the new offset.
    fn seek(&self, file: File, offset: u64, whence: Whence) -> Result<u64> {
        Err(Error::Unsupported { operation: "seek" })
    }

    /// Scatter-read at the per-handle cursor, advancing it by the bytes
    /// actually read. Partial reads return early.
    fn readv(&self, file: File, bufs: &mut [&mut [u8]]) -> Result<usize> {
        Err(Error::Unsupported { operation: "readv" })
    }

    /// Scatter-read at `offset` without touching the cursor.
    fn preadv(&self, file: File, bufs: &mut [&mut [u8]], offset: u64) -> Result<usize> {
        Err(Error::Unsupported {
            operation: "preadv",
        })
    }

    /// Gather-write at the per-handle cursor, advancing it by the bytes
    /// actually written. Partial writes return early.
    fn writev(&self, file: File, bufs: &[&[u8]]) -> Result<usize> {
        Err(Error::Unsupported {
            operation: "writev",
        })
    }

    /// Gather-write at `offset` without touching the cursor.
    fn pwritev(&self, file: File, bufs: &[&[u8]], offset: u64) -> Result<usize> {
        Err(Error::Unsupported {
            operation: "pwritev",
        })
    }
}
