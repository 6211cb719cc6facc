//! # The VFS Facade
//!
//! Capability gating, chroot rebinding, and backend dispatch.
//!
//! ## Overview
//!
//! [`Vfs`] wraps any [`Backend`] and implements [`Fs`], the object-safe
//! public surface. For every operation the facade:
//!
//! 1. evaluates the relevant [`Permissions`] bit and fails with
//!    `PermissionDenied` **without consulting the backend**,
//! 2. rebinds the effective directory — the root sentinel, or any absolute
//!    path, substitutes the current logical root installed by
//!    [`Fs::chroot`],
//! 3. dispatches to the backend with the [`relative`](SafePath::relative)
//!    portion of the path.
//!
//! Composing backends (overlay, multiplexer) hold their children as
//! `Arc<dyn Fs>`, so a child's own capability set travels with every
//! forwarded call — a composer cannot bypass it, and neither can the
//! walker.
//!
//! ## Capability table
//!
//! | Operation | Requires |
//! |-----------|----------|
//! | `open_dir` | `CREATE` only when the `create` option is set |
//! | `open_file` | `CREATE` when creating; `READ`/`WRITE` per mode |
//! | `delete_dir`, `delete_file` | `DELETE` |
//! | `stat`, `seek` | `STAT` |
//! | `iterate` | `ITERATE` |
//! | `readv`, `preadv` | `READ` |
//! | `writev`, `pwritev` | `WRITE` |
//! | `close_dir`, `close_file` | — |

use std::sync::atomic::{AtomicU32, Ordering};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::iter::DirIterator;
use crate::path::SafePath;
use crate::types::{
    Dir, DirDeleteOptions, DirOpenOptions, File, FileOpenOptions, Permissions, Stat, Whence,
};

/// The capability-controlled operation surface of a virtual filesystem.
///
/// Object-safe; composing backends and the walker work through
/// `Arc<dyn Fs>` / `&dyn Fs`. The only implementor in this crate is
/// [`Vfs`], which layers the capability and chroot policy over a
/// [`Backend`].
pub trait Fs: Send + Sync {
    /// The capability set this filesystem was constructed with.
    fn permissions(&self) -> Permissions;

    /// Open a directory at `path` under `parent`.
    fn open_dir(&self, parent: Dir, path: SafePath<'_>, options: DirOpenOptions) -> Result<Dir>;

    /// Close a directory handle. Closing the root sentinel or an unknown
    /// handle is a safe no-op.
    fn close_dir(&self, dir: Dir);

    /// Delete the directory at `path` under `parent`.
    fn delete_dir(&self, parent: Dir, path: SafePath<'_>, options: DirDeleteOptions) -> Result<()>;

    /// Stat the object at `path` under `parent`.
    fn stat(&self, parent: Dir, path: SafePath<'_>) -> Result<Stat>;

    /// Begin iterating `dir`.
    fn iterate(&self, dir: Dir) -> Result<DirIterator>;

    /// Open a file at `path` under `parent`.
    fn open_file(&self, parent: Dir, path: SafePath<'_>, options: FileOpenOptions) -> Result<File>;

    /// Close a file handle. Unknown handles are a safe no-op.
    fn close_file(&self, file: File);

    /// Delete the file at `path` under `parent`.
    fn delete_file(&self, parent: Dir, path: SafePath<'_>) -> Result<()>;

    /// Move the per-handle cursor; returns the new offset. Arithmetic
    /// saturates at 0 and [`Whence::FromEnd`] queries the current size.
    fn seek(&self, file: File, offset: u64, whence: Whence) -> Result<u64>;

    /// Scatter-read at the cursor; returns bytes read, advancing the
    /// cursor. A short count means the backend hit end-of-data.
    fn readv(&self, file: File, bufs: &mut [&mut [u8]]) -> Result<usize>;

    /// Scatter-read at `offset` without touching the cursor.
    fn preadv(&self, file: File, bufs: &mut [&mut [u8]], offset: u64) -> Result<usize>;

    /// Gather-write at the cursor; returns bytes written, advancing the
    /// cursor. A short count is returned verbatim.
    fn writev(&self, file: File, bufs: &[&[u8]]) -> Result<usize>;

    /// Gather-write at `offset` without touching the cursor.
    fn pwritev(&self, file: File, bufs: &[&[u8]], offset: u64) -> Result<usize>;

    /// Install `subpath` as the logical root for subsequent root-relative
    /// lookups.
    ///
    /// `subpath` is opened for iteration relative to `dir`, or relative to
    /// the previous root when absolute. Any previously installed
    /// non-sentinel root is closed. An empty `subpath` reverts to the
    /// backend's own root.
    fn chroot(&self, dir: Dir, subpath: SafePath<'_>) -> Result<()>;
}

/// A [`Backend`] wrapped in the capability/chroot facade.
///
/// # Example
///
/// ```rust,no_run
/// use harha::{Dir, Fs, PassthroughFs, Permissions, SafePath, Vfs};
///
/// # fn demo() -> harha::Result<()> {
/// let vfs = Vfs::new(PassthroughFs::open("/srv/data")?, Permissions::READ_ONLY);
/// let stat = vfs.stat(Dir::ROOT, SafePath::new("logs/today.txt")?)?;
/// println!("{} bytes", stat.size);
/// # Ok(())
/// # }
/// ```
pub struct Vfs<B: Backend> {
    backend: B,
    permissions: Permissions,
    /// Raw handle of the logical root; 0 is the backend's own root.
    root: AtomicU32,
}

impl<B: Backend> Vfs<B> {
    /// Wrap `backend` with the given capability set.
    pub fn new(backend: B, permissions: Permissions) -> Self {
        Vfs {
            backend,
            permissions,
            root: AtomicU32::new(0),
        }
    }

    /// Access the wrapped backend, e.g. to mount children on an overlay.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn logical_root(&self) -> Dir {
        Dir::from_raw(self.root.load(Ordering::Relaxed))
    }

    /// Root sentinel and absolute paths resolve under the logical root.
    fn rebind(&self, dir: Dir, path: SafePath<'_>) -> Dir {
        if dir.is_root() || path.is_absolute() {
            self.logical_root()
        } else {
            dir
        }
    }

    fn require(&self, needed: Permissions, operation: &'static str) -> Result<()> {
        if self.permissions.contains(needed) {
            Ok(())
        } else {
            Err(Error::PermissionDenied { operation })
        }
    }
}

impl<B: Backend> Fs for Vfs<B> {
    fn permissions(&self) -> Permissions {
        self.permissions
    }

    fn open_dir(&self, parent: Dir, path: SafePath<'_>, options: DirOpenOptions) -> Result<Dir> {
        if options.create {
            self.require(Permissions::CREATE, "open_dir")?;
        }
        let parent = self.rebind(parent, path);
        self.backend.open_dir(parent, path.relative(), options)
    }

    fn close_dir(&self, dir: Dir) {
        self.backend.close_dir(dir);
    }

    fn delete_dir(&self, parent: Dir, path: SafePath<'_>, options: DirDeleteOptions) -> Result<()> {
        self.require(Permissions::DELETE, "delete_dir")?;
        let parent = self.rebind(parent, path);
        self.backend.delete_dir(parent, path.relative(), options)
    }

    fn stat(&self, parent: Dir, path: SafePath<'_>) -> Result<Stat> {
        self.require(Permissions::STAT, "stat")?;
        let parent = self.rebind(parent, path);
        self.backend.stat(parent, path.relative())
    }

    fn iterate(&self, dir: Dir) -> Result<DirIterator> {
        self.require(Permissions::ITERATE, "iterate")?;
        let resolved = if dir.is_root() { self.logical_root() } else { dir };
        let iter = self.backend.iterate(resolved)?;
        // Rebundle under the caller's handle so walker descent composes.
        Ok(DirIterator::new(dir, iter.into_state()))
    }

    fn open_file(&self, parent: Dir, path: SafePath<'_>, options: FileOpenOptions) -> Result<File> {
        if options.create {
            self.require(Permissions::CREATE, "open_file")?;
        }
        if options.mode.is_readable() {
            self.require(Permissions::READ, "open_file")?;
        }
        if options.mode.is_writable() {
            self.require(Permissions::WRITE, "open_file")?;
        }
        let parent = self.rebind(parent, path);
        self.backend.open_file(parent, path.relative(), options)
    }

    fn close_file(&self, file: File) {
        self.backend.close_file(file);
    }

    fn delete_file(&self, parent: Dir, path: SafePath<'_>) -> Result<()> {
        self.require(Permissions::DELETE, "delete_file")?;
        let parent = self.rebind(parent, path);
        self.backend.delete_file(parent, path.relative())
    }

    fn seek(&self, file: File, offset: u64, whence: Whence) -> Result<u64> {
        self.require(Permissions::STAT, "seek")?;
        self.backend.seek(file, offset, whence)
    }

    fn readv(&self, file: File, bufs: &mut [&mut [u8]]) -> Result<usize> {
        self.require(Permissions::READ, "readv")?;
        self.backend.readv(file, bufs)
    }

    fn preadv(&self, file: File, bufs: &mut [&mut [u8]], offset: u64) -> Result<usize> {
        self.require(Permissions::READ, "preadv")?;
        self.backend.preadv(file, bufs, offset)
    }

    fn writev(&self, file: File, bufs: &[&[u8]]) -> Result<usize> {
        self.require(Permissions::WRITE, "writev")?;
        self.backend.writev(file, bufs)
    }

    fn pwritev(&self, file: File, bufs: &[&[u8]], offset: u64) -> Result<usize> {
        self.require(Permissions::WRITE, "pwritev")?;
        self.backend.pwritev(file, bufs, offset)
    }

    fn chroot(&self, dir: Dir, subpath: SafePath<'_>) -> Result<()> {
        let previous = self.logical_root();
        if subpath.is_empty() {
            self.root.store(0, Ordering::Relaxed);
            if !previous.is_root() {
                self.backend.close_dir(previous);
            }
            log::debug!("chroot reverted to backend root");
            return Ok(());
        }
        let parent = if subpath.is_absolute() || dir.is_root() {
            previous
        } else {
            dir
        };
        let new_root =
            self.backend
                .open_dir(parent, subpath.relative(), DirOpenOptions::ITERATE)?;
        self.root.store(new_root.as_raw(), Ordering::Relaxed);
        if !previous.is_root() {
            self.backend.close_dir(previous);
        }
        log::debug!("chroot installed under {subpath}");
        Ok(())
    }
}

impl<B: Backend> Drop for Vfs<B> {
    fn drop(&mut self) {
        let root = self.logical_root();
        if !root.is_root() {
            self.backend.close_dir(root);
        }
    }
}
