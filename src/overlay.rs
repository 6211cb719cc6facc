//! # Overlay Backend
//!
//! Routes operations to child filesystems by longest-prefix mount match.
//!
//! ## Overview
//!
//! [`OverlayFs`] holds an ordered mount table from absolute mount-point
//! paths to child filesystems. Lookup scans the table in **reverse
//! insertion order** and takes the first mount point that prefixes the
//! requested path on a segment boundary — so a later mount at `/a/b`
//! shadows an earlier one at `/a` for everything below `/a/b`.
//!
//! Every open handle stores the child it came from together with the full
//! composed path, so a path opened relative to an existing handle re-routes
//! from scratch and nested mounts keep winning. Unmounting closes every
//! live handle attributed to the unmounted child; nothing else ever closes
//! those dangling child handles.
//!
//! Directories that exist only as prefixes of mount points (synthetic
//! ancestors) cannot be stat'ed or iterated; iterating the overlay root
//! works only through a mount at `/`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use harha::{Dir, Fs, FsExt, OverlayFs, PassthroughFs, Permissions, SafePath, Vfs};
//!
//! # fn demo() -> harha::Result<()> {
//! let data: Arc<dyn Fs> =
//!     Arc::new(Vfs::new(PassthroughFs::open("/srv/data")?, Permissions::all()));
//! let logs: Arc<dyn Fs> =
//!     Arc::new(Vfs::new(PassthroughFs::open("/var/log")?, Permissions::READ_ONLY));
//!
//! let overlay = OverlayFs::new();
//! overlay.mount(data, "/data")?;
//! overlay.mount(logs, "/logs")?;
//!
//! let root = Vfs::new(overlay, Permissions::all());
//! let bytes = root.read_file(Dir::ROOT, SafePath::new("/logs/syslog")?)?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::fs::Fs;
use crate::iter::{DirIterator, IterState};
use crate::path::SafePath;
use crate::types::{
    Dir, DirDeleteOptions, DirEntry, DirOpenOptions, File, FileOpenOptions, Stat, Whence,
};

struct OverlayDir {
    child: Arc<dyn Fs>,
    child_dir: Dir,
    full_path: String,
}

struct OverlayFile {
    child: Arc<dyn Fs>,
    child_file: File,
}

struct OverlayState {
    mounts: IndexMap<String, Arc<dyn Fs>>,
    dirs: IndexMap<u32, OverlayDir>,
    files: IndexMap<u32, OverlayFile>,
    next_dir: u32,
    next_file: u32,
}

/// A backend composing child filesystems under mount-point prefixes.
///
/// The overlay borrows its children (`Arc<dyn Fs>` clones); it never
/// deinitializes them. Deinitialize children only after the overlay.
pub struct OverlayFs {
    state: RwLock<OverlayState>,
}

impl OverlayFs {
    /// An overlay with no mounts.
    pub fn new() -> Self {
        OverlayFs {
            state: RwLock::new(OverlayState {
                mounts: IndexMap::new(),
                dirs: IndexMap::new(),
                files: IndexMap::new(),
                next_dir: 1,
                next_file: 0,
            }),
        }
    }

    /// Mount `fs` at the absolute path `mount_path`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPath`] when `mount_path` is empty or relative,
    /// - [`Error::PathAlreadyExists`] when the path is already a mount
    ///   point, or when `fs` is already mounted elsewhere — without one
    ///   mount per child the overlay could not attribute handles back to a
    ///   mount for cleanup.
    pub fn mount(&self, fs: Arc<dyn Fs>, mount_path: &str) -> Result<()> {
        let path = SafePath::new(mount_path)?;
        if !path.is_absolute() {
            return Err(Error::InvalidPath {
                reason: "mount point must be absolute",
            });
        }
        let mut state = self.state.write().unwrap();
        if state.mounts.contains_key(mount_path) {
            return Err(Error::PathAlreadyExists);
        }
        if state
            .mounts
            .values()
            .any(|m| std::ptr::addr_eq(Arc::as_ptr(m), Arc::as_ptr(&fs)))
        {
            return Err(Error::PathAlreadyExists);
        }
        log::debug!("mounting child at {mount_path}");
        state.mounts.insert(mount_path.to_string(), fs);
        Ok(())
    }

    /// Remove the mount at `mount_path`, closing every live handle that
    /// routes to the unmounted child.
    pub fn unmount(&self, mount_path: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let child = state
            .mounts
            .shift_remove(mount_path)
            .ok_or(Error::FileNotFound)?;
        log::debug!("unmounting child at {mount_path}");
        let same = |fs: &Arc<dyn Fs>| std::ptr::addr_eq(Arc::as_ptr(fs), Arc::as_ptr(&child));

        let dir_ids: Vec<u32> = state
            .dirs
            .iter()
            .rev()
            .filter(|(_, d)| same(&d.child))
            .map(|(id, _)| *id)
            .collect();
        for id in dir_ids {
            if let Some(d) = state.dirs.shift_remove(&id) {
                d.child.close_dir(d.child_dir);
            }
        }

        let file_ids: Vec<u32> = state
            .files
            .iter()
            .rev()
            .filter(|(_, f)| same(&f.child))
            .map(|(id, _)| *id)
            .collect();
        for id in file_ids {
            if let Some(f) = state.files.shift_remove(&id) {
                f.child.close_file(f.child_file);
            }
        }
        Ok(())
    }

    /// Full path of `parent` plus `sub` under it.
    fn compose(&self, parent: Dir, sub: SafePath<'_>) -> Result<String> {
        let state = self.state.read().unwrap();
        let base = if parent.is_root() {
            ""
        } else {
            state
                .dirs
                .get(&parent.as_raw())
                .map(|d| d.full_path.as_str())
                .ok_or(Error::FileNotFound)?
        };
        Ok(compose(base, sub.as_str()))
    }

    /// Route `full` to the most recently mounted child whose mount point
    /// prefixes it.
    fn route(&self, full: &str) -> Result<(Arc<dyn Fs>, String)> {
        let state = self.state.read().unwrap();
        for (mount_path, fs) in state.mounts.iter().rev() {
            if let Some(rest) = match_mount(mount_path, full) {
                return Ok((fs.clone(), rest.to_string()));
            }
        }
        Err(Error::FileNotFound)
    }

    fn resolve(&self, parent: Dir, sub: SafePath<'_>) -> Result<(Arc<dyn Fs>, String, String)> {
        let full = self.compose(parent, sub)?;
        let (child, rest) = self.route(&full)?;
        Ok((child, rest, full))
    }

    fn alloc_dir_id(state: &mut OverlayState) -> u32 {
        let id = state.next_dir;
        state.next_dir = state.next_dir.wrapping_add(1);
        if state.next_dir == 0 {
            state.next_dir = 1;
        }
        id
    }

    fn alloc_file_id(state: &mut OverlayState) -> u32 {
        let id = state.next_file;
        state.next_file = state.next_file.wrapping_add(1);
        id
    }

    fn lookup_file(&self, file: File) -> Option<(Arc<dyn Fs>, File)> {
        let state = self.state.read().unwrap();
        state
            .files
            .get(&file.as_raw())
            .map(|f| (f.child.clone(), f.child_file))
    }
}

impl Default for OverlayFs {
    fn default() -> Self {
        Self::new()
    }
}

fn compose(base: &str, sub: &str) -> String {
    if sub.is_empty() {
        return base.to_string();
    }
    let mut out = String::with_capacity(base.len() + 1 + sub.len());
    out.push_str(base);
    out.push('/');
    out.push_str(sub);
    out
}

/// The child sub-path when `mount_path` prefixes `path` on a segment
/// boundary, `None` otherwise.
fn match_mount<'p>(mount_path: &str, path: &'p str) -> Option<&'p str> {
    if mount_path == "/" {
        return path.strip_prefix('/');
    }
    let rest = path.strip_prefix(mount_path)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

impl Backend for OverlayFs {
    fn open_dir(&self, parent: Dir, path: SafePath<'_>, options: DirOpenOptions) -> Result<Dir> {
        let (child, rest, full) = self.resolve(parent, path)?;
        let child_dir = child.open_dir(Dir::ROOT, SafePath::new_unchecked(&rest), options)?;
        let mut state = self.state.write().unwrap();
        let id = Self::alloc_dir_id(&mut state);
        state.dirs.insert(
            id,
            OverlayDir {
                child,
                child_dir,
                full_path: full,
            },
        );
        Ok(Dir::from_raw(id))
    }

    fn close_dir(&self, dir: Dir) {
        if dir.is_root() {
            return;
        }
        let removed = self.state.write().unwrap().dirs.shift_remove(&dir.as_raw());
        if let Some(d) = removed {
            d.child.close_dir(d.child_dir);
        }
    }

    fn delete_dir(&self, parent: Dir, path: SafePath<'_>, options: DirDeleteOptions) -> Result<()> {
        let (child, rest, _) = self.resolve(parent, path)?;
        child.delete_dir(Dir::ROOT, SafePath::new_unchecked(&rest), options)
    }

    fn stat(&self, parent: Dir, path: SafePath<'_>) -> Result<Stat> {
        let (child, rest, _) = self.resolve(parent, path)?;
        child.stat(Dir::ROOT, SafePath::new_unchecked(&rest))
    }

    fn iterate(&self, dir: Dir) -> Result<DirIterator> {
        let (child, child_dir) = if dir.is_root() {
            // Only a mount at "/" can serve the overlay root; synthetic
            // mount-point ancestors have no listing.
            match self.route("/") {
                Ok((child, _)) => (child, Dir::ROOT),
                Err(_) => {
                    return Err(Error::Unsupported {
                        operation: "iterate",
                    });
                }
            }
        } else {
            let state = self.state.read().unwrap();
            let d = state.dirs.get(&dir.as_raw()).ok_or(Error::FileNotFound)?;
            (d.child.clone(), d.child_dir)
        };
        let inner = child.iterate(child_dir)?;
        Ok(DirIterator::new(
            dir,
            Box::new(ChildIter {
                state: inner.into_state(),
                _child: child,
            }),
        ))
    }

    fn open_file(&self, parent: Dir, path: SafePath<'_>, options: FileOpenOptions) -> Result<File> {
        let (child, rest, _) = self.resolve(parent, path)?;
        let child_file = child.open_file(Dir::ROOT, SafePath::new_unchecked(&rest), options)?;
        let mut state = self.state.write().unwrap();
        let id = Self::alloc_file_id(&mut state);
        state.files.insert(id, OverlayFile { child, child_file });
        Ok(File::from_raw(id))
    }

    fn close_file(&self, file: File) {
        let removed = self
            .state
            .write()
            .unwrap()
            .files
            .shift_remove(&file.as_raw());
        if let Some(f) = removed {
            f.child.close_file(f.child_file);
        }
    }

    fn delete_file(&self, parent: Dir, path: SafePath<'_>) -> Result<()> {
        let (child, rest, _) = self.resolve(parent, path)?;
        child.delete_file(Dir::ROOT, SafePath::new_unchecked(&rest))
    }

    fn seek(&self, file: File, offset: u64, whence: Whence) -> Result<u64> {
        let (child, child_file) = self.lookup_file(file).ok_or(Error::Unseekable)?;
        child.seek(child_file, offset, whence)
    }

    fn readv(&self, file: File, bufs: &mut [&mut [u8]]) -> Result<usize> {
        let (child, child_file) = self.lookup_file(file).ok_or(Error::NotOpenForReading)?;
        child.readv(child_file, bufs)
    }

    fn preadv(&self, file: File, bufs: &mut [&mut [u8]], offset: u64) -> Result<usize> {
        let (child, child_file) = self.lookup_file(file).ok_or(Error::NotOpenForReading)?;
        child.preadv(child_file, bufs, offset)
    }

    fn writev(&self, file: File, bufs: &[&[u8]]) -> Result<usize> {
        let (child, child_file) = self.lookup_file(file).ok_or(Error::NotOpenForWriting)?;
        child.writev(child_file, bufs)
    }

    fn pwritev(&self, file: File, bufs: &[&[u8]], offset: u64) -> Result<usize> {
        let (child, child_file) = self.lookup_file(file).ok_or(Error::NotOpenForWriting)?;
        child.pwritev(child_file, bufs, offset)
    }
}

impl Drop for OverlayFs {
    fn drop(&mut self) {
        // Close in reverse insertion order, newest handles first.
        let state = self.state.get_mut().unwrap();
        while let Some((_, d)) = state.dirs.pop() {
            d.child.close_dir(d.child_dir);
        }
        while let Some((_, f)) = state.files.pop() {
            f.child.close_file(f.child_file);
        }
    }
}

/// Keeps the child alive for as long as its iteration state is.
struct ChildIter {
    state: Box<dyn IterState>,
    _child: Arc<dyn Fs>,
}

impl IterState for ChildIter {
    fn next(&mut self) -> Result<Option<DirEntry>> {
        self.state.next()
    }

    fn reset(&mut self) -> Result<()> {
        self.state.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Vfs;
    use crate::types::Permissions;

    #[test]
    fn match_mount_requires_segment_boundary() {
        assert_eq!(match_mount("/a", "/a/b/c"), Some("b/c"));
        assert_eq!(match_mount("/a", "/a"), Some(""));
        assert_eq!(match_mount("/a", "/ab/c"), None);
        assert_eq!(match_mount("/a/b", "/a/b/x"), Some("x"));
        assert_eq!(match_mount("/", "/x"), Some("x"));
        assert_eq!(match_mount("/", "/"), Some(""));
    }

    struct Stub;

    impl crate::backend::Backend for Stub {}

    fn stub() -> Arc<dyn Fs> {
        Arc::new(Vfs::new(Stub, Permissions::all()))
    }

    #[test]
    fn mount_rejects_relative_and_empty_paths() {
        let overlay = OverlayFs::new();
        assert!(matches!(
            overlay.mount(stub(), "relative"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            overlay.mount(stub(), ""),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn mount_rejects_duplicate_mount_point_and_child() {
        let overlay = OverlayFs::new();
        let child = stub();
        overlay.mount(child.clone(), "/a").unwrap();
        assert!(matches!(
            overlay.mount(stub(), "/a"),
            Err(Error::PathAlreadyExists)
        ));
        assert!(matches!(
            overlay.mount(child, "/b"),
            Err(Error::PathAlreadyExists)
        ));
    }

    #[test]
    fn unmount_unknown_path_fails() {
        let overlay = OverlayFs::new();
        assert!(matches!(overlay.unmount("/nope"), Err(Error::FileNotFound)));
    }

    #[test]
    fn routing_prefers_later_mounts() {
        let overlay = OverlayFs::new();
        overlay.mount(stub(), "/a").unwrap();
        let nested = stub();
        overlay.mount(nested.clone(), "/a/b").unwrap();
        let (child, rest) = overlay.route("/a/b/x").unwrap();
        assert!(std::ptr::addr_eq(Arc::as_ptr(&child), Arc::as_ptr(&nested)));
        assert_eq!(rest, "x");
    }

    #[test]
    fn lookups_outside_any_mount_fail() {
        let overlay = OverlayFs::new();
        overlay.mount(stub(), "/a").unwrap();
        assert!(matches!(
            overlay.stat(Dir::ROOT, SafePath::new("elsewhere").unwrap()),
            Err(Error::FileNotFound)
        ));
    }
}
