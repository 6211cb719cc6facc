//! # Tree Walking
//!
//! Depth-first pre-order traversal built on directory iteration.
//!
//! ## Overview
//!
//! [`Walker`] visits every entry below a starting directory, descending into
//! subdirectories automatically. [`SelectiveWalker`] never descends on its
//! own — the caller opts into each subdirectory with
//! [`enter`](SelectiveWalker::enter) and backs out with
//! [`leave`](SelectiveWalker::leave).
//!
//! Both maintain a stack of `{iterator, dirname length}` frames over a
//! reusable path buffer. Directories the walker opened itself are closed
//! when their frame pops; the caller's starting directory is never closed.
//! An iterator error pops its frame and surfaces, and the next call resumes
//! at the parent — one unreadable subtree does not end the walk.
//!
//! Entries are owned values, so the traversal composes as a plain
//! [`Iterator`]:
//!
//! ```rust,no_run
//! use harha::{Dir, FsExt, PassthroughFs, Permissions, Vfs};
//!
//! # fn demo() -> harha::Result<()> {
//! let vfs = Vfs::new(PassthroughFs::open("/srv/data")?, Permissions::READ_ONLY);
//! for entry in vfs.walk(Dir::ROOT)? {
//!     let entry = entry?;
//!     println!("{:>2} {}", entry.depth, entry.path);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::fs::Fs;
use crate::iter::DirIterator;
use crate::path::SafePath;
use crate::types::{Dir, DirOpenOptions, Stat};

/// One visited entry.
///
/// `dir` is the handle of the directory the entry was found in — the walker
/// opens subdirectories relative to it. `depth` equals the number of `/` in
/// `path` plus one.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Handle of the containing directory.
    pub dir: Dir,
    /// Name within the containing directory.
    pub basename: String,
    /// Path relative to the walk root.
    pub path: String,
    /// Metadata of the entry.
    pub stat: Stat,
    /// Nesting level below the walk root, starting at 1.
    pub depth: usize,
}

struct Frame {
    iter: DirIterator,
    /// Length of the path buffer naming this frame's directory.
    dirname_len: usize,
    /// The walker opened this directory and must close it on pop.
    owned: bool,
}

/// Shared traversal state for both walker flavors.
struct Traversal<'a> {
    fs: &'a dyn Fs,
    frames: Vec<Frame>,
    path: String,
    /// Directory entry emitted last time, to descend into on the next call.
    pending: Option<(Dir, String)>,
}

impl<'a> Traversal<'a> {
    fn start(fs: &'a dyn Fs, dir: Dir) -> Result<Self> {
        let iter = fs.iterate(dir)?;
        Ok(Traversal {
            fs,
            frames: vec![Frame {
                iter,
                dirname_len: 0,
                owned: false,
            }],
            path: String::new(),
            pending: None,
        })
    }

    fn push_subdir(&mut self, parent: Dir, name: &str, dirname_len: usize) -> Result<()> {
        let sub = SafePath::new(name)?;
        let dir = self.fs.open_dir(parent, sub, DirOpenOptions::ITERATE)?;
        match self.fs.iterate(dir) {
            Ok(iter) => {
                self.frames.push(Frame {
                    iter,
                    dirname_len,
                    owned: true,
                });
                Ok(())
            }
            Err(err) => {
                self.fs.close_dir(dir);
                Err(err)
            }
        }
    }

    fn pop_frame(&mut self) {
        if let Some(Frame { iter, owned, .. }) = self.frames.pop() {
            let dir = iter.dir();
            drop(iter);
            if owned {
                self.fs.close_dir(dir);
            }
        }
    }

    fn leave(&mut self) {
        self.pending = None;
        self.pop_frame();
    }

    fn advance(&mut self, descend: bool) -> Result<Option<WalkEntry>> {
        if descend {
            if let Some((parent, name)) = self.pending.take() {
                // Descent failure leaves the parent frame intact; the walk
                // continues beside the unreachable subtree.
                let dirname_len = self.path.len();
                self.push_subdir(parent, &name, dirname_len)?;
            }
        }
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };
            self.path.truncate(frame.dirname_len);
            match frame.iter.next_entry() {
                Ok(Some(entry)) => {
                    if !self.path.is_empty() {
                        self.path.push('/');
                    }
                    self.path.push_str(&entry.basename);
                    let parent = frame.iter.dir();
                    if descend && entry.stat.is_dir() {
                        self.pending = Some((parent, entry.basename.clone()));
                    }
                    let depth = self.path.matches('/').count() + 1;
                    return Ok(Some(WalkEntry {
                        dir: parent,
                        basename: entry.basename,
                        path: self.path.clone(),
                        stat: entry.stat,
                        depth,
                    }));
                }
                Ok(None) => self.pop_frame(),
                Err(err) => {
                    self.pop_frame();
                    return Err(err);
                }
            }
        }
    }
}

impl Drop for Traversal<'_> {
    fn drop(&mut self) {
        while !self.frames.is_empty() {
            self.pop_frame();
        }
    }
}

/// Depth-first pre-order traversal with automatic descent.
///
/// Created by [`Walker::new`] or [`FsExt::walk`](crate::FsExt::walk). See
/// the [module docs](self).
pub struct Walker<'a> {
    inner: Traversal<'a>,
}

impl<'a> Walker<'a> {
    /// Start walking below `dir` (which stays owned by the caller).
    pub fn new(fs: &'a dyn Fs, dir: Dir) -> Result<Self> {
        Ok(Walker {
            inner: Traversal::start(fs, dir)?,
        })
    }

    /// The next entry, or `None` when the walk is complete.
    ///
    /// An error pops the failing directory; calling again resumes at its
    /// parent.
    pub fn next_entry(&mut self) -> Result<Option<WalkEntry>> {
        self.inner.advance(true)
    }

    /// Abandon the directory currently being iterated, resuming at its
    /// parent. Popping the starting directory ends the walk.
    pub fn leave(&mut self) {
        self.inner.leave();
    }
}

impl Iterator for Walker<'_> {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Depth-first traversal where the caller chooses every descent.
///
/// Yields the entries of one directory at a time;
/// [`enter`](SelectiveWalker::enter) pushes a yielded subdirectory,
/// [`leave`](SelectiveWalker::leave) pops back out.
pub struct SelectiveWalker<'a> {
    inner: Traversal<'a>,
}

impl<'a> SelectiveWalker<'a> {
    /// Start walking below `dir` (which stays owned by the caller).
    pub fn new(fs: &'a dyn Fs, dir: Dir) -> Result<Self> {
        Ok(SelectiveWalker {
            inner: Traversal::start(fs, dir)?,
        })
    }

    /// The next entry of the current directory, or `None` when it (and any
    /// entered ancestors) are exhausted.
    pub fn next_entry(&mut self) -> Result<Option<WalkEntry>> {
        self.inner.advance(false)
    }

    /// Descend into a directory entry yielded by
    /// [`next_entry`](SelectiveWalker::next_entry).
    ///
    /// # Errors
    ///
    /// [`Error::NotDir`](crate::Error::NotDir) when the entry is not a
    /// directory, otherwise whatever opening it for iteration fails with.
    pub fn enter(&mut self, entry: &WalkEntry) -> Result<()> {
        if !entry.stat.is_dir() {
            return Err(crate::Error::NotDir);
        }
        self.inner.path.clear();
        self.inner.path.push_str(&entry.path);
        let dirname_len = self.inner.path.len();
        self.inner.push_subdir(entry.dir, &entry.basename, dirname_len)
    }

    /// Pop one frame, resuming iteration of the parent directory.
    pub fn leave(&mut self) {
        self.inner.leave();
    }
}

impl Iterator for SelectiveWalker<'_> {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
