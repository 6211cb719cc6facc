//! Convenience methods layered over the core [`Fs`] vocabulary.

use crate::error::{Error, Result};
use crate::fs::Fs;
use crate::path::SafePath;
use crate::types::{Dir, FileMode, FileOpenOptions};
use crate::walker::{SelectiveWalker, Walker};

/// Extension methods available on every [`Fs`].
///
/// Everything here is built from the core operations — no backend sees
/// anything new, and every call still passes the facade's capability gate.
///
/// # Example
///
/// ```rust,no_run
/// use harha::{Dir, FsExt, PassthroughFs, Permissions, SafePath, Vfs};
///
/// # fn demo() -> harha::Result<()> {
/// let vfs = Vfs::new(PassthroughFs::open("/srv/data")?, Permissions::all());
/// vfs.write_file(Dir::ROOT, SafePath::new("greeting.txt")?, b"hello")?;
/// let bytes = vfs.read_file(Dir::ROOT, SafePath::new("greeting.txt")?)?;
/// assert_eq!(bytes, b"hello");
/// # Ok(())
/// # }
/// ```
pub trait FsExt: Fs {
    /// Walk the tree below `dir` depth-first with automatic descent.
    fn walk(&self, dir: Dir) -> Result<Walker<'_>>
    where
        Self: Sized,
    {
        Walker::new(self, dir)
    }

    /// Walk below `dir` with caller-controlled descent.
    fn walk_selectively(&self, dir: Dir) -> Result<SelectiveWalker<'_>>
    where
        Self: Sized,
    {
        SelectiveWalker::new(self, dir)
    }

    /// Read the whole file at `path` under `parent`.
    fn read_file(&self, parent: Dir, path: SafePath<'_>) -> Result<Vec<u8>> {
        let file = self.open_file(parent, path, FileOpenOptions::READ)?;
        let mut out = Vec::new();
        let mut chunk = vec![0u8; 4096];
        let res = loop {
            let n = {
                let mut bufs: [&mut [u8]; 1] = [chunk.as_mut_slice()];
                match self.readv(file, &mut bufs) {
                    Ok(n) => n,
                    Err(err) => break Err(err),
                }
            };
            if n == 0 {
                break Ok(());
            }
            out.extend_from_slice(&chunk[..n]);
        };
        self.close_file(file);
        res.map(|()| out)
    }

    /// Write `data` to the file at `path` under `parent`, creating it if
    /// absent.
    fn write_file(&self, parent: Dir, path: SafePath<'_>, data: &[u8]) -> Result<()> {
        let file = self.open_file(
            parent,
            path,
            FileOpenOptions {
                mode: FileMode::WriteOnly,
                create: true,
            },
        )?;
        let mut written = 0;
        let res = loop {
            if written == data.len() {
                break Ok(());
            }
            match self.writev(file, &[&data[written..]]) {
                Ok(0) => break Err(Error::NoSpaceLeft),
                Ok(n) => written += n,
                Err(err) => break Err(err),
            }
        };
        self.close_file(file);
        res
    }
}

impl<T: Fs + ?Sized> FsExt for T {}
