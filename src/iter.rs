//! Directory iteration state.

use crate::error::Result;
use crate::types::{Dir, DirEntry};

/// Backend-private iteration state.
///
/// Produced by [`Backend::iterate`](crate::Backend::iterate) and carried by
/// [`DirIterator`]. Dropping the state releases backend resources but never
/// closes the underlying [`Dir`] — the walker relies on that separation to
/// close only the directories it opened itself.
pub trait IterState: Send {
    /// The next `{basename, stat}` entry, or `None` at the end.
    fn next(&mut self) -> Result<Option<DirEntry>>;

    /// Reposition to the beginning; the state stays valid.
    ///
    /// Entry order is backend-defined but stable across `reset` within one
    /// iterator lifetime.
    fn reset(&mut self) -> Result<()>;
}

/// An iterator over the entries of one open directory.
///
/// Bundles the [`Dir`] being iterated with the backend's private state.
/// Every basename it yields satisfies [`SafePath`](crate::SafePath)
/// validation. Dropping the iterator releases the state without closing
/// the directory.
///
/// `DirIterator` also implements [`Iterator`], yielding
/// `Result<DirEntry>`:
///
/// ```rust,no_run
/// use harha::{Dir, Fs, PassthroughFs, Permissions, Vfs};
///
/// # fn demo() -> harha::Result<()> {
/// let vfs = Vfs::new(PassthroughFs::open("/tmp")?, Permissions::all());
/// for entry in vfs.iterate(Dir::ROOT)? {
///     println!("{}", entry?.basename);
/// }
/// # Ok(())
/// # }
/// ```
pub struct DirIterator {
    dir: Dir,
    state: Box<dyn IterState>,
}

impl DirIterator {
    /// Bundle backend state with the directory it iterates.
    pub fn new(dir: Dir, state: Box<dyn IterState>) -> Self {
        DirIterator { dir, state }
    }

    /// The directory this iterator reads.
    #[inline]
    pub fn dir(&self) -> Dir {
        self.dir
    }

    /// The next entry, or `None` at the end.
    pub fn next_entry(&mut self) -> Result<Option<DirEntry>> {
        self.state.next()
    }

    /// Reposition to the beginning.
    pub fn reset(&mut self) -> Result<()> {
        self.state.reset()
    }

    /// Unwrap the backend state, e.g. to re-bundle it under a re-encoded
    /// handle in a composing backend.
    pub fn into_state(self) -> Box<dyn IterState> {
        self.state
    }
}

impl Iterator for DirIterator {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Kind, Stat};

    struct Fixed {
        entries: Vec<DirEntry>,
        pos: usize,
    }

    impl IterState for Fixed {
        fn next(&mut self) -> Result<Option<DirEntry>> {
            let entry = self.entries.get(self.pos).cloned();
            self.pos += entry.is_some() as usize;
            Ok(entry)
        }

        fn reset(&mut self) -> Result<()> {
            self.pos = 0;
            Ok(())
        }
    }

    fn entry(name: &str) -> DirEntry {
        DirEntry {
            basename: name.to_string(),
            stat: Stat {
                kind: Kind::File,
                size: 0,
                mtime: 0,
                ctime: 0,
            },
        }
    }

    #[test]
    fn yields_entries_then_none() {
        let mut it = DirIterator::new(
            Dir::ROOT,
            Box::new(Fixed {
                entries: vec![entry("a"), entry("b")],
                pos: 0,
            }),
        );
        assert_eq!(it.next_entry().unwrap().unwrap().basename, "a");
        assert_eq!(it.next_entry().unwrap().unwrap().basename, "b");
        assert!(it.next_entry().unwrap().is_none());
    }

    #[test]
    fn reset_replays_the_same_sequence() {
        let mut it = DirIterator::new(
            Dir::ROOT,
            Box::new(Fixed {
                entries: vec![entry("a"), entry("b")],
                pos: 0,
            }),
        );
        let first: Vec<_> = it.by_ref().map(|e| e.unwrap().basename).collect();
        it.reset().unwrap();
        let second: Vec<_> = it.map(|e| e.unwrap().basename).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn iterator_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DirIterator>();
    }
}
