//! # Multiplexer Backend
//!
//! A fixed set of child filesystems sharing one 32-bit handle space.
//!
//! ## Overview
//!
//! [`MuxFs`] is parameterized by a [`MountTag`] type — typically a small
//! enum — whose values index a fixed array of mount slots. Instead of a
//! handle table, the mount tag is bit-packed into every handle next to the
//! child's own handle:
//!
//! ```text
//! [ InnerBits: inner handle | IndexBits: mount tag ]   (tag in the low bits)
//! ```
//!
//! with `IndexBits = ceil(log2(COUNT + 1))` and `InnerBits = 32 -
//! IndexBits`. Handle 0 therefore decodes to `{tag 0, inner 0}` — the root
//! of the first mount — and [`MuxFs::root_dir`]`(tag)` is just the tag
//! value itself. No method allocates on the heap.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use harha::{FsExt, MountTag, MuxFs, PassthroughFs, Permissions, SafePath, Vfs};
//!
//! #[derive(Clone, Copy)]
//! enum Slot {
//!     Data,
//!     Cache,
//! }
//!
//! impl MountTag for Slot {
//!     const COUNT: u32 = 2;
//!     fn index(self) -> u32 {
//!         self as u32
//!     }
//! }
//!
//! # fn demo() -> harha::Result<()> {
//! let mux = MuxFs::<Slot>::new();
//! mux.mount(
//!     Slot::Data,
//!     Arc::new(Vfs::new(PassthroughFs::open("/srv/data")?, Permissions::all())),
//! )?;
//!
//! let vfs = Vfs::new(mux, Permissions::all());
//! let data_root = MuxFs::<Slot>::root_dir(Slot::Data);
//! let bytes = vfs.read_file(data_root, SafePath::new("config.toml")?)?;
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::fs::Fs;
use crate::iter::DirIterator;
use crate::path::SafePath;
use crate::types::{
    Dir, DirDeleteOptions, DirOpenOptions, File, FileOpenOptions, Stat, Whence,
};

/// A type whose values name the mount slots of a [`MuxFs`].
///
/// Implementations must map their values onto the contiguous range
/// `0..COUNT`; [`MuxFs`] asserts this when a tag is used. A fieldless enum
/// with `COUNT` variants and `self as u32` is the intended shape.
pub trait MountTag: Copy {
    /// Number of mount slots.
    const COUNT: u32;

    /// The slot this value names; must be below [`COUNT`](MountTag::COUNT).
    fn index(self) -> u32;
}

/// A backend multiplexing a fixed set of children by bit-packed mount tag.
///
/// Like the overlay, the multiplexer borrows its children; deinitialize
/// them only after it.
pub struct MuxFs<T: MountTag> {
    slots: RwLock<Vec<Option<Arc<dyn Fs>>>>,
    _tag: PhantomData<fn(T)>,
}

impl<T: MountTag> MuxFs<T> {
    /// Bits holding the mount tag (low end of the handle).
    const INDEX_BITS: u32 = 32 - T::COUNT.leading_zeros();
    /// Bits left for the child's own handle.
    const INNER_BITS: u32 = 32 - Self::INDEX_BITS;
    const TAG_MASK: u32 = (1 << Self::INDEX_BITS) - 1;

    /// A multiplexer with every slot empty.
    pub fn new() -> Self {
        assert!(T::COUNT > 0, "mount tag type must have at least one value");
        assert!(
            Self::INNER_BITS >= 1,
            "mount tag type leaves no room for inner handles"
        );
        MuxFs {
            slots: RwLock::new(vec![None; T::COUNT as usize]),
            _tag: PhantomData,
        }
    }

    /// Mount `fs` in the slot named by `tag`.
    ///
    /// # Errors
    ///
    /// [`Error::PathAlreadyExists`] when the slot is occupied.
    pub fn mount(&self, tag: T, fs: Arc<dyn Fs>) -> Result<()> {
        let slot = Self::slot(tag);
        let mut slots = self.slots.write().unwrap();
        if slots[slot].is_some() {
            return Err(Error::PathAlreadyExists);
        }
        log::debug!("mounting child in mux slot {slot}");
        slots[slot] = Some(fs);
        Ok(())
    }

    /// Empty the slot named by `tag`.
    ///
    /// # Errors
    ///
    /// [`Error::FileNotFound`] when the slot is already empty.
    pub fn unmount(&self, tag: T) -> Result<()> {
        let slot = Self::slot(tag);
        self.slots.write().unwrap()[slot]
            .take()
            .map(|_| log::debug!("unmounting child from mux slot {slot}"))
            .ok_or(Error::FileNotFound)
    }

    /// The root directory of the mount named by `tag`.
    ///
    /// Encodes `{tag, inner 0}`, so the raw value equals the tag index.
    pub fn root_dir(tag: T) -> Dir {
        Dir::from_raw(Self::encode(Self::slot(tag) as u32, 0))
    }

    fn slot(tag: T) -> usize {
        let index = tag.index();
        assert!(
            index < T::COUNT,
            "mount tag index {index} outside 0..{}",
            T::COUNT
        );
        index as usize
    }

    fn encode(tag: u32, inner: u32) -> u32 {
        debug_assert!(
            inner >> Self::INNER_BITS == 0,
            "inner handle overflows {} bits",
            Self::INNER_BITS
        );
        tag | (inner << Self::INDEX_BITS)
    }

    fn decode(raw: u32) -> (u32, u32) {
        (raw & Self::TAG_MASK, raw >> Self::INDEX_BITS)
    }

    fn child(&self, tag: u32) -> Option<Arc<dyn Fs>> {
        if tag >= T::COUNT {
            return None;
        }
        self.slots.read().unwrap()[tag as usize].clone()
    }
}

impl<T: MountTag> Default for MuxFs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MountTag> Backend for MuxFs<T> {
    fn open_dir(&self, parent: Dir, path: SafePath<'_>, options: DirOpenOptions) -> Result<Dir> {
        let (tag, inner) = Self::decode(parent.as_raw());
        let child = self.child(tag).ok_or(Error::FileNotFound)?;
        let dir = child.open_dir(Dir::from_raw(inner), path, options)?;
        Ok(Dir::from_raw(Self::encode(tag, dir.as_raw())))
    }

    fn close_dir(&self, dir: Dir) {
        let (tag, inner) = Self::decode(dir.as_raw());
        if let Some(child) = self.child(tag) {
            child.close_dir(Dir::from_raw(inner));
        }
    }

    fn delete_dir(&self, parent: Dir, path: SafePath<'_>, options: DirDeleteOptions) -> Result<()> {
        let (tag, inner) = Self::decode(parent.as_raw());
        let child = self.child(tag).ok_or(Error::FileNotFound)?;
        child.delete_dir(Dir::from_raw(inner), path, options)
    }

    fn stat(&self, parent: Dir, path: SafePath<'_>) -> Result<Stat> {
        let (tag, inner) = Self::decode(parent.as_raw());
        let child = self.child(tag).ok_or(Error::FileNotFound)?;
        child.stat(Dir::from_raw(inner), path)
    }

    fn iterate(&self, dir: Dir) -> Result<DirIterator> {
        let (tag, inner) = Self::decode(dir.as_raw());
        let child = self.child(tag).ok_or(Error::NotOpenForIteration)?;
        // Inner 0 is the child's own root sentinel, so a chrooted child
        // resolves it to its logical root by itself.
        let iter = child.iterate(Dir::from_raw(inner))?;
        Ok(DirIterator::new(dir, iter.into_state()))
    }

    fn open_file(&self, parent: Dir, path: SafePath<'_>, options: FileOpenOptions) -> Result<File> {
        let (tag, inner) = Self::decode(parent.as_raw());
        let child = self.child(tag).ok_or(Error::FileNotFound)?;
        let file = child.open_file(Dir::from_raw(inner), path, options)?;
        Ok(File::from_raw(Self::encode(tag, file.as_raw())))
    }

    fn close_file(&self, file: File) {
        let (tag, inner) = Self::decode(file.as_raw());
        if let Some(child) = self.child(tag) {
            child.close_file(File::from_raw(inner));
        }
    }

    fn delete_file(&self, parent: Dir, path: SafePath<'_>) -> Result<()> {
        let (tag, inner) = Self::decode(parent.as_raw());
        let child = self.child(tag).ok_or(Error::FileNotFound)?;
        child.delete_file(Dir::from_raw(inner), path)
    }

    fn seek(&self, file: File, offset: u64, whence: Whence) -> Result<u64> {
        let (tag, inner) = Self::decode(file.as_raw());
        let child = self.child(tag).ok_or(Error::Unseekable)?;
        child.seek(File::from_raw(inner), offset, whence)
    }

    fn readv(&self, file: File, bufs: &mut [&mut [u8]]) -> Result<usize> {
        let (tag, inner) = Self::decode(file.as_raw());
        let child = self.child(tag).ok_or(Error::NotOpenForReading)?;
        child.readv(File::from_raw(inner), bufs)
    }

    fn preadv(&self, file: File, bufs: &mut [&mut [u8]], offset: u64) -> Result<usize> {
        let (tag, inner) = Self::decode(file.as_raw());
        let child = self.child(tag).ok_or(Error::NotOpenForReading)?;
        child.preadv(File::from_raw(inner), bufs, offset)
    }

    fn writev(&self, file: File, bufs: &[&[u8]]) -> Result<usize> {
        let (tag, inner) = Self::decode(file.as_raw());
        let child = self.child(tag).ok_or(Error::NotOpenForWriting)?;
        child.writev(File::from_raw(inner), bufs)
    }

    fn pwritev(&self, file: File, bufs: &[&[u8]], offset: u64) -> Result<usize> {
        let (tag, inner) = Self::decode(file.as_raw());
        let child = self.child(tag).ok_or(Error::NotOpenForWriting)?;
        child.pwritev(File::from_raw(inner), bufs, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    enum Slot {
        Data,
        Cache,
        Temp,
    }

    impl MountTag for Slot {
        const COUNT: u32 = 3;

        fn index(self) -> u32 {
            self as u32
        }
    }

    type Mux = MuxFs<Slot>;

    #[test]
    fn bit_widths_follow_the_count() {
        // ceil(log2(3 + 1)) = 2 tag bits, 30 inner bits.
        assert_eq!(Mux::INDEX_BITS, 2);
        assert_eq!(Mux::INNER_BITS, 30);
    }

    #[test]
    fn encode_decode_round_trips() {
        for tag in 0..Slot::COUNT {
            for inner in [0u32, 1, 17, (1 << 30) - 1] {
                let raw = Mux::encode(tag, inner);
                assert_eq!(Mux::decode(raw), (tag, inner));
            }
        }
    }

    #[test]
    fn root_dir_raw_value_is_the_tag() {
        assert_eq!(Mux::root_dir(Slot::Data).as_raw(), 0);
        assert_eq!(Mux::root_dir(Slot::Cache).as_raw(), 1);
        assert_eq!(Mux::root_dir(Slot::Temp).as_raw(), 2);
        assert!(Mux::root_dir(Slot::Data).is_root());
    }

    #[test]
    fn operations_on_unmounted_slots_fail_per_kind() {
        let mux = Mux::new();
        let p = SafePath::new("x").unwrap();
        assert!(matches!(
            mux.open_dir(Mux::root_dir(Slot::Data), p, DirOpenOptions::default()),
            Err(Error::FileNotFound)
        ));
        assert!(matches!(
            mux.readv(File::from_raw(0), &mut []),
            Err(Error::NotOpenForReading)
        ));
        assert!(matches!(
            mux.seek(File::from_raw(0), 0, Whence::Set),
            Err(Error::Unseekable)
        ));
        assert!(matches!(
            mux.iterate(Mux::root_dir(Slot::Temp)),
            Err(Error::NotOpenForIteration)
        ));
        // Close stays silent.
        mux.close_dir(Mux::root_dir(Slot::Cache));
    }

    #[test]
    fn mount_rejects_occupied_slots() {
        struct Stub;
        impl crate::backend::Backend for Stub {}

        let mux = Mux::new();
        let child: Arc<dyn Fs> = Arc::new(crate::fs::Vfs::new(
            Stub,
            crate::types::Permissions::all(),
        ));
        mux.mount(Slot::Data, child.clone()).unwrap();
        assert!(matches!(
            mux.mount(Slot::Data, child),
            Err(Error::PathAlreadyExists)
        ));
        mux.unmount(Slot::Data).unwrap();
        assert!(matches!(mux.unmount(Slot::Data), Err(Error::FileNotFound)));
    }
}
