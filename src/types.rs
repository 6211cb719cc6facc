//! # Core Types
//!
//! Handle, metadata, and option types shared by every backend.
//!
//! ## Quick Reference
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Dir`] / [`File`] | 32-bit opaque handles; [`Dir::ROOT`] is the reserved sentinel |
//! | [`Kind`] | Directory or file |
//! | [`Stat`] | Kind, size, and nanosecond timestamps |
//! | [`Permissions`] | Packed capability flags gating operations at the facade |
//! | [`DirOpenOptions`] / [`DirDeleteOptions`] | Directory open/delete knobs |
//! | [`FileOpenOptions`] / [`FileMode`] | File open mode and creation |
//! | [`Whence`] | Seek origin |
//! | [`DirEntry`] | One `{basename, stat}` pair from iteration |

/// An opaque directory handle.
///
/// The reserved value [`Dir::ROOT`] denotes the VFS's current logical root
/// (it is not a physical directory). All other values are backend-private:
/// a table key in the passthrough and overlay backends, a bit-packed
/// tag+inner pair in the multiplexer, a bit-packed kind+index+generation
/// triple in the archive.
///
/// Handles stay comparable by integer equality; [`Dir::as_raw`] exists for
/// backend authors and for tests, not for interpreting the bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dir(u32);

impl Dir {
    /// The root sentinel: "this VFS's current logical root".
    pub const ROOT: Dir = Dir(0);

    /// Wrap a raw backend-chosen value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Dir(raw)
    }

    /// The raw value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// `true` for the root sentinel.
    #[inline]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

/// An opaque file handle.
///
/// Backend-private; unlike [`Dir`] there is no reserved value. Each open
/// file carries its own cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct File(u32);

impl File {
    /// Wrap a raw backend-chosen value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        File(raw)
    }

    /// The raw value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

/// The kind of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kind {
    /// A directory.
    Dir,
    /// A regular file.
    File,
}

/// Metadata for a directory or file.
///
/// Sizes are undefined for directories; implementations report 0. Times are
/// signed nanoseconds since the Unix epoch, 0 when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stat {
    /// Directory or file.
    pub kind: Kind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Modification time, nanoseconds since the epoch.
    pub mtime: i128,
    /// Change time, nanoseconds since the epoch.
    pub ctime: i128,
}

impl Stat {
    /// `true` if this is a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == Kind::Dir
    }

    /// `true` if this is a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == Kind::File
    }
}

bitflags::bitflags! {
    /// Packed capability flags.
    ///
    /// Each flag gates a class of operations at the [`Fs`](crate::Fs)
    /// facade; a failed check returns
    /// [`Error::PermissionDenied`](crate::Error::PermissionDenied) without
    /// consulting the backend.
    ///
    /// | Flag | Gates |
    /// |------|-------|
    /// | `CREATE` | `open_dir`/`open_file` with the `create` option set |
    /// | `DELETE` | `delete_dir`, `delete_file` |
    /// | `READ` | `open_file` readable modes, `readv`, `preadv` |
    /// | `WRITE` | `open_file` writable modes, `writev`, `pwritev` |
    /// | `ITERATE` | `iterate` |
    /// | `STAT` | `stat`, `seek` (`Whence::FromEnd` needs a size query) |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        /// Permit creating directories and files.
        const CREATE = 1 << 0;
        /// Permit deleting directories and files.
        const DELETE = 1 << 1;
        /// Permit reading file contents.
        const READ = 1 << 2;
        /// Permit writing file contents.
        const WRITE = 1 << 3;
        /// Permit directory iteration.
        const ITERATE = 1 << 4;
        /// Permit stat queries (and seeking).
        const STAT = 1 << 5;
    }
}

impl Permissions {
    /// Read-only access: `READ | ITERATE | STAT`.
    pub const READ_ONLY: Permissions = Permissions::READ
        .union(Permissions::ITERATE)
        .union(Permissions::STAT);
}

/// Options for [`Fs::open_dir`](crate::Fs::open_dir).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirOpenOptions {
    /// Open the directory for iteration.
    pub iterate: bool,
    /// Create the directory (and missing parents) if absent.
    pub create: bool,
}

impl DirOpenOptions {
    /// Open for iteration, no creation.
    pub const ITERATE: Self = Self {
        iterate: true,
        create: false,
    };

    /// Create if missing, then open for iteration.
    pub const CREATE: Self = Self {
        iterate: true,
        create: true,
    };
}

/// Options for [`Fs::delete_dir`](crate::Fs::delete_dir).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirDeleteOptions {
    /// Delete the whole tree instead of requiring an empty directory.
    pub recursive: bool,
}

/// Access mode for an open file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Reads only.
    #[default]
    ReadOnly,
    /// Writes only.
    WriteOnly,
    /// Reads and writes.
    ReadWrite,
}

impl FileMode {
    /// `true` if the mode permits reading.
    #[inline]
    pub fn is_readable(self) -> bool {
        matches!(self, FileMode::ReadOnly | FileMode::ReadWrite)
    }

    /// `true` if the mode permits writing.
    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, FileMode::WriteOnly | FileMode::ReadWrite)
    }
}

/// Options for [`Fs::open_file`](crate::Fs::open_file).
///
/// `create` opens-or-creates; it never truncates an existing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileOpenOptions {
    /// Access mode.
    pub mode: FileMode,
    /// Create the file if absent.
    pub create: bool,
}

impl FileOpenOptions {
    /// Read-only access to an existing file.
    pub const READ: Self = Self {
        mode: FileMode::ReadOnly,
        create: false,
    };

    /// Write-only access, creating the file if absent.
    pub const WRITE: Self = Self {
        mode: FileMode::WriteOnly,
        create: true,
    };

    /// Read-write access to an existing file.
    pub const READ_WRITE: Self = Self {
        mode: FileMode::ReadWrite,
        create: false,
    };
}

/// Seek origin for [`Fs::seek`](crate::Fs::seek).
///
/// All cursor arithmetic saturates: `Backward` stops at 0, `FromEnd`
/// subtracts the offset from the current size, stopping at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Whence {
    /// Absolute position.
    Set,
    /// Forward from the current cursor.
    Forward,
    /// Backward from the current cursor.
    Backward,
    /// Backward from the end of the file.
    FromEnd,
}

/// One entry yielded by directory iteration.
///
/// Basenames always satisfy [`SafePath`](crate::SafePath) validation;
/// backends skip entries whose names do not.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// Name of the entry within its directory.
    pub basename: String,
    /// Metadata of the entry.
    pub stat: Stat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_sentinel_is_zero() {
        assert_eq!(Dir::ROOT.as_raw(), 0);
        assert!(Dir::ROOT.is_root());
        assert!(!Dir::from_raw(7).is_root());
    }

    #[test]
    fn handle_round_trip() {
        assert_eq!(Dir::from_raw(42).as_raw(), 42);
        assert_eq!(File::from_raw(42), File::from_raw(42));
        assert_ne!(File::from_raw(1), File::from_raw(2));
    }

    #[test]
    fn file_mode_capabilities() {
        assert!(FileMode::ReadOnly.is_readable());
        assert!(!FileMode::ReadOnly.is_writable());
        assert!(FileMode::WriteOnly.is_writable());
        assert!(!FileMode::WriteOnly.is_readable());
        assert!(FileMode::ReadWrite.is_readable());
        assert!(FileMode::ReadWrite.is_writable());
    }

    #[test]
    fn open_option_constants() {
        assert!(FileOpenOptions::READ.mode.is_readable());
        assert!(!FileOpenOptions::READ.create);
        assert!(FileOpenOptions::WRITE.create);
        assert!(DirOpenOptions::ITERATE.iterate);
        assert!(!DirOpenOptions::ITERATE.create);
    }

    #[test]
    fn read_only_permission_set() {
        let p = Permissions::READ_ONLY;
        assert!(p.contains(Permissions::READ));
        assert!(p.contains(Permissions::STAT));
        assert!(!p.contains(Permissions::WRITE));
        assert!(!p.contains(Permissions::CREATE));
    }

    #[test]
    fn stat_kind_helpers() {
        let s = Stat {
            kind: Kind::Dir,
            size: 0,
            mtime: 0,
            ctime: 0,
        };
        assert!(s.is_dir());
        assert!(!s.is_file());
    }
}
