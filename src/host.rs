//! Host filesystem adapter.
//!
//! The one place that talks to the OS. Every host error is translated here,
//! exactly once, into the Harha taxonomy; the errno detail the taxonomy
//! erases goes to the `log` facade instead.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use rustix::fs::{AtFlags, FileType, Mode, OFlags};
use rustix::io::Errno;

use crate::error::{Error, Result};
use crate::types::{FileMode, Kind, Stat};

/// Iovecs are handed to the host in groups of at most this many.
pub(crate) const IOV_BATCH: usize = 16;

const NANOS_PER_SEC: i128 = 1_000_000_000;

fn map_errno(operation: &'static str, errno: Errno) -> Error {
    if errno == Errno::NOENT {
        Error::FileNotFound
    } else if errno == Errno::NOTDIR {
        Error::NotDir
    } else if errno == Errno::ISDIR {
        Error::IsDir
    } else if errno == Errno::EXIST {
        Error::PathAlreadyExists
    } else if errno == Errno::NOTEMPTY {
        Error::DirNotEmpty
    } else if errno == Errno::ACCESS || errno == Errno::PERM {
        Error::PermissionDenied { operation }
    } else if errno == Errno::MFILE || errno == Errno::NFILE || errno == Errno::DQUOT {
        Error::ResourceLimitReached
    } else if errno == Errno::NOSPC {
        Error::NoSpaceLeft
    } else if errno == Errno::NOMEM {
        Error::OutOfMemory
    } else if errno == Errno::SPIPE {
        Error::Unseekable
    } else {
        log::debug!("{operation}: host errno {errno:?} translated to Unexpected");
        Error::Unexpected { operation }
    }
}

fn to_stat(st: rustix::fs::Stat) -> Stat {
    let kind = if FileType::from_raw_mode(st.st_mode as _) == FileType::Directory {
        Kind::Dir
    } else {
        Kind::File
    };
    Stat {
        kind,
        size: if kind == Kind::Dir { 0 } else { st.st_size as u64 },
        mtime: st.st_mtime as i128 * NANOS_PER_SEC + st.st_mtime_nsec as i128,
        ctime: st.st_ctime as i128 * NANOS_PER_SEC + st.st_ctime_nsec as i128,
    }
}

pub(crate) fn open_root(path: &std::path::Path) -> Result<OwnedFd> {
    rustix::fs::open(
        path,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(|e| map_errno("open_dir", e))
}

pub(crate) fn open_dir_at(parent: BorrowedFd<'_>, path: &str) -> Result<OwnedFd> {
    rustix::fs::openat(
        parent,
        path,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(|e| map_errno("open_dir", e))
}

/// Create every missing component of `path`, then open the deepest one.
pub(crate) fn make_open_path(parent: BorrowedFd<'_>, path: &str) -> Result<OwnedFd> {
    let mut partial = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !partial.is_empty() {
            partial.push('/');
        }
        partial.push_str(segment);
        match rustix::fs::mkdirat(parent, partial.as_str(), Mode::from_raw_mode(0o777)) {
            Ok(()) => {}
            Err(e) if e == Errno::EXIST => {}
            Err(e) => return Err(map_errno("open_dir", e)),
        }
    }
    open_dir_at(parent, if path.is_empty() { "." } else { path })
}

pub(crate) fn open_file_at(
    parent: BorrowedFd<'_>,
    path: &str,
    mode: FileMode,
    create: bool,
) -> Result<OwnedFd> {
    let mut flags = match mode {
        FileMode::ReadOnly => OFlags::RDONLY,
        FileMode::WriteOnly => OFlags::WRONLY,
        FileMode::ReadWrite => OFlags::RDWR,
    } | OFlags::CLOEXEC;
    if create {
        flags |= OFlags::CREATE;
    }
    rustix::fs::openat(parent, path, flags, Mode::from_raw_mode(0o666))
        .map_err(|e| map_errno("open_file", e))
}

pub(crate) fn stat_at(parent: BorrowedFd<'_>, path: &str) -> Result<Stat> {
    rustix::fs::statat(parent, path, AtFlags::empty())
        .map(to_stat)
        .map_err(|e| map_errno("stat", e))
}

pub(crate) fn stat_fd(fd: BorrowedFd<'_>) -> Result<Stat> {
    rustix::fs::fstat(fd)
        .map(to_stat)
        .map_err(|e| map_errno("stat", e))
}

pub(crate) fn file_size(fd: BorrowedFd<'_>) -> Result<u64> {
    rustix::fs::fstat(fd)
        .map(|st| st.st_size as u64)
        .map_err(|e| map_errno("seek", e))
}

pub(crate) fn dup(fd: BorrowedFd<'_>) -> Result<OwnedFd> {
    fd.try_clone_to_owned().map_err(Error::from)
}

pub(crate) fn read_dir(fd: BorrowedFd<'_>) -> Result<rustix::fs::Dir> {
    rustix::fs::Dir::read_from(fd).map_err(|e| map_errno("iterate", e))
}

pub(crate) fn map_dir_errno(errno: Errno) -> Error {
    map_errno("iterate", errno)
}

/// Positional scatter read in batches of [`IOV_BATCH`] iovecs.
///
/// Returns early with the partial count when the host transfers less than a
/// batch asked for.
pub(crate) fn preadv_batched(
    fd: BorrowedFd<'_>,
    bufs: &mut [&mut [u8]],
    offset: u64,
) -> Result<usize> {
    let mut total = 0usize;
    for chunk in bufs.chunks_mut(IOV_BATCH) {
        let want: usize = chunk.iter().map(|b| b.len()).sum();
        if want == 0 {
            continue;
        }
        let mut iov: Vec<IoSliceMut<'_>> = chunk.iter_mut().map(|b| IoSliceMut::new(b)).collect();
        let n = rustix::io::preadv(fd, &mut iov, offset + total as u64)
            .map_err(|e| map_errno("readv", e))?;
        total += n;
        if n < want {
            break;
        }
    }
    Ok(total)
}

/// Positional gather write in batches of [`IOV_BATCH`] iovecs.
pub(crate) fn pwritev_batched(fd: BorrowedFd<'_>, bufs: &[&[u8]], offset: u64) -> Result<usize> {
    let mut total = 0usize;
    for chunk in bufs.chunks(IOV_BATCH) {
        let want: usize = chunk.iter().map(|b| b.len()).sum();
        if want == 0 {
            continue;
        }
        let iov: Vec<IoSlice<'_>> = chunk.iter().map(|b| IoSlice::new(b)).collect();
        let n = rustix::io::pwritev(fd, &iov, offset + total as u64)
            .map_err(|e| map_errno("writev", e))?;
        total += n;
        if n < want {
            break;
        }
    }
    Ok(total)
}

pub(crate) fn unlink_file_at(parent: BorrowedFd<'_>, path: &str) -> Result<()> {
    rustix::fs::unlinkat(parent, path, AtFlags::empty()).map_err(|e| map_errno("delete_file", e))
}

pub(crate) fn remove_dir_at(parent: BorrowedFd<'_>, path: &str) -> Result<()> {
    rustix::fs::unlinkat(parent, path, AtFlags::REMOVEDIR).map_err(|e| map_errno("delete_dir", e))
}

/// Delete the directory at `path` and everything below it.
pub(crate) fn remove_dir_all_at(parent: BorrowedFd<'_>, path: &str) -> Result<()> {
    let fd = open_dir_at(parent, path)?;
    remove_tree(fd.as_fd())?;
    drop(fd);
    remove_dir_at(parent, path)
}

fn remove_tree(fd: BorrowedFd<'_>) -> Result<()> {
    let err = |e| map_errno("delete_dir", e);
    // Snapshot the listing first; unlinking while the getdents buffer is
    // live can skip entries.
    let mut children: Vec<(std::ffi::CString, FileType)> = Vec::new();
    for entry in rustix::fs::Dir::read_from(fd).map_err(err)? {
        let entry = entry.map_err(err)?;
        let name = entry.file_name().to_owned();
        if name.as_c_str() == c"." || name.as_c_str() == c".." {
            continue;
        }
        children.push((name, entry.file_type()));
    }
    for (name, file_type) in children {
        let is_dir = match file_type {
            FileType::Directory => true,
            FileType::Unknown => rustix::fs::statat(fd, name.as_c_str(), AtFlags::SYMLINK_NOFOLLOW)
                .map(|st| FileType::from_raw_mode(st.st_mode as _) == FileType::Directory)
                .map_err(err)?,
            _ => false,
        };
        if is_dir {
            let child = rustix::fs::openat(
                fd,
                name.as_c_str(),
                OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC | OFlags::NOFOLLOW,
                Mode::empty(),
            )
            .map_err(err)?;
            remove_tree(child.as_fd())?;
            drop(child);
            rustix::fs::unlinkat(fd, name.as_c_str(), AtFlags::REMOVEDIR).map_err(err)?;
        } else {
            rustix::fs::unlinkat(fd, name.as_c_str(), AtFlags::empty()).map_err(err)?;
        }
    }
    Ok(())
}
