//! # Error Types
//!
//! The Harha error taxonomy.
//!
//! ## Overview
//!
//! Every fallible operation returns [`Result<T>`](crate::Result), an alias for
//! `std::result::Result<T, Error>`. The taxonomy is deliberately small: host
//! errors are translated **once**, at the backend boundary, and nothing above
//! the backend re-maps them. Conditions the caller cannot meaningfully react
//! to collapse into [`Error::Unexpected`]; the detail that erases is emitted
//! through the `log` facade instead.
//!
//! ## Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Structural | `FileNotFound`, `NotDir`, `IsDir`, `PathAlreadyExists`, `DirNotEmpty` |
//! | Capability | `PermissionDenied`, `Unsupported` |
//! | Handle state | `NotOpenForReading`, `NotOpenForWriting`, `NotOpenForIteration`, `Unseekable` |
//! | Resources | `OutOfMemory`, `ResourceLimitReached`, `NoSpaceLeft` |
//! | Input | `InvalidPath` |
//! | Catch-all | `Unexpected` |
//!
//! ## Quick Example
//!
//! ```rust
//! use harha::{Error, SafePath};
//!
//! let err = SafePath::new("../escape").unwrap_err();
//! assert!(matches!(err, Error::InvalidPath { .. }));
//! assert!(err.to_string().starts_with("invalid path"));
//! ```

/// Convenience alias used by every fallible operation in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The Harha error taxonomy.
///
/// All errors are pure values; nothing in this crate panics on a recoverable
/// condition. A capability check failing surfaces [`PermissionDenied`]
/// *before* the backend is consulted.
///
/// # Non-Exhaustive
///
/// The enum is `#[non_exhaustive]`; match with a wildcard arm.
///
/// [`PermissionDenied`]: Error::PermissionDenied
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The host returned an error that is not meaningful to callers.
    ///
    /// The underlying detail is logged at `debug` level where the
    /// translation happens.
    #[error("{operation}: unexpected host error")]
    Unexpected {
        /// The operation that failed.
        operation: &'static str,
    },

    /// The backend does not implement this operation.
    #[error("{operation}: operation not supported")]
    Unsupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// Either the capability bit is unset, or the host refused access.
    #[error("{operation}: permission denied")]
    PermissionDenied {
        /// The operation that was denied.
        operation: &'static str,
    },

    /// Allocation failure.
    #[error("out of memory")]
    OutOfMemory,

    /// The path does not name an existing object.
    #[error("file not found")]
    FileNotFound,

    /// Expected a directory but found something else.
    #[error("not a directory")]
    NotDir,

    /// Expected a file but found a directory.
    #[error("is a directory")]
    IsDir,

    /// The path already names an object.
    #[error("path already exists")]
    PathAlreadyExists,

    /// The directory still has entries.
    #[error("directory not empty")]
    DirNotEmpty,

    /// Host descriptor, quota, or similar limit exhausted.
    #[error("resource limit reached")]
    ResourceLimitReached,

    /// The handle does not permit reading.
    #[error("handle not open for reading")]
    NotOpenForReading,

    /// The handle does not permit writing.
    #[error("handle not open for writing")]
    NotOpenForWriting,

    /// The handle does not permit iteration.
    #[error("handle not open for iteration")]
    NotOpenForIteration,

    /// The handle cannot seek.
    #[error("handle cannot seek")]
    Unseekable,

    /// Write-time space failure.
    #[error("no space left on device")]
    NoSpaceLeft,

    /// The path failed [`SafePath`](crate::SafePath) validation.
    #[error("invalid path: {reason}")]
    InvalidPath {
        /// Which validation rule was violated.
        reason: &'static str,
    },
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::NotFound => Error::FileNotFound,
            ErrorKind::PermissionDenied => Error::PermissionDenied { operation: "io" },
            ErrorKind::AlreadyExists => Error::PathAlreadyExists,
            ErrorKind::NotADirectory => Error::NotDir,
            ErrorKind::IsADirectory => Error::IsDir,
            ErrorKind::DirectoryNotEmpty => Error::DirNotEmpty,
            ErrorKind::StorageFull => Error::NoSpaceLeft,
            ErrorKind::OutOfMemory => Error::OutOfMemory,
            _ => {
                log::debug!("io error translated to Unexpected: {error}");
                Error::Unexpected { operation: "io" }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_display_names_operation() {
        let err = Error::PermissionDenied { operation: "readv" };
        assert_eq!(err.to_string(), "readv: permission denied");
    }

    #[test]
    fn unsupported_display_names_operation() {
        let err = Error::Unsupported { operation: "writev" };
        assert_eq!(err.to_string(), "writev: operation not supported");
    }

    #[test]
    fn invalid_path_display_includes_reason() {
        let err = Error::InvalidPath {
            reason: "dot segment",
        };
        assert_eq!(err.to_string(), "invalid path: dot segment");
    }

    #[test]
    fn from_io_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        assert!(matches!(Error::from(io_err), Error::FileNotFound));
    }

    #[test]
    fn from_io_already_exists() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AlreadyExists, "test");
        assert!(matches!(Error::from(io_err), Error::PathAlreadyExists));
    }

    #[test]
    fn from_io_other_is_unexpected() {
        let io_err = std::io::Error::other("test");
        assert!(matches!(Error::from(io_err), Error::Unexpected { .. }));
    }
}
