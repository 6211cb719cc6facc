//! # harha
//!
//! A portable virtual filesystem (VFS) library: one capability-controlled
//! operation vocabulary over multiple backends that compose hierarchically.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harha::{Dir, Fs, FsExt, PassthroughFs, Permissions, SafePath, Vfs};
//!
//! fn main() -> harha::Result<()> {
//!     // Serve a host directory, read-only.
//!     let vfs = Vfs::new(PassthroughFs::open("/srv/data")?, Permissions::READ_ONLY);
//!
//!     // Uniform vocabulary: open, stat, iterate, read — over opaque handles.
//!     let stat = vfs.stat(Dir::ROOT, SafePath::new("notes/today.txt")?)?;
//!     println!("{} bytes", stat.size);
//!
//!     // Walk the whole tree depth-first.
//!     for entry in vfs.walk(Dir::ROOT)? {
//!         let entry = entry?;
//!         println!("{:indent$}{}", "", entry.basename, indent = entry.depth);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Core Pieces
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Fs`] | The capability-gated operation surface (object-safe) |
//! | [`Vfs`] | Facade wrapping any [`Backend`]: permissions, chroot, dispatch |
//! | [`Backend`] | The raw handle-operation vocabulary backends implement |
//! | [`SafePath`] | Validated path value — no traversal, no reserved characters |
//! | [`Walker`] / [`SelectiveWalker`] | Depth-first traversal over iteration |
//! | [`Error`] | The single error taxonomy |
//!
//! ## Backends
//!
//! | Backend | Role |
//! |---------|------|
//! | [`PassthroughFs`] | A host directory tree (Unix) |
//! | [`OverlayFs`] | Longest-prefix mount routing across child VFSes |
//! | [`MuxFs`] | Fixed child set sharing one handle space via bit-packed tags |
//! | [`ArchiveFs`] | Read-only archive file (Unix) |
//!
//! Composition goes through `Arc<dyn Fs>`: the overlay and multiplexer
//! borrow their children and forward through each child's own facade, so a
//! child's capability set is enforced no matter how deep the stack.
//!
//! ---
//!
//! ## Handles & Capabilities
//!
//! Every object is addressed by an opaque 32-bit handle ([`Dir`],
//! [`File`]); the reserved value [`Dir::ROOT`] means "this VFS's current
//! logical root" — which [`Fs::chroot`] can rebind. Each [`Vfs`] carries a
//! [`Permissions`] set; operations whose capability bit is unset fail with
//! [`Error::PermissionDenied`] before the backend is consulted.
//!
//! ## Concurrency Model
//!
//! Synchronous and single-threaded per VFS instance: handle tables use
//! interior mutability to satisfy the `&self` API, not to promise
//! cross-thread scaling. Serialize externally before sharing an instance.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for the plain data types ([`Stat`], [`Kind`], [`DirEntry`], [`Permissions`]) |

mod backend;
mod error;
mod ext;
mod fs;
mod iter;
mod path;
mod types;
mod walker;

#[cfg(unix)]
mod archive;
#[cfg(unix)]
mod host;
#[cfg(unix)]
mod passthrough;

mod mux;
mod overlay;

pub use backend::Backend;
pub use error::{Error, Result};
pub use ext::FsExt;
pub use fs::{Fs, Vfs};
pub use iter::{DirIterator, IterState};
pub use path::{SafePath, SafePathBuf};
pub use types::{
    Dir, DirDeleteOptions, DirEntry, DirOpenOptions, File, FileMode, FileOpenOptions, Kind,
    Permissions, Stat, Whence,
};
pub use walker::{SelectiveWalker, WalkEntry, Walker};

pub use mux::{MountTag, MuxFs};
pub use overlay::OverlayFs;

#[cfg(unix)]
pub use archive::{ArchiveBuilder, ArchiveFs, FormatError};
#[cfg(unix)]
pub use passthrough::PassthroughFs;
