//! Virtual Filesystem.
//!
//! Key components:
//!
//! - [`FsBackend`] - Storage contract every backend implements
//! - [`MemoryBackend`] - In-memory filesystem (for scratch space, testing)
//! - [`Vfs`] - POSIX-like facade: path normalization, watch events, handles
//! - [`OpenFlags`] - Parsed `open()` flags (string or numeric forms)
//! - [`FileHandle`] - Lazily materialized open file
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes in the API**: operations take `/`-rooted strings.
//! - **Normalize once**: the facade normalizes; backends trust their input.
//! - **Events after success**: a mutation is announced to watchers only after
//!   the backend call returned `Ok`.

mod backend;
pub mod backends;
mod error;
mod facade;
mod flags;
mod handle;
mod types;

pub use backend::FsBackend;
pub use backends::MemoryBackend;
pub use error::{VfsError, VfsResult};
pub use facade::Vfs;
pub use flags::{bits, AccessMode, OpenFlags};
pub use handle::FileHandle;
pub use types::{
    access, DirEntry, FileAttr, FileType, MkdirOptions, ReaddirOptions, RenameOptions,
    RmOptions, RmdirOptions, WriteFlag, WriteOptions,
};
