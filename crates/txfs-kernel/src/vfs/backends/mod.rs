//! Filesystem backends.
//!
//! Additional backends (SQLite, object storage) implement [`crate::vfs::FsBackend`]
//! outside this crate.

mod memory;

pub use memory::MemoryBackend;
