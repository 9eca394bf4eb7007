//! Storage backend contract.
//!
//! Any storage (memory, SQLite, object store) plugs in by implementing
//! [`FsBackend`]. The facade normalizes every path before calling in, so
//! backends always receive absolute, `/`-rooted strings without `.`, `..`
//! or trailing slashes.

use async_trait::async_trait;
use std::time::SystemTime;

use super::types::{DirEntry, FileAttr, MkdirOptions, ReaddirOptions, RmdirOptions, WriteOptions};
use super::{VfsError, VfsResult};

/// Core storage trait.
///
/// Failures carry a structured [`VfsError`] whose `code()` is the POSIX code
/// (`ENOENT`, `EEXIST`, `EISDIR`, `ENOTDIR`, `ENOTEMPTY`, `EACCES`, `EPERM`).
#[async_trait]
pub trait FsBackend: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Read the entire contents of a file (follows symlinks).
    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// List a directory.
    async fn readdir(&self, path: &str, options: ReaddirOptions) -> VfsResult<Vec<DirEntry>>;

    /// Attributes of the path, following symlinks.
    async fn stat(&self, path: &str) -> VfsResult<FileAttr>;

    /// Attributes of the path itself, not following a final symlink.
    async fn lstat(&self, path: &str) -> VfsResult<FileAttr>;

    /// Check permission bits (see [`super::types::access`]).
    async fn access(&self, path: &str, mode: u32) -> VfsResult<()>;

    /// Target of a symbolic link.
    async fn readlink(&self, path: &str) -> VfsResult<String>;

    /// Canonical path with every symlink resolved.
    async fn realpath(&self, path: &str) -> VfsResult<String>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write a whole file according to `options.flag`.
    async fn write_file(&self, path: &str, data: &[u8], options: WriteOptions) -> VfsResult<()>;

    /// Remove a file or symlink.
    async fn unlink(&self, path: &str) -> VfsResult<()>;

    /// Rename a file or directory, replacing a compatible destination.
    async fn rename(&self, old_path: &str, new_path: &str) -> VfsResult<()>;

    /// Copy a file's contents to a new path.
    async fn copy_file(&self, src: &str, dest: &str) -> VfsResult<()>;

    /// Create a directory.
    async fn mkdir(&self, path: &str, options: MkdirOptions) -> VfsResult<()>;

    /// Remove a directory.
    async fn rmdir(&self, path: &str, options: RmdirOptions) -> VfsResult<()>;

    /// Truncate (or zero-extend) a file.
    async fn truncate(&self, path: &str, len: u64) -> VfsResult<()>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Change permission bits.
    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()>;

    /// Change ownership.
    async fn chown(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()>;

    /// Set access and modification times.
    async fn utimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> VfsResult<()>;

    // ========================================================================
    // Links
    // ========================================================================

    /// Create a symlink at `path` pointing to `target` (stored verbatim).
    async fn symlink(&self, target: &str, path: &str) -> VfsResult<()>;

    /// Create a hard link at `new_path` sharing `existing`'s data.
    async fn link(&self, existing: &str, new_path: &str) -> VfsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> VfsResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
