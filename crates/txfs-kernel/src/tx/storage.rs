//! Storage seen by a transaction.
//!
//! A transaction only needs a handful of operations, and not every store
//! provides all of them. [`TxStorage`] has one method per operation with an
//! `ENOSYS` default, and `supports` declares which ones are real. The engine
//! checks the declared set before running anything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::vfs::{MkdirOptions, RmOptions, RmdirOptions, VfsError, VfsResult, WriteOptions};

/// One operation a storage may provide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    WriteFile,
    ReadFile,
    Exists,
    Rename,
    Mkdir,
    Rm,
    Rmdir,
    Unlink,
}

/// Operations a transaction can drive.
///
/// Implement the methods you support and report them from `supports`.
#[async_trait]
pub trait TxStorage: Send + Sync {
    /// Whether `capability` is implemented.
    fn supports(&self, capability: Capability) -> bool;

    async fn write_file(&self, _path: &str, _data: &[u8], _options: WriteOptions) -> VfsResult<()> {
        Err(VfsError::unsupported("write_file"))
    }

    async fn read_file(&self, _path: &str) -> VfsResult<Vec<u8>> {
        Err(VfsError::unsupported("read_file"))
    }

    async fn exists(&self, _path: &str) -> VfsResult<bool> {
        Err(VfsError::unsupported("exists"))
    }

    async fn rename(&self, _old_path: &str, _new_path: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("rename"))
    }

    async fn mkdir(&self, _path: &str, _options: MkdirOptions) -> VfsResult<()> {
        Err(VfsError::unsupported("mkdir"))
    }

    async fn rm(&self, _path: &str, _options: RmOptions) -> VfsResult<()> {
        Err(VfsError::unsupported("rm"))
    }

    async fn rmdir(&self, _path: &str, _options: RmdirOptions) -> VfsResult<()> {
        Err(VfsError::unsupported("rmdir"))
    }

    async fn unlink(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("unlink"))
    }
}
