//! Queued filesystem operations.
//!
//! Each variant's payload is its own struct, so code holding a `&RenameOp`
//! (for example from [`Transaction::get_operations_by_type`]) keeps full
//! field typing. `RenameOp` carries `old_path`/`new_path`; every other
//! payload carries a single `path`.
//!
//! [`Transaction::get_operations_by_type`]: super::Transaction::get_operations_by_type

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use txfs_types::path;

use crate::vfs::{MkdirOptions, RenameOptions, RmOptions, RmdirOptions, WriteOptions};

/// Operation tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Write,
    Delete,
    Unlink,
    Rm,
    Rmdir,
    Rename,
    Mkdir,
}

impl OperationKind {
    /// Returns true for operations that destroy data and have no inverse.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            OperationKind::Delete | OperationKind::Unlink | OperationKind::Rm | OperationKind::Rmdir
        )
    }
}

/// Write a whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub path: String,
    pub data: Vec<u8>,
    pub options: WriteOptions,
}

/// Legacy file removal, executed like [`UnlinkOp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOp {
    pub path: String,
}

/// Remove a file or symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlinkOp {
    pub path: String,
}

/// Remove a file or directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RmOp {
    pub path: String,
    pub options: RmOptions,
}

/// Remove a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RmdirOp {
    pub path: String,
    pub options: RmdirOptions,
}

/// Move `old_path` to `new_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOp {
    pub old_path: String,
    pub new_path: String,
    pub options: RenameOptions,
}

impl RenameOp {
    /// Returns true when source and destination have different parents.
    pub fn is_cross_directory(&self) -> bool {
        path::is_cross_directory_move(&self.old_path, &self.new_path)
    }
}

/// Create a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkdirOp {
    pub path: String,
    pub options: MkdirOptions,
}

/// A queued operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Write(WriteOp),
    Delete(DeleteOp),
    Unlink(UnlinkOp),
    Rm(RmOp),
    Rmdir(RmdirOp),
    Rename(RenameOp),
    Mkdir(MkdirOp),
}

impl Operation {
    /// The operation's tag.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Write(_) => OperationKind::Write,
            Operation::Delete(_) => OperationKind::Delete,
            Operation::Unlink(_) => OperationKind::Unlink,
            Operation::Rm(_) => OperationKind::Rm,
            Operation::Rmdir(_) => OperationKind::Rmdir,
            Operation::Rename(_) => OperationKind::Rename,
            Operation::Mkdir(_) => OperationKind::Mkdir,
        }
    }

    /// The single target path; `None` for renames.
    pub fn path(&self) -> Option<&str> {
        match self {
            Operation::Write(op) => Some(&op.path),
            Operation::Delete(op) => Some(&op.path),
            Operation::Unlink(op) => Some(&op.path),
            Operation::Rm(op) => Some(&op.path),
            Operation::Rmdir(op) => Some(&op.path),
            Operation::Mkdir(op) => Some(&op.path),
            Operation::Rename(_) => None,
        }
    }

    /// Every path the operation touches (both ends of a rename).
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Operation::Rename(op) => vec![op.old_path.as_str(), op.new_path.as_str()],
            other => other.path().into_iter().collect(),
        }
    }

    /// One human-readable line.
    pub fn describe(&self) -> String {
        match self {
            Operation::Write(op) => format!("write {} ({} bytes)", op.path, op.data.len()),
            Operation::Delete(op) => format!("delete {}", op.path),
            Operation::Unlink(op) => format!("unlink {}", op.path),
            Operation::Rm(op) => {
                let flags = match (op.options.recursive, op.options.force) {
                    (true, true) => " -rf",
                    (true, false) => " -r",
                    (false, true) => " -f",
                    (false, false) => "",
                };
                format!("rm{flags} {}", op.path)
            }
            Operation::Rmdir(op) => format!("rmdir {}", op.path),
            Operation::Rename(op) => {
                let mkdirp = if op.options.mkdirp { " (mkdirp)" } else { "" };
                format!("rename {} -> {}{mkdirp}", op.old_path, op.new_path)
            }
            Operation::Mkdir(op) => {
                let p = if op.options.recursive { " -p" } else { "" };
                format!("mkdir{p} {}", op.path)
            }
        }
    }
}

/// Narrowing from [`Operation`] to one payload type.
pub trait OperationVariant: Sized {
    /// Tag of the variant this payload belongs to.
    const KIND: OperationKind;

    /// The payload, if `op` is this variant.
    fn from_operation(op: &Operation) -> Option<&Self>;
}

macro_rules! impl_operation_variant {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        $(
            impl OperationVariant for $payload {
                const KIND: OperationKind = OperationKind::$variant;

                fn from_operation(op: &Operation) -> Option<&Self> {
                    match op {
                        Operation::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for Operation {
                fn from(op: $payload) -> Self {
                    Operation::$variant(op)
                }
            }
        )*
    };
}

impl_operation_variant! {
    Write => WriteOp,
    Delete => DeleteOp,
    Unlink => UnlinkOp,
    Rm => RmOp,
    Rmdir => RmdirOp,
    Rename => RenameOp,
    Mkdir => MkdirOp,
}
