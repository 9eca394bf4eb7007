//! Batched filesystem operations with compensation-based rollback.
//!
//! ## Phases
//!
//! 1. **Build**: queue operations with the chaining methods
//! 2. **Order**: compute the dependency-aware execution order
//! 3. **Execute**: apply sequentially against a [`TxStorage`]
//! 4. **Compensate** (on failure): undo applied operations in LIFO order
//!
//! ## Compensation
//!
//! | Operation | Inverse                                                     |
//! |-----------|-------------------------------------------------------------|
//! | write     | restore prior content (storage reads), else `rm -f` target  |
//! | rename    | rename back                                                 |
//! | mkdir     | none; directories are left in place                         |
//! | rm etc.   | none; removed data cannot be recovered                      |
//!
//! There is no write-ahead log: a crash mid-execute leaves storage as of
//! the last applied operation.
//!
//! ## Example
//!
//! ```no_run
//! # use txfs_kernel::{Transaction, Vfs, RenameOptions};
//! # async fn example(vfs: &Vfs) -> txfs_kernel::TxResult<()> {
//! let mut tx = Transaction::new();
//! tx.write_file("/config.json.lock", b"{}".to_vec(), None)?
//!     .rename("/config.json.lock", "/config.json", Some(RenameOptions::mkdirp()))?;
//! tx.execute(vfs).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use txfs_types::{path, TransactionId};

use super::error::{CompensationFailure, TransactionError, TxResult};
use super::operation::{
    DeleteOp, MkdirOp, Operation, OperationKind, OperationVariant, RenameOp, RmOp, RmdirOp, UnlinkOp,
    WriteOp,
};
use super::order::execution_order;
use super::storage::{Capability, TxStorage};
use crate::vfs::{
    MkdirOptions, RenameOptions, RmOptions, RmdirOptions, VfsError, VfsResult, WriteOptions,
};

/// Lifecycle of a transaction. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Committed,
    RolledBack,
}

/// Inverse of an applied operation.
#[derive(Debug)]
enum Compensation {
    Restore { path: String, data: Vec<u8> },
    Remove { path: String },
    RenameBack { from: String, to: String },
    Irreversible,
}

/// An ordered batch of filesystem operations.
#[must_use = "a transaction does nothing until executed"]
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    operations: Vec<Operation>,
    status: TransactionStatus,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Empty, pending transaction.
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
            operations: Vec::new(),
            status: TransactionStatus::Pending,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Queued operations in insertion order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    // ========================================================================
    // Queuing
    // ========================================================================

    fn push(&mut self, op: impl Into<Operation>) -> TxResult<&mut Self> {
        if self.status != TransactionStatus::Pending {
            return Err(TransactionError::NotPending {
                status: self.status,
            });
        }
        self.operations.push(op.into());
        Ok(self)
    }

    /// Queue a whole-file write.
    pub fn write_file(
        &mut self,
        path: impl Into<String>,
        data: impl Into<Vec<u8>>,
        options: Option<WriteOptions>,
    ) -> TxResult<&mut Self> {
        self.push(WriteOp {
            path: path.into(),
            data: data.into(),
            options: options.unwrap_or_default(),
        })
    }

    /// Queue a write of UTF-8 text.
    pub fn write_file_string(
        &mut self,
        path: impl Into<String>,
        text: &str,
        options: Option<WriteOptions>,
    ) -> TxResult<&mut Self> {
        self.write_file(path, text.as_bytes(), options)
    }

    /// Queue a rename.
    pub fn rename(
        &mut self,
        old_path: impl Into<String>,
        new_path: impl Into<String>,
        options: Option<RenameOptions>,
    ) -> TxResult<&mut Self> {
        self.push(RenameOp {
            old_path: old_path.into(),
            new_path: new_path.into(),
            options: options.unwrap_or_default(),
        })
    }

    /// Alias for [`rename`](Self::rename).
    pub fn move_path(
        &mut self,
        old_path: impl Into<String>,
        new_path: impl Into<String>,
        options: Option<RenameOptions>,
    ) -> TxResult<&mut Self> {
        self.rename(old_path, new_path, options)
    }

    /// Queue a directory creation.
    pub fn mkdir(&mut self, path: impl Into<String>, options: Option<MkdirOptions>) -> TxResult<&mut Self> {
        self.push(MkdirOp {
            path: path.into(),
            options: options.unwrap_or_default(),
        })
    }

    /// Queue an `rm`.
    pub fn rm(&mut self, path: impl Into<String>, options: Option<RmOptions>) -> TxResult<&mut Self> {
        self.push(RmOp {
            path: path.into(),
            options: options.unwrap_or_default(),
        })
    }

    /// Queue a directory removal.
    pub fn rmdir(&mut self, path: impl Into<String>, options: Option<RmdirOptions>) -> TxResult<&mut Self> {
        self.push(RmdirOp {
            path: path.into(),
            options: options.unwrap_or_default(),
        })
    }

    /// Queue an unlink.
    pub fn unlink(&mut self, path: impl Into<String>) -> TxResult<&mut Self> {
        self.push(UnlinkOp { path: path.into() })
    }

    /// Alias for [`unlink`](Self::unlink).
    pub fn delete_file(&mut self, path: impl Into<String>) -> TxResult<&mut Self> {
        self.unlink(path)
    }

    /// Queue the legacy `delete` operation (executes as an unlink).
    pub fn delete(&mut self, path: impl Into<String>) -> TxResult<&mut Self> {
        self.push(DeleteOp { path: path.into() })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Operations of one payload type, in insertion order.
    pub fn get_operations_by_type<T: OperationVariant>(&self) -> Vec<&T> {
        self.operations.iter().filter_map(T::from_operation).collect()
    }

    /// Operations with the given tag, in insertion order.
    pub fn get_operations_by_kind(&self, kind: OperationKind) -> Vec<&Operation> {
        self.operations.iter().filter(|op| op.kind() == kind).collect()
    }

    /// Returns true when the two paths have different parent directories.
    pub fn is_cross_directory_move(old_path: &str, new_path: &str) -> bool {
        path::is_cross_directory_move(old_path, new_path)
    }

    /// Whether the operation at `index` is a cross-directory rename.
    ///
    /// False for other kinds and out-of-range indices.
    pub fn is_cross_directory_rename(&self, index: usize) -> bool {
        self.operations
            .get(index)
            .and_then(RenameOp::from_operation)
            .is_some_and(RenameOp::is_cross_directory)
    }

    /// Every rename that crosses directories.
    pub fn get_cross_directory_renames(&self) -> Vec<&RenameOp> {
        self.get_operations_by_type::<RenameOp>()
            .into_iter()
            .filter(|op| op.is_cross_directory())
            .collect()
    }

    /// Indices of the operations in the order `execute` will run them.
    pub fn execution_order(&self) -> Vec<usize> {
        execution_order(&self.operations)
    }

    /// One line per operation, in insertion order.
    pub fn describe(&self) -> Vec<String> {
        self.operations.iter().map(Operation::describe).collect()
    }

    /// Capabilities the queued operations need from storage.
    pub fn required_capabilities(&self) -> BTreeSet<Capability> {
        let mut caps = BTreeSet::new();
        for op in &self.operations {
            match op {
                Operation::Write(_) => {
                    caps.insert(Capability::WriteFile);
                    // rollback of a newly created file removes it
                    caps.insert(Capability::Rm);
                }
                Operation::Delete(_) | Operation::Unlink(_) => {
                    caps.insert(Capability::Unlink);
                }
                Operation::Rm(_) => {
                    caps.insert(Capability::Rm);
                }
                Operation::Rmdir(_) => {
                    caps.insert(Capability::Rmdir);
                }
                Operation::Mkdir(_) => {
                    caps.insert(Capability::Mkdir);
                }
                Operation::Rename(rename) => {
                    caps.insert(Capability::Rename);
                    if rename.options.mkdirp && mkdirp_parent(&rename.new_path).is_some() {
                        caps.insert(Capability::Mkdir);
                    }
                    if !rename.options.overwrite {
                        caps.insert(Capability::Exists);
                    }
                }
            }
        }
        caps
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Apply every operation, or compensate and report the first failure.
    ///
    /// May be called once. Afterwards `status()` is `committed` or
    /// `rolled_back`.
    #[tracing::instrument(skip(self, storage), fields(tx = %self.id, ops = self.operations.len()))]
    pub async fn execute<S>(&mut self, storage: &S) -> TxResult<()>
    where
        S: TxStorage + ?Sized,
    {
        if self.status != TransactionStatus::Pending {
            return Err(TransactionError::NotPending {
                status: self.status,
            });
        }

        if let Some(capability) = self
            .required_capabilities()
            .into_iter()
            .find(|cap| !storage.supports(*cap))
        {
            self.status = TransactionStatus::RolledBack;
            tracing::warn!(%capability, "storage lacks a required capability; nothing applied");
            return Err(TransactionError::MissingCapability { capability });
        }

        let order = self.execution_order();
        tracing::debug!(?order, "execution order");

        let mut applied: Vec<(usize, Compensation)> = Vec::with_capacity(order.len());
        for index in order {
            let op = &self.operations[index];
            tracing::debug!(index, op = %op.describe(), "applying");
            match apply(op, storage).await {
                Ok(compensation) => applied.push((index, compensation)),
                Err(source) => {
                    let kind = op.kind();
                    tracing::debug!(index, %kind, error = %source, "operation failed; rolling back");
                    let compensation_failures = self.compensate(storage, applied).await;
                    self.status = TransactionStatus::RolledBack;
                    tracing::info!(
                        failed_index = index,
                        compensation_failures = compensation_failures.len(),
                        "transaction rolled back"
                    );
                    return Err(TransactionError::Failed {
                        index,
                        kind,
                        source,
                        compensation_failures,
                    });
                }
            }
        }

        self.status = TransactionStatus::Committed;
        tracing::info!("transaction committed");
        Ok(())
    }

    /// Undo applied operations, newest first. Every inverse is attempted.
    async fn compensate<S>(&self, storage: &S, applied: Vec<(usize, Compensation)>) -> Vec<CompensationFailure>
    where
        S: TxStorage + ?Sized,
    {
        let mut failures = Vec::new();
        for (index, compensation) in applied.into_iter().rev() {
            let kind = self.operations[index].kind();
            let result = match &compensation {
                Compensation::Restore { path, data } => {
                    storage.write_file(path, data, WriteOptions::default()).await
                }
                Compensation::Remove { path } => {
                    storage
                        .rm(
                            path,
                            RmOptions {
                                recursive: false,
                                force: true,
                            },
                        )
                        .await
                }
                Compensation::RenameBack { from, to } => storage.rename(from, to).await,
                Compensation::Irreversible => {
                    tracing::warn!(index, %kind, op = %self.operations[index].describe(), "not compensated");
                    continue;
                }
            };
            match result {
                Ok(()) => tracing::debug!(index, %kind, ?compensation, "compensated"),
                Err(error) => {
                    tracing::warn!(index, %kind, %error, "compensation failed");
                    failures.push(CompensationFailure { index, kind, error });
                }
            }
        }
        failures
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.status == TransactionStatus::Pending && !self.operations.is_empty() {
            tracing::debug!(tx = %self.id, ops = self.operations.len(), "transaction dropped without execute");
        }
    }
}

/// Parent to create for a mkdirp rename, unless it is the root.
fn mkdirp_parent(new_path: &str) -> Option<&str> {
    let parent = path::parent(new_path);
    (parent != "/" && parent != ".").then_some(parent)
}

async fn apply<S>(op: &Operation, storage: &S) -> VfsResult<Compensation>
where
    S: TxStorage + ?Sized,
{
    match op {
        Operation::Write(write) => {
            let prior = if storage.supports(Capability::ReadFile) && storage.supports(Capability::Exists) {
                if storage.exists(&write.path).await? {
                    Some(storage.read_file(&write.path).await?)
                } else {
                    None
                }
            } else {
                None
            };
            storage.write_file(&write.path, &write.data, write.options).await?;
            Ok(match prior {
                Some(data) => Compensation::Restore {
                    path: write.path.clone(),
                    data,
                },
                None => Compensation::Remove {
                    path: write.path.clone(),
                },
            })
        }
        Operation::Rename(rename) => {
            if rename.options.mkdirp {
                if let Some(parent) = mkdirp_parent(&rename.new_path) {
                    storage.mkdir(parent, MkdirOptions::recursive()).await?;
                }
            }
            if !rename.options.overwrite && storage.exists(&rename.new_path).await? {
                return Err(VfsError::already_exists(rename.new_path.clone()));
            }
            storage.rename(&rename.old_path, &rename.new_path).await?;
            Ok(Compensation::RenameBack {
                from: rename.new_path.clone(),
                to: rename.old_path.clone(),
            })
        }
        Operation::Mkdir(mkdir) => {
            storage.mkdir(&mkdir.path, mkdir.options).await?;
            Ok(Compensation::Irreversible)
        }
        Operation::Rm(rm) => {
            storage.rm(&rm.path, rm.options).await?;
            Ok(Compensation::Irreversible)
        }
        Operation::Rmdir(rmdir) => {
            storage.rmdir(&rmdir.path, rmdir.options).await?;
            Ok(Compensation::Irreversible)
        }
        Operation::Unlink(UnlinkOp { path }) | Operation::Delete(DeleteOp { path }) => {
            storage.unlink(path).await?;
            Ok(Compensation::Irreversible)
        }
    }
}
