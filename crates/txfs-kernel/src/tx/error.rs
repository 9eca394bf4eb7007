//! Transaction errors.

use thiserror::Error;
use txfs_types::ErrorCode;

use super::operation::OperationKind;
use super::storage::Capability;
use super::transaction::TransactionStatus;
use crate::vfs::VfsError;

/// A rollback step that itself failed.
#[derive(Debug)]
pub struct CompensationFailure {
    /// Index (insertion order) of the operation being undone.
    pub index: usize,
    /// Kind of the operation being undone.
    pub kind: OperationKind,
    /// Why the inverse failed.
    pub error: VfsError,
}

/// Transaction errors.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Queuing or executing after the transaction settled.
    #[error("cannot add operations to a {status} transaction")]
    NotPending { status: TransactionStatus },

    /// The storage does not declare an operation the queue needs.
    #[error("storage does not support {capability}")]
    MissingCapability { capability: Capability },

    /// An operation failed and the applied ones were compensated.
    ///
    /// `source` is always the error that triggered the rollback; failures
    /// of the rollback itself are listed in `compensation_failures`.
    #[error("operation {index} ({kind}) failed: {source}")]
    Failed {
        index: usize,
        kind: OperationKind,
        source: VfsError,
        compensation_failures: Vec<CompensationFailure>,
    },
}

impl TransactionError {
    /// The machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            TransactionError::NotPending { .. } => ErrorCode::Einval,
            TransactionError::MissingCapability { .. } => ErrorCode::Enosys,
            TransactionError::Failed { source, .. } => source.code(),
        }
    }

    /// Rollback steps that failed (empty unless `Failed`).
    pub fn compensation_failures(&self) -> &[CompensationFailure] {
        match self {
            TransactionError::Failed {
                compensation_failures,
                ..
            } => compensation_failures,
            _ => &[],
        }
    }
}

/// Result type for transaction operations.
pub type TxResult<T> = Result<T, TransactionError>;
