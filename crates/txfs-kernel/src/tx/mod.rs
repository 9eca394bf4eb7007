//! Transactional operation batches.
//!
//! - [`Transaction`] - Queue, order, execute and compensate
//! - [`Operation`] - Tagged operation with per-variant payload structs
//! - [`TxStorage`] - What a transaction executes against, with declared
//!   [`Capability`] flags

mod error;
mod operation;
mod order;
mod storage;
mod transaction;

pub use error::{CompensationFailure, TransactionError, TxResult};
pub use operation::{
    DeleteOp, MkdirOp, Operation, OperationKind, OperationVariant, RenameOp, RmOp, RmdirOp, UnlinkOp,
    WriteOp,
};
pub use storage::{Capability, TxStorage};
pub use transaction::{Transaction, TransactionStatus};
