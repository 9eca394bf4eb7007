//! # txfs-kernel
//!
//! Transactional virtual filesystem.
//!
//! Everything goes through a [`Vfs`]:
//! - Owns a pluggable [`FsBackend`] (in-memory by default)
//! - Normalizes paths and announces mutations to watchers
//! - Hands out [`LockFile`]s backed by one shared [`LockRegistry`]
//! - Executes [`Transaction`]s: ordered batches with compensation-based rollback

pub mod config;
pub mod lock;
pub mod tx;
pub mod vfs;
pub mod watch;

pub use config::{ConfigError, FsConfig, LockConfig, TxfsConfig, WatchConfig};
pub use lock::{LockError, LockFile, LockInfo, LockOptions, LockRegistry, LockResult};
pub use tx::{
    Capability, CompensationFailure, DeleteOp, MkdirOp, Operation, OperationKind, OperationVariant,
    RenameOp, RmOp, RmdirOp, Transaction, TransactionError, TransactionStatus, TxResult, TxStorage,
    UnlinkOp, WriteOp,
};
pub use vfs::{
    backends::MemoryBackend, AccessMode, DirEntry, FileAttr, FileHandle, FileType, FsBackend,
    MkdirOptions, OpenFlags, ReaddirOptions, RenameOptions, RmOptions, RmdirOptions, Vfs, VfsError,
    VfsResult, WriteFlag, WriteOptions,
};
pub use watch::{WatchEvent, WatchEventType, WatchManager, WatchOptions, Watcher};

pub use txfs_types::{ErrorCode, HolderId, TransactionId, WatcherId};
