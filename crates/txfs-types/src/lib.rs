//! Shared identifiers, error codes and path helpers for txfs.
//!
//! This crate is the leaf of the workspace: it has **no internal txfs
//! dependencies**. The kernel crate builds its filesystem facade, lock
//! registry and transaction engine on top of these types.
//!
//! # Key Types
//!
//! |-------------------|-----------------------------------------------|
//! | Type              | Purpose                                       |
//! |-------------------|-----------------------------------------------|
//! | [`ErrorCode`]     | POSIX-flavoured machine-readable error code   |
//! | [`HolderId`]      | Identity of a lock holder                     |
//! | [`WatcherId`]     | Identity of a registered watcher              |
//! | [`TransactionId`] | Identity of a transaction (for logs)          |
//! |-------------------|-----------------------------------------------|

pub mod code;
pub mod ids;
pub mod path;

pub use code::ErrorCode;
pub use ids::{HolderId, TransactionId, WatcherId};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
