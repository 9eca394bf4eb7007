//! Lock files: git-style `<path>.lock` mutual exclusion.
//!
//! # Architecture
//!
//! A [`LockRegistry`] is the one shared piece of lock state. It is passed
//! explicitly (as `Arc<LockRegistry>`) into every [`LockFile`], so separate
//! registries are fully isolated from each other.
//!
//! Ownership is proven by [`HolderId`], never by lock path alone: release,
//! refresh and staging only touch an entry still owned by the caller, so a
//! holder whose lock was broken or superseded cannot disturb the new owner.
//!
//! # Protocol
//!
//! 1. `acquire` claims `<path><extension>` in the registry (compare-and-insert).
//! 2. `write` stages bytes in the registry entry.
//! 3. `commit` writes the lock path through the backend, then renames it
//!    over the target as the final step. Readers of the target never see a
//!    partial write.
//!
//! # Invariants
//!
//! - At most one live entry per lock path.
//! - A stale entry (age above a positive threshold) is replaced in the same
//!   map operation that detects it. Ages run on the Tokio clock, so a
//!   paused or advanced test clock moves them; `created_at` stays wall
//!   clock for reporting.
//! - Dropping a held `LockFile` releases it (RAII pattern).

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use txfs_types::{now_millis, path, ErrorCode, HolderId};

use crate::config::LockConfig;
use crate::vfs::{access, FsBackend, VfsError, WriteOptions};

/// Lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock already held by this instance: {0}")]
    AlreadyHeld(String),

    #[error("lock not held: {0}")]
    NotLocked(String),

    #[error("lock is held by another holder: {0}")]
    WouldBlock(String),

    #[error("timed out after {timeout_ms}ms waiting for lock: {path}")]
    TimedOut { path: String, timeout_ms: u64 },

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

impl LockError {
    /// The machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            LockError::AlreadyHeld(_) => ErrorCode::Ealready,
            LockError::NotLocked(_) => ErrorCode::Enotlocked,
            LockError::WouldBlock(_) => ErrorCode::Ewouldblock,
            LockError::TimedOut { .. } => ErrorCode::Etimedout,
            LockError::Vfs(e) => e.code(),
        }
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Acquisition parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockOptions {
    /// Total wait budget. Zero fails immediately with `EWOULDBLOCK`.
    pub timeout: Duration,
    /// First sleep between attempts.
    pub retry_interval: Duration,
    /// Upper bound for the sleep.
    pub max_retry_interval: Duration,
    /// Growth factor per attempt; 1.0 keeps the interval fixed.
    pub backoff_multiplier: f64,
    /// Entries older than this may be superseded. Zero disables.
    pub stale_threshold: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from(&LockConfig::default())
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            retry_interval: Duration::from_millis(config.retry_interval_ms),
            max_retry_interval: Duration::from_millis(config.max_retry_interval_ms),
            backoff_multiplier: config.backoff_multiplier,
            stale_threshold: Duration::from_millis(config.stale_threshold_ms),
        }
    }
}

impl LockOptions {
    /// Wait up to `timeout` for the lock.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the first retry sleep.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Grow the sleep by `multiplier` per attempt, capped at `max`.
    pub fn with_backoff(mut self, multiplier: f64, max: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_retry_interval = max;
        self
    }

    /// Supersede entries older than `threshold`.
    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        let multiplier = self.backoff_multiplier;
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return current;
        }
        Duration::try_from_secs_f64(current.as_secs_f64() * multiplier)
            .unwrap_or(self.max_retry_interval)
            .min(self.max_retry_interval.max(current))
    }
}

/// Snapshot of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Target path the lock protects.
    pub path: String,
    /// `path` plus the lock extension.
    pub lock_path: String,
    /// Current owner.
    pub holder: HolderId,
    /// Unix millis of acquisition or last refresh.
    pub created_at: u64,
    /// Size of the staged payload, if any.
    pub staged_bytes: Option<usize>,
}

#[derive(Debug, Clone)]
struct LockEntry {
    path: String,
    holder: HolderId,
    created_at: u64,
    acquired: Instant,
    staged: Option<Vec<u8>>,
}

impl LockEntry {
    fn new(path: &str, holder: HolderId) -> Self {
        Self {
            path: path.to_string(),
            holder,
            created_at: now_millis(),
            acquired: Instant::now(),
            staged: None,
        }
    }

    fn age(&self) -> Duration {
        self.acquired.elapsed()
    }

    fn info(&self, lock_path: &str) -> LockInfo {
        LockInfo {
            path: self.path.clone(),
            lock_path: lock_path.to_string(),
            holder: self.holder,
            created_at: self.created_at,
            staged_bytes: self.staged.as_ref().map(Vec::len),
        }
    }
}

/// Outcome of a single claim attempt.
#[derive(Debug)]
enum Claim {
    Acquired { created_at: u64 },
    Superseded { created_at: u64, previous: HolderId, age_ms: u64 },
    Held { holder: HolderId },
}

/// Shared store of live locks, keyed by lock path.
#[derive(Debug)]
pub struct LockRegistry {
    entries: DashMap<String, LockEntry>,
    extension: String,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LockRegistry {
    /// Registry using the `.lock` extension.
    pub fn new() -> Self {
        Self::with_extension(".lock")
    }

    /// Registry using a custom extension.
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            entries: DashMap::new(),
            extension: extension.into(),
        }
    }

    /// Registry configured from `[lock]`.
    pub fn from_config(config: &LockConfig) -> Self {
        Self::with_extension(config.extension.clone())
    }

    /// The extension appended to target paths.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Lock path for a target path.
    pub fn lock_path(&self, target: &str) -> String {
        self.lock_path_with_extension(target, &self.extension)
    }

    /// Lock path for a target path under an explicit extension.
    pub fn lock_path_with_extension(&self, target: &str, extension: &str) -> String {
        format!("{}{extension}", path::normalize(target))
    }

    /// Returns true if `target` is currently locked.
    pub fn is_locked(&self, target: &str) -> bool {
        self.is_locked_with_extension(target, &self.extension)
    }

    /// Like [`is_locked`](Self::is_locked), for locks taken with
    /// [`LockFile::with_extension`].
    pub fn is_locked_with_extension(&self, target: &str, extension: &str) -> bool {
        self.entries
            .contains_key(&self.lock_path_with_extension(target, extension))
    }

    /// Details of the lock on `target`, if any.
    pub fn get_lock_info(&self, target: &str) -> Option<LockInfo> {
        self.get_lock_info_with_extension(target, &self.extension)
    }

    /// Details of the lock on `target` under `extension`, if any.
    pub fn get_lock_info_with_extension(&self, target: &str, extension: &str) -> Option<LockInfo> {
        let lock_path = self.lock_path_with_extension(target, extension);
        self.entries.get(&lock_path).map(|e| e.info(&lock_path))
    }

    /// Forcibly remove the lock on `target`, whoever holds it.
    ///
    /// Administrative: the previous holder is not notified and will find
    /// its lock gone on release.
    pub fn break_lock(&self, target: &str) -> bool {
        self.break_lock_with_extension(target, &self.extension)
    }

    /// Forcibly remove the lock on `target` under `extension`.
    pub fn break_lock_with_extension(&self, target: &str, extension: &str) -> bool {
        let lock_path = self.lock_path_with_extension(target, extension);
        match self.entries.remove(&lock_path) {
            Some((_, entry)) => {
                tracing::warn!(path = %entry.path, holder = %entry.holder, "lock broken");
                true
            }
            None => false,
        }
    }

    /// Remove every entry older than `threshold`.
    ///
    /// Returns the target paths (not lock paths) that were cleaned, sorted.
    pub fn cleanup_stale_locks(&self, threshold: Duration) -> Vec<String> {
        let mut cleaned = Vec::new();
        self.entries.retain(|_, entry| {
            let stale = entry.age() > threshold;
            if stale {
                cleaned.push(entry.path.clone());
            }
            !stale
        });
        cleaned.sort();
        if !cleaned.is_empty() {
            tracing::warn!(
                count = cleaned.len(),
                threshold_ms = threshold.as_millis() as u64,
                "cleaned stale locks"
            );
        }
        cleaned
    }

    /// Every live lock, ordered by target path.
    pub fn get_all_locks(&self) -> Vec<LockInfo> {
        let mut all: Vec<LockInfo> = self
            .entries
            .iter()
            .map(|e| e.value().info(e.key()))
            .collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Number of live locks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no lock is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn claim(&self, lock_path: &str, target: &str, holder: HolderId, stale_threshold: Duration) -> Claim {
        match self.entries.entry(lock_path.to_string()) {
            Entry::Vacant(vacant) => {
                let entry = LockEntry::new(target, holder);
                let created_at = entry.created_at;
                vacant.insert(entry);
                Claim::Acquired { created_at }
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let age = current.age();
                if !stale_threshold.is_zero() && age > stale_threshold {
                    let age_ms = age.as_millis() as u64;
                    let entry = LockEntry::new(target, holder);
                    let created_at = entry.created_at;
                    let previous = occupied.insert(entry).holder;
                    Claim::Superseded {
                        created_at,
                        previous,
                        age_ms,
                    }
                } else {
                    Claim::Held {
                        holder: current.holder,
                    }
                }
            }
        }
    }

    fn remove_if_holder(&self, lock_path: &str, holder: HolderId) -> bool {
        self.entries
            .remove_if(lock_path, |_, entry| entry.holder == holder)
            .is_some()
    }

    fn stage(&self, lock_path: &str, holder: HolderId, data: Vec<u8>) -> bool {
        match self.entries.get_mut(lock_path) {
            Some(mut entry) if entry.holder == holder => {
                entry.staged = Some(data);
                true
            }
            _ => false,
        }
    }

    fn touch(&self, lock_path: &str, holder: HolderId) -> Option<u64> {
        match self.entries.get_mut(lock_path) {
            Some(mut entry) if entry.holder == holder => {
                entry.created_at = now_millis();
                entry.acquired = Instant::now();
                Some(entry.created_at)
            }
            _ => None,
        }
    }
}

/// Exclusive claim over one target path.
pub struct LockFile {
    backend: Arc<dyn FsBackend>,
    registry: Arc<LockRegistry>,
    path: String,
    lock_path: String,
    holder: HolderId,
    created_at: Option<u64>,
}

impl std::fmt::Debug for LockFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFile")
            .field("path", &self.path)
            .field("lock_path", &self.lock_path)
            .field("holder", &self.holder)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl LockFile {
    /// Lock handle for `target`, using the registry's extension.
    ///
    /// Nothing is claimed until [`acquire`](Self::acquire).
    pub fn new(backend: Arc<dyn FsBackend>, registry: Arc<LockRegistry>, target: &str) -> Self {
        let path = path::normalize(target);
        let lock_path = format!("{path}{}", registry.extension());
        Self {
            backend,
            registry,
            path,
            lock_path,
            holder: HolderId::new(),
            created_at: None,
        }
    }

    /// Use a different extension for this lock.
    ///
    /// Must be called before acquiring. Registry queries for such a lock
    /// go through the `*_with_extension` variants.
    pub fn with_extension(mut self, extension: &str) -> Self {
        if self.created_at.is_none() {
            self.lock_path = format!("{}{extension}", self.path);
        }
        self
    }

    /// Target path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Target path plus extension.
    pub fn lock_path(&self) -> &str {
        &self.lock_path
    }

    /// This instance's identity.
    pub fn holder_id(&self) -> HolderId {
        self.holder
    }

    /// Returns true between a successful acquire and release/commit.
    pub fn is_held(&self) -> bool {
        self.created_at.is_some()
    }

    /// Unix millis of acquisition (or last refresh), while held.
    pub fn created_at(&self) -> Option<u64> {
        self.created_at
    }

    /// Claim the lock.
    ///
    /// # Errors
    ///
    /// - `EALREADY` if this instance already holds it
    /// - `ENOENT` if the parent is missing or not a directory
    /// - `EACCES` if the parent is not writable
    /// - `EWOULDBLOCK` if held elsewhere and `timeout` is zero
    /// - `ETIMEDOUT` if still held elsewhere when `timeout` runs out
    #[tracing::instrument(skip(self, options), fields(path = %self.path, holder = %self.holder))]
    pub async fn acquire(&mut self, options: LockOptions) -> LockResult<()> {
        if self.is_held() {
            return Err(LockError::AlreadyHeld(self.path.clone()));
        }
        self.validate_parent().await?;

        let start = Instant::now();
        let mut interval = options.retry_interval;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self
                .registry
                .claim(&self.lock_path, &self.path, self.holder, options.stale_threshold)
            {
                Claim::Acquired { created_at } => {
                    self.created_at = Some(created_at);
                    tracing::debug!(attempts, "lock acquired");
                    return Ok(());
                }
                Claim::Superseded {
                    created_at,
                    previous,
                    age_ms,
                } => {
                    tracing::warn!(%previous, age_ms, "superseded stale lock");
                    self.created_at = Some(created_at);
                    return Ok(());
                }
                Claim::Held { holder } => {
                    tracing::trace!(%holder, attempts, "lock busy");
                }
            }

            if options.timeout.is_zero() {
                return Err(LockError::WouldBlock(self.path.clone()));
            }
            let elapsed = start.elapsed();
            if elapsed >= options.timeout {
                return Err(LockError::TimedOut {
                    path: self.path.clone(),
                    timeout_ms: options.timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(interval.min(options.timeout - elapsed)).await;
            interval = options.next_interval(interval);
        }
    }

    /// Give up the lock.
    ///
    /// The registry entry is removed only if still owned by this holder;
    /// the instance becomes unheld either way.
    pub fn release(&mut self) -> LockResult<()> {
        if !self.is_held() {
            return Err(LockError::NotLocked(self.path.clone()));
        }
        let removed = self.registry.remove_if_holder(&self.lock_path, self.holder);
        if !removed {
            tracing::debug!(path = %self.path, "lock was broken or superseded before release");
        }
        self.created_at = None;
        Ok(())
    }

    /// Stage bytes in the registry entry. No filesystem access.
    pub fn write(&self, data: impl Into<Vec<u8>>) -> LockResult<()> {
        if !self.is_held() {
            return Err(LockError::NotLocked(self.path.clone()));
        }
        if !self.registry.stage(&self.lock_path, self.holder, data.into()) {
            tracing::debug!(path = %self.path, "staging skipped: lock no longer owned");
        }
        Ok(())
    }

    /// Reset the entry's age so staleness checks do not fire.
    pub fn refresh(&mut self) -> LockResult<()> {
        if !self.is_held() {
            return Err(LockError::NotLocked(self.path.clone()));
        }
        if let Some(created_at) = self.registry.touch(&self.lock_path, self.holder) {
            self.created_at = Some(created_at);
        }
        Ok(())
    }

    /// Publish `data` at the target path and release.
    ///
    /// Writes the lock path, then renames it over the target. On failure
    /// the lock file is removed (best effort), the lock is released and
    /// the backend error is returned.
    pub async fn commit(&mut self, data: &[u8]) -> LockResult<()> {
        if !self.is_held() {
            return Err(LockError::NotLocked(self.path.clone()));
        }

        let published = async {
            self.backend
                .write_file(&self.lock_path, data, WriteOptions::default())
                .await?;
            self.backend.rename(&self.lock_path, &self.path).await
        }
        .await;

        if let Err(e) = published {
            match self.backend.unlink(&self.lock_path).await {
                Ok(()) => {}
                Err(cleanup) if cleanup.is(ErrorCode::Enoent) => {}
                Err(cleanup) => {
                    tracing::warn!(lock_path = %self.lock_path, error = %cleanup, "failed to remove lock file after failed commit");
                }
            }
            self.registry.remove_if_holder(&self.lock_path, self.holder);
            self.created_at = None;
            return Err(e.into());
        }

        self.registry.remove_if_holder(&self.lock_path, self.holder);
        self.created_at = None;
        tracing::debug!(path = %self.path, bytes = data.len(), "lock committed");
        Ok(())
    }

    async fn validate_parent(&self) -> LockResult<()> {
        let parent = path::parent(&self.path);
        let attr = match self.backend.stat(parent).await {
            Ok(attr) => attr,
            Err(VfsError::NotFound(_)) => return Err(VfsError::not_found(parent).into()),
            Err(e) => return Err(e.into()),
        };
        if !attr.is_dir() {
            return Err(VfsError::not_found(format!("{parent} (not a directory)")).into());
        }
        self.backend.access(parent, access::W_OK).await.map_err(|e| match e {
            VfsError::PermissionDenied(_) => LockError::from(VfsError::permission_denied(parent)),
            other => other.into(),
        })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.is_held() {
            self.registry.remove_if_holder(&self.lock_path, self.holder);
            tracing::trace!(path = %self.path, "lock released on drop");
        }
    }
}
