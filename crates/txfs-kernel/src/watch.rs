//! Watch manager: path-indexed change notification.
//!
//! Watchers register on an exact normalized path. When the facade reports a
//! mutation of `affected`, delivery goes to:
//!
//! 1. watchers registered on `affected` itself,
//! 2. watchers on the immediate parent directory (recursive or not),
//! 3. recursive watchers on every further ancestor.
//!
//! The delivered `filename` is the basename for (1) and (2), and the path
//! relative to the watched ancestor for (3).
//!
//! # Delivery
//!
//! Each watcher owns an unbounded channel, so `emit` never runs watcher code
//! on the mutating call's stack. Callback listeners are driven by a spawned
//! task that wraps every invocation in `catch_unwind`: a panicking listener
//! is logged and skipped, and other watchers are unaffected.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use txfs_types::{path, WatcherId};

/// Kind of change, mirroring `fs.watch` semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WatchEventType {
    /// Contents or metadata of an existing entry changed.
    Change,
    /// An entry appeared, disappeared or moved.
    Rename,
}

/// A delivered change notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened.
    pub event_type: WatchEventType,
    /// Name relative to the watched path (basename for direct matches).
    pub filename: String,
    /// Absolute normalized path that changed.
    pub path: String,
}

/// Registration options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Also receive events from deeper descendants.
    pub recursive: bool,
}

impl WatchOptions {
    /// Recursive watch.
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

struct Registration {
    id: WatcherId,
    recursive: bool,
    tx: mpsc::UnboundedSender<WatchEvent>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Index {
    by_path: HashMap<String, Vec<Registration>>,
    paths_by_id: HashMap<WatcherId, String>,
}

impl Index {
    fn remove(&mut self, id: WatcherId) -> bool {
        let Some(watched) = self.paths_by_id.remove(&id) else {
            return false;
        };
        if let Some(regs) = self.by_path.get_mut(&watched) {
            if let Some(pos) = regs.iter().position(|r| r.id == id) {
                regs.remove(pos).cancel.cancel();
            }
            if regs.is_empty() {
                self.by_path.remove(&watched);
            }
        }
        true
    }
}

/// Path-indexed registry of active watchers.
pub struct WatchManager {
    index: Arc<RwLock<Index>>,
    enabled: bool,
}

impl std::fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchManager")
            .field("watchers", &self.watcher_count())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchManager {
    /// Create an empty manager that delivers events.
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// Create a manager; when `enabled` is false, `emit` is a no-op.
    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            index: Arc::new(RwLock::new(Index::default())),
            enabled,
        }
    }

    /// Register a channel-backed watcher on `watched`.
    pub fn watch(&self, watched: &str, options: WatchOptions) -> Watcher {
        let watched = path::normalize(watched);
        let id = WatcherId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let mut index = self.index.write();
        index
            .by_path
            .entry(watched.clone())
            .or_default()
            .push(Registration {
                id,
                recursive: options.recursive,
                tx,
                cancel: cancel.clone(),
            });
        index.paths_by_id.insert(id, watched.clone());
        tracing::debug!(watcher = %id, path = %watched, recursive = options.recursive, "watcher registered");

        Watcher {
            id,
            path: watched,
            rx,
            cancel,
            index: Arc::downgrade(&self.index),
        }
    }

    /// Register a callback listener.
    ///
    /// Must be called from within a Tokio runtime: the listener runs on a
    /// spawned task, never on the mutating caller's stack.
    pub fn watch_with_listener<F>(&self, watched: &str, options: WatchOptions, listener: F) -> WatcherId
    where
        F: Fn(WatchEvent) + Send + Sync + 'static,
    {
        let mut watcher = self.watch(watched, options);
        let id = watcher.id();
        tokio::spawn(async move {
            while let Some(event) = watcher.recv().await {
                let filename = event.filename.clone();
                if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                    tracing::warn!(watcher = %id, filename = %filename, "watch listener panicked; continuing");
                }
            }
        });
        id
    }

    /// Unregister a watcher and sever its signal.
    ///
    /// Returns false if the id was not registered.
    pub fn remove_watcher(&self, id: WatcherId) -> bool {
        let removed = self.index.write().remove(id);
        if removed {
            tracing::debug!(watcher = %id, "watcher removed");
        }
        removed
    }

    /// Number of live registrations.
    pub fn watcher_count(&self) -> usize {
        self.index.read().paths_by_id.len()
    }

    /// Returns true if any watcher is registered exactly on `watched`.
    pub fn is_watched(&self, watched: &str) -> bool {
        self.index
            .read()
            .by_path
            .get(&path::normalize(watched))
            .is_some_and(|regs| !regs.is_empty())
    }

    /// Announce a change of `affected` (a normalized absolute path).
    ///
    /// Returns the number of watchers the event was queued for.
    pub fn emit(&self, event_type: WatchEventType, affected: &str) -> usize {
        if !self.enabled {
            return 0;
        }
        let index = self.index.read();
        if index.by_path.is_empty() {
            return 0;
        }

        let basename = path::basename(affected);
        let mut delivered = 0;
        let mut send = |reg: &Registration, filename: &str| {
            if reg.cancel.is_cancelled() {
                return;
            }
            let event = WatchEvent {
                event_type,
                filename: filename.to_string(),
                path: affected.to_string(),
            };
            // A dropped receiver is not an error for the emitter.
            if reg.tx.send(event).is_ok() {
                delivered += 1;
            }
        };

        if let Some(regs) = index.by_path.get(affected) {
            for reg in regs {
                send(reg, basename);
            }
        }

        for (depth, ancestor) in path::ancestors(affected).enumerate() {
            let Some(regs) = index.by_path.get(ancestor) else {
                continue;
            };
            for reg in regs {
                if depth == 0 {
                    send(reg, basename);
                } else if reg.recursive {
                    let relative = path::relative(ancestor, affected).unwrap_or(basename);
                    send(reg, relative);
                }
            }
        }

        tracing::trace!(%event_type, path = %affected, delivered, "watch event emitted");
        delivered
    }
}

/// Receiving end of a registration.
///
/// Dropping the watcher unregisters it.
pub struct Watcher {
    id: WatcherId,
    path: String,
    rx: mpsc::UnboundedReceiver<WatchEvent>,
    cancel: CancellationToken,
    index: Weak<RwLock<Index>>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Registration id (pass to `remove_watcher`).
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// The watched path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Abort signal for this watcher; cancelled on removal or close.
    pub fn signal(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns true once the watcher has been closed or removed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the watcher is closed or removed.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Unregister and sever the signal.
    pub fn close(&self) {
        self.cancel.cancel();
        if let Some(index) = self.index.upgrade() {
            index.write().remove(self.id);
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_event_type_strings() {
        assert_eq!(WatchEventType::Change.to_string(), "change");
        assert_eq!("rename".parse::<WatchEventType>().unwrap(), WatchEventType::Rename);
    }

    #[tokio::test]
    async fn test_exact_path_delivery() {
        let manager = WatchManager::new();
        let mut watcher = manager.watch("/a/b.txt", WatchOptions::default());

        assert_eq!(manager.emit(WatchEventType::Change, "/a/b.txt"), 1);
        let event = watcher.recv().await.unwrap();
        assert_eq!(event.event_type, WatchEventType::Change);
        assert_eq!(event.filename, "b.txt");
        assert_eq!(event.path, "/a/b.txt");
    }

    #[tokio::test]
    async fn test_parent_receives_regardless_of_recursive() {
        let manager = WatchManager::new();
        let mut parent = manager.watch("/a", WatchOptions::default());

        manager.emit(WatchEventType::Rename, "/a/new.txt");
        assert_eq!(parent.recv().await.unwrap().filename, "new.txt");

        // grandchild does not reach a non-recursive watcher
        assert_eq!(manager.emit(WatchEventType::Rename, "/a/sub/deep.txt"), 0);
        assert!(parent.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_recursive_ancestor_gets_relative_name() {
        let manager = WatchManager::new();
        let mut root = manager.watch("/", WatchOptions::recursive());

        manager.emit(WatchEventType::Change, "/a/sub/deep.txt");
        let event = root.recv().await.unwrap();
        assert_eq!(event.filename, "a/sub/deep.txt");
    }

    #[tokio::test]
    async fn test_emit_is_deferred_and_unrelated_paths_ignored() {
        let manager = WatchManager::new();
        let mut watcher = manager.watch("/x", WatchOptions::recursive());
        assert_eq!(manager.emit(WatchEventType::Change, "/y/file"), 0);
        assert_eq!(manager.emit(WatchEventType::Change, "/xy"), 0);
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_remove_watcher_severs_signal() {
        let manager = WatchManager::new();
        let mut watcher = manager.watch("/a", WatchOptions::default());
        let signal = watcher.signal();

        assert!(manager.remove_watcher(watcher.id()));
        assert!(signal.is_cancelled());
        assert!(!manager.remove_watcher(watcher.id()));
        assert_eq!(manager.emit(WatchEventType::Change, "/a"), 0);
        assert!(watcher.recv().await.is_none());
        assert_eq!(manager.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let manager = WatchManager::new();
        {
            let _watcher = manager.watch("/a", WatchOptions::default());
            assert!(manager.is_watched("/a"));
        }
        assert!(!manager.is_watched("/a"));
    }

    #[tokio::test]
    async fn test_disabled_manager_emits_nothing() {
        let manager = WatchManager::with_enabled(false);
        let mut watcher = manager.watch("/a", WatchOptions::default());
        assert_eq!(manager.emit(WatchEventType::Change, "/a"), 0);
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_break_others() {
        let manager = WatchManager::new();
        let hits = Arc::new(AtomicUsize::new(0));

        manager.watch_with_listener("/a", WatchOptions::default(), |_| {
            panic!("listener failure");
        });
        let counter = Arc::clone(&hits);
        manager.watch_with_listener("/a", WatchOptions::default(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(manager.emit(WatchEventType::Change, "/a/f"), 2);
        assert_eq!(manager.emit(WatchEventType::Change, "/a/g"), 2);

        for _ in 0..50 {
            if hits.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
