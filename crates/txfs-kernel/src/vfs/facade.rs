//! The `Vfs` facade.
//!
//! Normalizes every path, delegates to the backend and, once the backend
//! call has succeeded, announces the mutation to the watch manager:
//!
//! | Call                                   | Event                        |
//! |----------------------------------------|------------------------------|
//! | write/append/copy onto existing file   | `change`                     |
//! | write/append/copy creating a file      | `rename`                     |
//! | mkdir, rm, unlink, rmdir, symlink, link| `rename`                     |
//! | rename                                 | `rename` on both paths       |
//! | chmod, chown, utimes, truncate         | `change`                     |

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use txfs_types::{path, WatcherId};

use super::backend::FsBackend;
use super::backends::MemoryBackend;
use super::flags::OpenFlags;
use super::handle::FileHandle;
use super::types::{
    DirEntry, FileAttr, MkdirOptions, ReaddirOptions, RmOptions, RmdirOptions, WriteFlag, WriteOptions,
};
use super::{VfsError, VfsResult};
use crate::config::TxfsConfig;
use crate::lock::{LockFile, LockOptions, LockRegistry};
use crate::tx::{Capability, Transaction, TxStorage};
use crate::watch::{WatchEvent, WatchEventType, WatchManager, WatchOptions, Watcher};

/// POSIX-like filesystem over a pluggable backend.
///
/// Cheap to clone; clones share the backend, watchers and lock registry.
#[derive(Clone)]
pub struct Vfs {
    backend: Arc<dyn FsBackend>,
    watches: Arc<WatchManager>,
    locks: Arc<LockRegistry>,
    config: Arc<TxfsConfig>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("watches", &self.watches)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl Vfs {
    /// Facade over `backend` with default configuration.
    pub fn new(backend: Arc<dyn FsBackend>) -> Self {
        Self::with_backend(backend, TxfsConfig::default())
    }

    /// Facade over a fresh in-memory backend.
    pub fn memory() -> Self {
        Self::with_config(TxfsConfig::default())
    }

    /// In-memory facade using `config` for modes, locks and watching.
    pub fn with_config(config: TxfsConfig) -> Self {
        let backend = MemoryBackend::with_modes(config.fs.default_file_mode, config.fs.default_dir_mode);
        Self::with_backend(Arc::new(backend), config)
    }

    /// Facade over `backend` using `config` for locks and watching.
    pub fn with_backend(backend: Arc<dyn FsBackend>, config: TxfsConfig) -> Self {
        Self {
            backend,
            watches: Arc::new(WatchManager::with_enabled(config.watch.enabled)),
            locks: Arc::new(LockRegistry::from_config(&config.lock)),
            config: Arc::new(config),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &TxfsConfig {
        &self.config
    }

    /// The shared lock registry.
    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn FsBackend> {
        &self.backend
    }

    fn emit(&self, event_type: WatchEventType, affected: &str) {
        self.watches.emit(event_type, affected);
    }

    async fn existed(&self, p: &str) -> VfsResult<bool> {
        self.backend.exists(p).await
    }

    // ========================================================================
    // Reading
    // ========================================================================

    pub async fn read_file(&self, p: &str) -> VfsResult<Vec<u8>> {
        self.backend.read_file(&path::normalize(p)).await
    }

    /// Read a file as UTF-8.
    pub async fn read_to_string(&self, p: &str) -> VfsResult<String> {
        let p = path::normalize(p);
        let data = self.backend.read_file(&p).await?;
        String::from_utf8(data).map_err(|_| VfsError::invalid_argument(format!("{p}: not valid UTF-8")))
    }

    pub async fn readdir(&self, p: &str, options: ReaddirOptions) -> VfsResult<Vec<DirEntry>> {
        self.backend.readdir(&path::normalize(p), options).await
    }

    pub async fn stat(&self, p: &str) -> VfsResult<FileAttr> {
        self.backend.stat(&path::normalize(p)).await
    }

    pub async fn lstat(&self, p: &str) -> VfsResult<FileAttr> {
        self.backend.lstat(&path::normalize(p)).await
    }

    pub async fn exists(&self, p: &str) -> VfsResult<bool> {
        self.backend.exists(&path::normalize(p)).await
    }

    pub async fn access(&self, p: &str, mode: u32) -> VfsResult<()> {
        self.backend.access(&path::normalize(p), mode).await
    }

    pub async fn readlink(&self, p: &str) -> VfsResult<String> {
        self.backend.readlink(&path::normalize(p)).await
    }

    pub async fn realpath(&self, p: &str) -> VfsResult<String> {
        self.backend.realpath(&path::normalize(p)).await
    }

    // ========================================================================
    // Writing
    // ========================================================================

    pub async fn write_file(&self, p: &str, data: &[u8], options: WriteOptions) -> VfsResult<()> {
        let p = path::normalize(p);
        let existed = self.existed(&p).await?;
        self.backend.write_file(&p, data, options).await?;
        self.emit(
            if existed {
                WatchEventType::Change
            } else {
                WatchEventType::Rename
            },
            &p,
        );
        Ok(())
    }

    /// Append to a file, creating it if needed.
    pub async fn append_file(&self, p: &str, data: &[u8]) -> VfsResult<()> {
        self.write_file(
            p,
            data,
            WriteOptions {
                flag: WriteFlag::Append,
                mode: None,
            },
        )
        .await
    }

    pub async fn unlink(&self, p: &str) -> VfsResult<()> {
        let p = path::normalize(p);
        self.backend.unlink(&p).await?;
        self.emit(WatchEventType::Rename, &p);
        Ok(())
    }

    pub async fn rename(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        let old_path = path::normalize(old_path);
        let new_path = path::normalize(new_path);
        self.backend.rename(&old_path, &new_path).await?;
        self.emit(WatchEventType::Rename, &old_path);
        self.emit(WatchEventType::Rename, &new_path);
        Ok(())
    }

    pub async fn copy_file(&self, src: &str, dest: &str) -> VfsResult<()> {
        let src = path::normalize(src);
        let dest = path::normalize(dest);
        let existed = self.existed(&dest).await?;
        self.backend.copy_file(&src, &dest).await?;
        self.emit(
            if existed {
                WatchEventType::Change
            } else {
                WatchEventType::Rename
            },
            &dest,
        );
        Ok(())
    }

    pub async fn mkdir(&self, p: &str, options: MkdirOptions) -> VfsResult<()> {
        let p = path::normalize(p);
        let existed = self.existed(&p).await?;
        self.backend.mkdir(&p, options).await?;
        if !existed {
            self.emit(WatchEventType::Rename, &p);
        }
        Ok(())
    }

    pub async fn rmdir(&self, p: &str, options: RmdirOptions) -> VfsResult<()> {
        let p = path::normalize(p);
        self.backend.rmdir(&p, options).await?;
        self.emit(WatchEventType::Rename, &p);
        Ok(())
    }

    /// Remove a file or (with `recursive`) a directory tree.
    ///
    /// With `force`, a missing path is not an error. A directory without
    /// `recursive` fails with `EISDIR`.
    pub async fn rm(&self, p: &str, options: RmOptions) -> VfsResult<()> {
        let p = path::normalize(p);
        let attr = match self.backend.lstat(&p).await {
            Ok(attr) => attr,
            Err(VfsError::NotFound(_)) if options.force => return Ok(()),
            Err(e) => return Err(e),
        };
        if attr.is_dir() {
            if !options.recursive {
                return Err(VfsError::is_a_directory(p));
            }
            self.backend.rmdir(&p, RmdirOptions { recursive: true }).await?;
        } else {
            self.backend.unlink(&p).await?;
        }
        self.emit(WatchEventType::Rename, &p);
        Ok(())
    }

    pub async fn truncate(&self, p: &str, len: u64) -> VfsResult<()> {
        let p = path::normalize(p);
        self.backend.truncate(&p, len).await?;
        self.emit(WatchEventType::Change, &p);
        Ok(())
    }

    // ========================================================================
    // Metadata and links
    // ========================================================================

    pub async fn chmod(&self, p: &str, mode: u32) -> VfsResult<()> {
        let p = path::normalize(p);
        self.backend.chmod(&p, mode).await?;
        self.emit(WatchEventType::Change, &p);
        Ok(())
    }

    pub async fn chown(&self, p: &str, uid: u32, gid: u32) -> VfsResult<()> {
        let p = path::normalize(p);
        self.backend.chown(&p, uid, gid).await?;
        self.emit(WatchEventType::Change, &p);
        Ok(())
    }

    pub async fn utimes(&self, p: &str, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        let p = path::normalize(p);
        self.backend.utimes(&p, atime, mtime).await?;
        self.emit(WatchEventType::Change, &p);
        Ok(())
    }

    /// Create a symlink at `p` pointing to `target` (stored verbatim).
    pub async fn symlink(&self, target: &str, p: &str) -> VfsResult<()> {
        let p = path::normalize(p);
        self.backend.symlink(target, &p).await?;
        self.emit(WatchEventType::Rename, &p);
        Ok(())
    }

    pub async fn link(&self, existing: &str, new_path: &str) -> VfsResult<()> {
        let existing = path::normalize(existing);
        let new_path = path::normalize(new_path);
        self.backend.link(&existing, &new_path).await?;
        self.emit(WatchEventType::Rename, &new_path);
        Ok(())
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// Open a file.
    ///
    /// # Errors
    ///
    /// - `ENOENT` if missing and `flags.create` is false
    /// - `EEXIST` if present and opened with create + exclusive
    /// - `EISDIR` if a directory is opened for writing
    pub async fn open(&self, p: &str, flags: OpenFlags, mode: Option<u32>) -> VfsResult<FileHandle> {
        let p = path::normalize(p);
        match self.backend.stat(&p).await {
            Ok(attr) => {
                if flags.create && flags.exclusive {
                    return Err(VfsError::already_exists(p));
                }
                if attr.is_dir() && flags.access_mode.can_write() {
                    return Err(VfsError::is_a_directory(p));
                }
                if flags.truncate && flags.access_mode.can_write() && attr.size > 0 {
                    self.truncate(&p, 0).await?;
                }
            }
            Err(VfsError::NotFound(_)) if flags.create => {
                let options = WriteOptions {
                    mode,
                    flag: WriteFlag::Exclusive,
                };
                self.write_file(&p, &[], options).await?;
            }
            Err(e) => return Err(e),
        }
        tracing::trace!(path = %p, ?flags, "opened");
        Ok(FileHandle::new(self.clone(), p, flags))
    }

    /// Open with string flags (`"r"`, `"w+"`, `"ax"`, ...).
    pub async fn open_with(&self, p: &str, flags: &str, mode: Option<u32>) -> VfsResult<FileHandle> {
        self.open(p, OpenFlags::parse(flags)?, mode).await
    }

    // ========================================================================
    // Watching
    // ========================================================================

    /// Watch `p` for changes.
    pub fn watch(&self, p: &str, options: WatchOptions) -> Watcher {
        self.watches.watch(p, options)
    }

    /// Watch `p` with a callback. Must be called within a Tokio runtime.
    pub fn watch_with_listener<F>(&self, p: &str, options: WatchOptions, listener: F) -> WatcherId
    where
        F: Fn(WatchEvent) + Send + Sync + 'static,
    {
        self.watches.watch_with_listener(p, options, listener)
    }

    /// Unregister a watcher.
    pub fn remove_watcher(&self, id: WatcherId) -> bool {
        self.watches.remove_watcher(id)
    }

    /// The watch manager.
    pub fn watches(&self) -> &Arc<WatchManager> {
        &self.watches
    }

    // ========================================================================
    // Locks and transactions
    // ========================================================================

    /// Lock handle for `p`, committing through this facade.
    pub fn lock(&self, p: &str) -> LockFile {
        let backend: Arc<dyn FsBackend> = Arc::new(self.clone());
        LockFile::new(backend, Arc::clone(&self.locks), p)
    }

    /// Acquisition options from the `[lock]` configuration.
    pub fn lock_options(&self) -> LockOptions {
        LockOptions::from(&self.config.lock)
    }

    /// New empty transaction; execute it with `tx.execute(&vfs)`.
    pub fn transaction(&self) -> Transaction {
        Transaction::new()
    }
}

/// The facade is itself a backend, so locks and nested facades see
/// normalized paths and emit events.
#[async_trait]
impl FsBackend for Vfs {
    async fn read_file(&self, p: &str) -> VfsResult<Vec<u8>> {
        Vfs::read_file(self, p).await
    }

    async fn readdir(&self, p: &str, options: ReaddirOptions) -> VfsResult<Vec<DirEntry>> {
        Vfs::readdir(self, p, options).await
    }

    async fn stat(&self, p: &str) -> VfsResult<FileAttr> {
        Vfs::stat(self, p).await
    }

    async fn lstat(&self, p: &str) -> VfsResult<FileAttr> {
        Vfs::lstat(self, p).await
    }

    async fn access(&self, p: &str, mode: u32) -> VfsResult<()> {
        Vfs::access(self, p, mode).await
    }

    async fn readlink(&self, p: &str) -> VfsResult<String> {
        Vfs::readlink(self, p).await
    }

    async fn realpath(&self, p: &str) -> VfsResult<String> {
        Vfs::realpath(self, p).await
    }

    async fn write_file(&self, p: &str, data: &[u8], options: WriteOptions) -> VfsResult<()> {
        Vfs::write_file(self, p, data, options).await
    }

    async fn unlink(&self, p: &str) -> VfsResult<()> {
        Vfs::unlink(self, p).await
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        Vfs::rename(self, old_path, new_path).await
    }

    async fn copy_file(&self, src: &str, dest: &str) -> VfsResult<()> {
        Vfs::copy_file(self, src, dest).await
    }

    async fn mkdir(&self, p: &str, options: MkdirOptions) -> VfsResult<()> {
        Vfs::mkdir(self, p, options).await
    }

    async fn rmdir(&self, p: &str, options: RmdirOptions) -> VfsResult<()> {
        Vfs::rmdir(self, p, options).await
    }

    async fn truncate(&self, p: &str, len: u64) -> VfsResult<()> {
        Vfs::truncate(self, p, len).await
    }

    async fn chmod(&self, p: &str, mode: u32) -> VfsResult<()> {
        Vfs::chmod(self, p, mode).await
    }

    async fn chown(&self, p: &str, uid: u32, gid: u32) -> VfsResult<()> {
        Vfs::chown(self, p, uid, gid).await
    }

    async fn utimes(&self, p: &str, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        Vfs::utimes(self, p, atime, mtime).await
    }

    async fn symlink(&self, target: &str, p: &str) -> VfsResult<()> {
        Vfs::symlink(self, target, p).await
    }

    async fn link(&self, existing: &str, new_path: &str) -> VfsResult<()> {
        Vfs::link(self, existing, new_path).await
    }

    async fn exists(&self, p: &str) -> VfsResult<bool> {
        Vfs::exists(self, p).await
    }
}

#[async_trait]
impl TxStorage for Vfs {
    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    async fn write_file(&self, p: &str, data: &[u8], options: WriteOptions) -> VfsResult<()> {
        Vfs::write_file(self, p, data, options).await
    }

    async fn read_file(&self, p: &str) -> VfsResult<Vec<u8>> {
        Vfs::read_file(self, p).await
    }

    async fn exists(&self, p: &str) -> VfsResult<bool> {
        Vfs::exists(self, p).await
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        Vfs::rename(self, old_path, new_path).await
    }

    async fn mkdir(&self, p: &str, options: MkdirOptions) -> VfsResult<()> {
        Vfs::mkdir(self, p, options).await
    }

    async fn rm(&self, p: &str, options: RmOptions) -> VfsResult<()> {
        Vfs::rm(self, p, options).await
    }

    async fn rmdir(&self, p: &str, options: RmdirOptions) -> VfsResult<()> {
        Vfs::rmdir(self, p, options).await
    }

    async fn unlink(&self, p: &str) -> VfsResult<()> {
        Vfs::unlink(self, p).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txfs_types::ErrorCode;

    #[tokio::test]
    async fn test_paths_are_normalized() {
        let vfs = Vfs::memory();
        vfs.mkdir("a//b/../b/", MkdirOptions::recursive()).await.unwrap();
        vfs.write_file("/a/./b/f.txt", b"x", WriteOptions::default()).await.unwrap();
        assert_eq!(vfs.read_to_string("a/b/f.txt").await.unwrap(), "x");
        assert!(vfs.exists("/a/b/").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_events_distinguish_create_and_change() {
        let vfs = Vfs::memory();
        let mut watcher = vfs.watch("/", WatchOptions::default());

        vfs.write_file("/f", b"1", WriteOptions::default()).await.unwrap();
        vfs.write_file("/f", b"2", WriteOptions::default()).await.unwrap();
        vfs.append_file("/f", b"3").await.unwrap();

        let kinds: Vec<_> = (0..3)
            .map(|_| watcher.try_recv().unwrap().event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![WatchEventType::Rename, WatchEventType::Change, WatchEventType::Change]
        );
        assert_eq!(vfs.read_file("/f").await.unwrap(), b"23");
    }

    #[tokio::test]
    async fn test_rename_emits_on_both_paths() {
        let vfs = Vfs::memory();
        vfs.mkdir("/src", MkdirOptions::default()).await.unwrap();
        vfs.mkdir("/dst", MkdirOptions::default()).await.unwrap();
        vfs.write_file("/src/f", b"x", WriteOptions::default()).await.unwrap();

        let mut src = vfs.watch("/src", WatchOptions::default());
        let mut dst = vfs.watch("/dst", WatchOptions::default());
        vfs.rename("/src/f", "/dst/g").await.unwrap();

        let from = src.try_recv().unwrap();
        assert_eq!((from.event_type, from.filename.as_str()), (WatchEventType::Rename, "f"));
        let to = dst.try_recv().unwrap();
        assert_eq!(to.filename, "g");
    }

    #[tokio::test]
    async fn test_failed_mutation_emits_nothing() {
        let vfs = Vfs::memory();
        let mut watcher = vfs.watch("/", WatchOptions::recursive());
        let err = vfs.unlink("/missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Enoent);
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_metadata_changes_emit_change() {
        let vfs = Vfs::memory();
        vfs.write_file("/f", b"abc", WriteOptions::default()).await.unwrap();
        let mut watcher = vfs.watch("/f", WatchOptions::default());
        vfs.chmod("/f", 0o600).await.unwrap();
        vfs.truncate("/f", 1).await.unwrap();
        assert_eq!(watcher.try_recv().unwrap().event_type, WatchEventType::Change);
        assert_eq!(watcher.try_recv().unwrap().event_type, WatchEventType::Change);
        assert_eq!(vfs.stat("/f").await.unwrap().mode, 0o600);
    }

    #[tokio::test]
    async fn test_rm() {
        let vfs = Vfs::memory();
        vfs.mkdir("/d/e", MkdirOptions::recursive()).await.unwrap();
        vfs.write_file("/d/e/f", b"x", WriteOptions::default()).await.unwrap();

        assert_eq!(
            vfs.rm("/d", RmOptions::default()).await.unwrap_err().code(),
            ErrorCode::Eisdir
        );
        vfs.rm("/d", RmOptions::recursive_force()).await.unwrap();
        assert!(!vfs.exists("/d/e/f").await.unwrap());

        vfs.rm("/nope", RmOptions::recursive_force()).await.unwrap();
        assert_eq!(
            vfs.rm("/nope", RmOptions::default()).await.unwrap_err().code(),
            ErrorCode::Enoent
        );
    }

    #[tokio::test]
    async fn test_open_rules() {
        let vfs = Vfs::memory();
        assert_eq!(
            vfs.open("/f", OpenFlags::read(), None).await.unwrap_err().code(),
            ErrorCode::Enoent
        );

        let handle = vfs.open_with("/f", "wx", Some(0o600)).await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(vfs.stat("/f").await.unwrap().mode, 0o600);

        assert_eq!(
            vfs.open_with("/f", "wx", None).await.unwrap_err().code(),
            ErrorCode::Eexist
        );
        assert_eq!(
            vfs.open_with("/f", "bogus", None).await.unwrap_err().code(),
            ErrorCode::Einval
        );

        vfs.mkdir("/dir", MkdirOptions::default()).await.unwrap();
        assert_eq!(
            vfs.open_with("/dir", "r+", None).await.unwrap_err().code(),
            ErrorCode::Eisdir
        );
    }

    #[tokio::test]
    async fn test_truncating_open_clears_content() {
        let vfs = Vfs::memory();
        vfs.write_file("/f", b"old content", WriteOptions::default()).await.unwrap();
        let handle = vfs.open_with("/f", "w", None).await.unwrap();
        assert!(vfs.read_file("/f").await.unwrap().is_empty());
        handle.write(b"new").await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(vfs.read_file("/f").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_lock_commit_goes_through_facade() {
        let vfs = Vfs::memory();
        let mut watcher = vfs.watch("/", WatchOptions::default());
        let mut lock = vfs.lock("/config.json");
        lock.acquire(vfs.lock_options()).await.unwrap();
        lock.commit(b"{}").await.unwrap();

        assert_eq!(vfs.read_file("/config.json").await.unwrap(), b"{}");
        assert!(!vfs.locks().is_locked("/config.json"));
        let names: Vec<_> = std::iter::from_fn(|| watcher.try_recv())
            .map(|e| e.filename)
            .collect();
        assert!(names.contains(&"config.json".to_string()));
    }

    #[tokio::test]
    async fn test_disabled_watching() {
        let mut config = TxfsConfig::default();
        config.watch.enabled = false;
        let vfs = Vfs::with_config(config);
        let mut watcher = vfs.watch("/", WatchOptions::recursive());
        vfs.write_file("/f", b"x", WriteOptions::default()).await.unwrap();
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_config_modes_reach_backend() {
        let mut config = TxfsConfig::default();
        config.fs.default_file_mode = 0o600;
        let vfs = Vfs::with_config(config);
        vfs.write_file("/f", b"x", WriteOptions::default()).await.unwrap();
        assert_eq!(vfs.stat("/f").await.unwrap().mode, 0o600);
    }
}
