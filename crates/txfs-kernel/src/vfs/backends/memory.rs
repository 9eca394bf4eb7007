//! In-memory filesystem backend.
//!
//! Used for tests and ephemeral scratch space. All data is lost when dropped.
//!
//! Paths map to inode numbers and inodes own the data, so hard links share
//! content and renames keep the inode.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use txfs_types::path;

use crate::vfs::backend::FsBackend;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::types::{
    access, DirEntry, FileAttr, FileType, MkdirOptions, ReaddirOptions, RmdirOptions, WriteFlag,
    WriteOptions,
};

/// Symlink hops before giving up with ELOOP.
const MAX_SYMLINK_HOPS: usize = 40;

const ROOT_INO: u64 = 1;

#[derive(Debug, Clone)]
enum Content {
    File(Vec<u8>),
    Directory,
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Node {
    attr: FileAttr,
    content: Content,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.content, Content::Directory)
    }

    fn touch(&mut self) {
        let now = SystemTime::now();
        self.attr.mtime = now;
        self.attr.ctime = now;
    }
}

#[derive(Debug)]
struct State {
    paths: HashMap<String, u64>,
    nodes: HashMap<u64, Node>,
    next_ino: u64,
}

impl State {
    fn new(dir_mode: u32) -> Self {
        let mut paths = HashMap::new();
        let mut nodes = HashMap::new();
        // Root directory always exists
        paths.insert("/".to_string(), ROOT_INO);
        nodes.insert(
            ROOT_INO,
            Node {
                attr: FileAttr::directory(ROOT_INO, dir_mode),
                content: Content::Directory,
            },
        );
        Self {
            paths,
            nodes,
            next_ino: ROOT_INO + 1,
        }
    }

    fn node(&self, path: &str) -> Option<&Node> {
        self.paths.get(path).and_then(|ino| self.nodes.get(ino))
    }

    fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        let ino = *self.paths.get(path)?;
        self.nodes.get_mut(&ino)
    }

    fn insert(&mut self, path: String, attr_for: impl FnOnce(u64) -> FileAttr, content: Content) {
        let ino = self.next_ino;
        self.next_ino += 1;
        self.nodes.insert(
            ino,
            Node {
                attr: attr_for(ino),
                content,
            },
        );
        self.paths.insert(path, ino);
    }

    /// Drop one path mapping, releasing the inode when its last link goes.
    fn remove_path(&mut self, path: &str) {
        let Some(ino) = self.paths.remove(path) else {
            return;
        };
        let release = match self.nodes.get_mut(&ino) {
            Some(node) if !node.is_dir() && node.attr.nlink > 1 => {
                node.attr.nlink -= 1;
                node.attr.ctime = SystemTime::now();
                false
            }
            Some(_) => true,
            None => false,
        };
        if release {
            self.nodes.remove(&ino);
        }
    }

    /// All paths strictly below `dir`, deepest first.
    fn descendants(&self, dir: &str) -> Vec<String> {
        let mut found: Vec<String> = self
            .paths
            .keys()
            .filter(|p| path::is_nested(dir, p))
            .cloned()
            .collect();
        found.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));
        found
    }

    fn has_children(&self, dir: &str) -> bool {
        self.paths.keys().any(|p| path::is_nested(dir, p))
    }

    fn require_parent_dir(&self, resolved: &str) -> VfsResult<()> {
        match self.node(path::parent(resolved)) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(VfsError::not_a_directory(resolved)),
            None => Err(VfsError::not_found(resolved)),
        }
    }

    /// Resolve symlinks along `p`.
    ///
    /// Intermediate components must exist and be directories. A missing final
    /// component is not an error: the would-be path is returned so callers
    /// can create it.
    fn resolve(&self, p: &str, follow_last: bool) -> VfsResult<String> {
        let mut pending: VecDeque<String> = components(p);
        let mut current = "/".to_string();
        let mut hops = 0;

        while let Some(component) = pending.pop_front() {
            let candidate = path::join(&current, &component);
            let is_last = pending.is_empty();
            match self.node(&candidate) {
                None if is_last => return Ok(candidate),
                None => return Err(VfsError::not_found(p)),
                Some(Node {
                    content: Content::Symlink(target),
                    ..
                }) if !is_last || follow_last => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(VfsError::TooManySymlinks(p.to_string()));
                    }
                    let absolute = if target.starts_with('/') {
                        path::normalize(target)
                    } else {
                        path::normalize(&path::join(&current, target))
                    };
                    let mut restarted = components(&absolute);
                    restarted.extend(pending.drain(..));
                    pending = restarted;
                    current = "/".to_string();
                }
                Some(node) if node.is_dir() => current = candidate,
                Some(_) if is_last => return Ok(candidate),
                Some(_) => return Err(VfsError::not_a_directory(p)),
            }
        }
        Ok(current)
    }

    fn store(
        &mut self,
        resolved: &str,
        data: &[u8],
        options: WriteOptions,
        file_mode: u32,
    ) -> VfsResult<()> {
        self.require_parent_dir(resolved)?;
        match self.node_mut(resolved) {
            Some(Node {
                content: Content::Directory,
                ..
            }) => Err(VfsError::is_a_directory(resolved)),
            Some(Node {
                content: Content::Symlink(_),
                ..
            }) => Err(VfsError::other(format!("dangling symlink: {resolved}"))),
            Some(node) => {
                if options.flag == WriteFlag::Exclusive {
                    return Err(VfsError::already_exists(resolved));
                }
                if let Content::File(existing) = &mut node.content {
                    if options.flag == WriteFlag::Append {
                        existing.extend_from_slice(data);
                    } else {
                        *existing = data.to_vec();
                    }
                    node.attr.size = existing.len() as u64;
                }
                node.touch();
                Ok(())
            }
            None => {
                let mode = options.mode.unwrap_or(file_mode);
                let size = data.len() as u64;
                self.insert(
                    resolved.to_string(),
                    |ino| FileAttr::file(ino, size, mode),
                    Content::File(data.to_vec()),
                );
                Ok(())
            }
        }
    }
}

fn components(p: &str) -> VecDeque<String> {
    p.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}

/// In-memory filesystem backend.
///
/// Thread-safe via an internal `parking_lot::RwLock`; no lock is held
/// across an await point.
#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<State>,
    file_mode: u32,
    dir_mode: u32,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        Self::with_modes(0o644, 0o755)
    }

    /// Create a filesystem with explicit default permission bits.
    pub fn with_modes(file_mode: u32, dir_mode: u32) -> Self {
        Self {
            state: RwLock::new(State::new(dir_mode)),
            file_mode,
            dir_mode,
        }
    }
}

#[async_trait]
impl FsBackend for MemoryBackend {
    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let state = self.state.read();
        let resolved = state.resolve(path, true)?;
        match state.node(&resolved) {
            Some(Node {
                content: Content::File(data),
                ..
            }) => Ok(data.clone()),
            Some(Node {
                content: Content::Directory,
                ..
            }) => Err(VfsError::is_a_directory(path)),
            _ => Err(VfsError::not_found(path)),
        }
    }

    async fn readdir(&self, path: &str, options: ReaddirOptions) -> VfsResult<Vec<DirEntry>> {
        let state = self.state.read();
        let resolved = state.resolve(path, true)?;
        match state.node(&resolved) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(VfsError::not_a_directory(path)),
            None => return Err(VfsError::not_found(path)),
        }

        let mut result = Vec::new();
        for (entry_path, ino) in state.paths.iter() {
            let Some(name) = path::relative(&resolved, entry_path) else {
                continue;
            };
            if !options.recursive && name.contains('/') {
                continue;
            }
            if let Some(node) = state.nodes.get(ino) {
                result.push(DirEntry::new(name, node.attr.kind));
            }
        }

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn stat(&self, path: &str) -> VfsResult<FileAttr> {
        let state = self.state.read();
        let resolved = state.resolve(path, true)?;
        state
            .node(&resolved)
            .map(|n| n.attr.clone())
            .ok_or_else(|| VfsError::not_found(path))
    }

    async fn lstat(&self, path: &str) -> VfsResult<FileAttr> {
        let state = self.state.read();
        let resolved = state.resolve(path, false)?;
        state
            .node(&resolved)
            .map(|n| n.attr.clone())
            .ok_or_else(|| VfsError::not_found(path))
    }

    async fn access(&self, path: &str, mode: u32) -> VfsResult<()> {
        let attr = self.stat(path).await?;
        let wanted = [
            (access::R_OK, 0o400),
            (access::W_OK, 0o200),
            (access::X_OK, 0o100),
        ];
        for (bit, perm) in wanted {
            if mode & bit != 0 && attr.mode & perm == 0 {
                return Err(VfsError::permission_denied(path));
            }
        }
        Ok(())
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let state = self.state.read();
        let resolved = state.resolve(path, false)?;
        match state.node(&resolved) {
            Some(Node {
                content: Content::Symlink(target),
                ..
            }) => Ok(target.clone()),
            Some(_) => Err(VfsError::invalid_argument(format!("not a symbolic link: {path}"))),
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn realpath(&self, path: &str) -> VfsResult<String> {
        let state = self.state.read();
        let resolved = state.resolve(path, true)?;
        if state.node(&resolved).is_none() {
            return Err(VfsError::not_found(path));
        }
        Ok(resolved)
    }

    async fn write_file(&self, path: &str, data: &[u8], options: WriteOptions) -> VfsResult<()> {
        let mut state = self.state.write();
        let resolved = state.resolve(path, true)?;
        state.store(&resolved, data, options, self.file_mode)
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let mut state = self.state.write();
        let resolved = state.resolve(path, false)?;
        if resolved == "/" {
            return Err(VfsError::not_permitted("cannot remove root"));
        }
        match state.node(&resolved) {
            Some(node) if node.is_dir() => Err(VfsError::is_a_directory(path)),
            Some(_) => {
                state.remove_path(&resolved);
                Ok(())
            }
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        let mut state = self.state.write();
        let from = state.resolve(old_path, false)?;
        let to = state.resolve(new_path, false)?;

        if from == "/" || to == "/" {
            return Err(VfsError::not_permitted("cannot rename root"));
        }
        let source_is_dir = match state.node(&from) {
            Some(node) => node.is_dir(),
            None => return Err(VfsError::not_found(old_path)),
        };
        if from == to {
            return Ok(());
        }
        if path::is_nested(&from, &to) {
            return Err(VfsError::invalid_argument(format!(
                "cannot move {old_path} into itself"
            )));
        }
        state.require_parent_dir(&to)?;

        // Replace a compatible destination
        if let Some(dest) = state.node(&to) {
            match (source_is_dir, dest.is_dir()) {
                (true, false) => return Err(VfsError::not_a_directory(new_path)),
                (false, true) => return Err(VfsError::is_a_directory(new_path)),
                (true, true) if state.has_children(&to) => {
                    return Err(VfsError::directory_not_empty(new_path));
                }
                _ => state.remove_path(&to),
            }
        }

        // If it's a directory, we need to rename all children too
        if source_is_dir {
            for child in state.descendants(&from) {
                if let Some(ino) = state.paths.remove(&child) {
                    let relative = &child[from.len()..];
                    state.paths.insert(format!("{to}{relative}"), ino);
                }
            }
        }

        if let Some(ino) = state.paths.remove(&from) {
            state.paths.insert(to.clone(), ino);
        }
        if let Some(node) = state.node_mut(&to) {
            node.attr.ctime = SystemTime::now();
        }
        Ok(())
    }

    async fn copy_file(&self, src: &str, dest: &str) -> VfsResult<()> {
        let mut state = self.state.write();
        let from = state.resolve(src, true)?;
        let data = match state.node(&from) {
            Some(Node {
                content: Content::File(data),
                ..
            }) => data.clone(),
            Some(Node {
                content: Content::Directory,
                ..
            }) => return Err(VfsError::is_a_directory(src)),
            _ => return Err(VfsError::not_found(src)),
        };
        let to = state.resolve(dest, true)?;
        state.store(&to, &data, WriteOptions::default(), self.file_mode)
    }

    async fn mkdir(&self, path: &str, options: MkdirOptions) -> VfsResult<()> {
        let mode = options.mode.unwrap_or(self.dir_mode);
        let mut state = self.state.write();

        if !options.recursive {
            let resolved = state.resolve(path, false)?;
            if state.node(&resolved).is_some() {
                return Err(VfsError::already_exists(path));
            }
            state.require_parent_dir(&resolved)?;
            state.insert(resolved, |ino| FileAttr::directory(ino, mode), Content::Directory);
            return Ok(());
        }

        // mkdir -p: walk the components, creating what is missing
        let mut current = "/".to_string();
        for component in components(path) {
            let candidate = path::join(&current, &component);
            match state.node(&candidate).map(|n| n.attr.kind) {
                None => {
                    state.insert(
                        candidate.clone(),
                        |ino| FileAttr::directory(ino, mode),
                        Content::Directory,
                    );
                    current = candidate;
                }
                Some(FileType::Directory) => current = candidate,
                Some(FileType::Symlink) => {
                    let target = state.resolve(&candidate, true)?;
                    match state.node(&target) {
                        Some(node) if node.is_dir() => current = target,
                        _ => return Err(VfsError::not_a_directory(path)),
                    }
                }
                Some(FileType::File) => return Err(VfsError::not_a_directory(path)),
            }
        }
        Ok(())
    }

    async fn rmdir(&self, path: &str, options: RmdirOptions) -> VfsResult<()> {
        let mut state = self.state.write();
        let resolved = state.resolve(path, false)?;
        if resolved == "/" {
            return Err(VfsError::not_permitted("cannot remove root"));
        }

        match state.node(&resolved) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(VfsError::not_a_directory(path)),
            None => return Err(VfsError::not_found(path)),
        }

        if state.has_children(&resolved) {
            if !options.recursive {
                return Err(VfsError::directory_not_empty(path));
            }
            for child in state.descendants(&resolved) {
                state.remove_path(&child);
            }
        }
        state.remove_path(&resolved);
        Ok(())
    }

    async fn truncate(&self, path: &str, len: u64) -> VfsResult<()> {
        let mut state = self.state.write();
        let resolved = state.resolve(path, true)?;
        match state.node_mut(&resolved) {
            Some(node) => match &mut node.content {
                Content::File(data) => {
                    data.resize(len as usize, 0);
                    node.attr.size = len;
                    node.touch();
                    Ok(())
                }
                Content::Directory => Err(VfsError::is_a_directory(path)),
                Content::Symlink(_) => Err(VfsError::not_found(path)),
            },
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        let mut state = self.state.write();
        let resolved = state.resolve(path, true)?;
        let node = state
            .node_mut(&resolved)
            .ok_or_else(|| VfsError::not_found(path))?;
        node.attr.mode = mode & 0o7777;
        node.attr.ctime = SystemTime::now();
        Ok(())
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()> {
        let mut state = self.state.write();
        let resolved = state.resolve(path, true)?;
        let node = state
            .node_mut(&resolved)
            .ok_or_else(|| VfsError::not_found(path))?;
        node.attr.uid = uid;
        node.attr.gid = gid;
        node.attr.ctime = SystemTime::now();
        Ok(())
    }

    async fn utimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        let mut state = self.state.write();
        let resolved = state.resolve(path, true)?;
        let node = state
            .node_mut(&resolved)
            .ok_or_else(|| VfsError::not_found(path))?;
        node.attr.atime = atime;
        node.attr.mtime = mtime;
        node.attr.ctime = SystemTime::now();
        Ok(())
    }

    async fn symlink(&self, target: &str, path: &str) -> VfsResult<()> {
        let mut state = self.state.write();
        let resolved = state.resolve(path, false)?;
        if state.node(&resolved).is_some() {
            return Err(VfsError::already_exists(path));
        }
        state.require_parent_dir(&resolved)?;
        let len = target.len() as u64;
        state.insert(
            resolved,
            |ino| FileAttr::symlink(ino, len),
            Content::Symlink(target.to_string()),
        );
        Ok(())
    }

    async fn link(&self, existing: &str, new_path: &str) -> VfsResult<()> {
        let mut state = self.state.write();
        let from = state.resolve(existing, false)?;
        let ino = match state.paths.get(&from) {
            Some(ino) => *ino,
            None => return Err(VfsError::not_found(existing)),
        };
        if state.nodes.get(&ino).is_some_and(Node::is_dir) {
            return Err(VfsError::not_permitted(format!("hard link to directory: {existing}")));
        }
        let to = state.resolve(new_path, false)?;
        if state.node(&to).is_some() {
            return Err(VfsError::already_exists(new_path));
        }
        state.require_parent_dir(&to)?;
        state.paths.insert(to, ino);
        if let Some(node) = state.nodes.get_mut(&ino) {
            node.attr.nlink += 1;
            node.attr.ctime = SystemTime::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txfs_types::ErrorCode;

    async fn fs_with_file(path: &str, data: &[u8]) -> MemoryBackend {
        let fs = MemoryBackend::new();
        fs.mkdir(path::parent(path), MkdirOptions::recursive())
            .await
            .unwrap();
        fs.write_file(path, data, WriteOptions::default())
            .await
            .unwrap();
        fs
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryBackend::new();
        fs.write_file("/test.txt", b"hello world", WriteOptions::default())
            .await
            .unwrap();

        let data = fs.read_file("/test.txt").await.unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(fs.stat("/test.txt").await.unwrap().size, 11);
    }

    #[tokio::test]
    async fn test_write_requires_parent() {
        let fs = MemoryBackend::new();
        let err = fs
            .write_file("/missing/file.txt", b"x", WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Enoent);
    }

    #[tokio::test]
    async fn test_write_flags() {
        let fs = fs_with_file("/f.txt", b"abc").await;
        fs.write_file("/f.txt", b"def", WriteOptions::append())
            .await
            .unwrap();
        assert_eq!(fs.read_file("/f.txt").await.unwrap(), b"abcdef");

        let err = fs
            .write_file("/f.txt", b"x", WriteOptions::exclusive())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Eexist);
    }

    #[tokio::test]
    async fn test_mkdir_and_readdir() {
        let fs = MemoryBackend::new();
        fs.mkdir("/subdir", MkdirOptions::default()).await.unwrap();
        fs.write_file("/subdir/file.txt", b"", WriteOptions::default())
            .await
            .unwrap();
        fs.write_file("/root.txt", b"", WriteOptions::default())
            .await
            .unwrap();

        let entries = fs.readdir("/", ReaddirOptions::default()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["root.txt", "subdir"]);

        let subentries = fs.readdir("/subdir", ReaddirOptions::default()).await.unwrap();
        assert_eq!(subentries, vec![DirEntry::file("file.txt")]);

        let all = fs
            .readdir("/", ReaddirOptions { recursive: true })
            .await
            .unwrap();
        assert!(all.contains(&DirEntry::file("subdir/file.txt")));
    }

    #[tokio::test]
    async fn test_mkdir_semantics() {
        let fs = MemoryBackend::new();
        let err = fs.mkdir("/a/b", MkdirOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Enoent);

        fs.mkdir("/a/b/c", MkdirOptions::recursive()).await.unwrap();
        assert!(fs.stat("/a").await.unwrap().is_dir());
        assert!(fs.stat("/a/b/c").await.unwrap().is_dir());

        // recursive on an existing directory is fine, plain mkdir is not
        fs.mkdir("/a/b", MkdirOptions::recursive()).await.unwrap();
        let err = fs.mkdir("/a/b", MkdirOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Eexist);
    }

    #[tokio::test]
    async fn test_unlink() {
        let fs = fs_with_file("/test.txt", b"x").await;
        fs.unlink("/test.txt").await.unwrap();
        assert!(!fs.exists("/test.txt").await.unwrap());

        fs.mkdir("/d", MkdirOptions::default()).await.unwrap();
        assert_eq!(fs.unlink("/d").await.unwrap_err().code(), ErrorCode::Eisdir);
    }

    #[tokio::test]
    async fn test_rmdir_not_empty() {
        let fs = fs_with_file("/nonempty/file.txt", b"x").await;

        let err = fs
            .rmdir("/nonempty", RmdirOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Enotempty);

        fs.rmdir("/nonempty", RmdirOptions { recursive: true })
            .await
            .unwrap();
        assert!(!fs.exists("/nonempty/file.txt").await.unwrap());
        assert!(!fs.exists("/nonempty").await.unwrap());
    }

    #[tokio::test]
    async fn test_root_is_protected() {
        let fs = MemoryBackend::new();
        let err = fs.rmdir("/", RmdirOptions { recursive: true }).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Eperm);
    }

    #[tokio::test]
    async fn test_rename() {
        let fs = fs_with_file("/old.txt", b"content").await;
        fs.rename("/old.txt", "/new.txt").await.unwrap();

        assert!(!fs.exists("/old.txt").await.unwrap());
        assert_eq!(fs.read_file("/new.txt").await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_rename_directory_moves_children() {
        let fs = fs_with_file("/src/a/b.txt", b"deep").await;
        fs.rename("/src", "/dst").await.unwrap();
        assert_eq!(fs.read_file("/dst/a/b.txt").await.unwrap(), b"deep");
        assert!(!fs.exists("/src/a").await.unwrap());

        let err = fs.rename("/dst", "/dst/a/inner").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Einval);
    }

    #[tokio::test]
    async fn test_rename_type_conflicts() {
        let fs = fs_with_file("/d/f.txt", b"x").await;
        fs.mkdir("/empty", MkdirOptions::default()).await.unwrap();

        let err = fs.rename("/d/f.txt", "/empty").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Eisdir);
        let err = fs.rename("/empty", "/d").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Enotempty);
        let err = fs.rename("/empty", "/d/f.txt").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Enotdir);
    }

    #[tokio::test]
    async fn test_symlink() {
        let fs = fs_with_file("/target/file.txt", b"via link").await;
        fs.symlink("/target", "/link").await.unwrap();

        assert_eq!(fs.readlink("/link").await.unwrap(), "/target");
        assert!(fs.lstat("/link").await.unwrap().is_symlink());
        assert!(fs.stat("/link").await.unwrap().is_dir());
        assert_eq!(fs.read_file("/link/file.txt").await.unwrap(), b"via link");
        assert_eq!(fs.realpath("/link/file.txt").await.unwrap(), "/target/file.txt");
    }

    #[tokio::test]
    async fn test_symlink_loop() {
        let fs = MemoryBackend::new();
        fs.symlink("/b", "/a").await.unwrap();
        fs.symlink("/a", "/b").await.unwrap();
        let err = fs.read_file("/a").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Eloop);
    }

    #[tokio::test]
    async fn test_hard_link_shares_data() {
        let fs = fs_with_file("/one.txt", b"v1").await;
        fs.link("/one.txt", "/two.txt").await.unwrap();
        fs.write_file("/one.txt", b"v2", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(fs.read_file("/two.txt").await.unwrap(), b"v2");
        assert_eq!(fs.stat("/two.txt").await.unwrap().nlink, 2);

        fs.unlink("/one.txt").await.unwrap();
        assert_eq!(fs.read_file("/two.txt").await.unwrap(), b"v2");
        assert_eq!(fs.stat("/two.txt").await.unwrap().nlink, 1);
    }

    #[tokio::test]
    async fn test_truncate_and_copy() {
        let fs = fs_with_file("/test.txt", b"hello world").await;
        fs.truncate("/test.txt", 5).await.unwrap();
        assert_eq!(fs.read_file("/test.txt").await.unwrap(), b"hello");

        fs.copy_file("/test.txt", "/copy.txt").await.unwrap();
        assert_eq!(fs.read_file("/copy.txt").await.unwrap(), b"hello");
        assert_ne!(
            fs.stat("/copy.txt").await.unwrap().ino,
            fs.stat("/test.txt").await.unwrap().ino
        );
    }

    #[tokio::test]
    async fn test_access_and_chmod() {
        let fs = fs_with_file("/f", b"").await;
        fs.access("/f", access::R_OK | access::W_OK).await.unwrap();
        fs.chmod("/f", 0o444).await.unwrap();
        let err = fs.access("/f", access::W_OK).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Eacces);
        fs.access("/f", access::F_OK).await.unwrap();
    }

    #[tokio::test]
    async fn test_default_modes() {
        let fs = MemoryBackend::with_modes(0o600, 0o700);
        fs.mkdir("/d", MkdirOptions::default()).await.unwrap();
        fs.write_file("/d/f", b"", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(fs.stat("/d").await.unwrap().mode, 0o700);
        assert_eq!(fs.stat("/d/f").await.unwrap().mode, 0o600);
    }
}
