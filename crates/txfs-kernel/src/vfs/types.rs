//! Core VFS types.
//!
//! Attributes, directory entries and the per-call option records of the
//! backend contract. All of these are plain data and serializable.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use strum::{Display, EnumString};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Inode number (stable across renames, shared by hard links).
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permission bits (e.g., 0o644).
    pub mode: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time.
    pub atime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
    /// Creation time.
    pub birthtime: SystemTime,
    /// Number of hard links.
    pub nlink: u32,
    /// Owning user ID.
    pub uid: u32,
    /// Owning group ID.
    pub gid: u32,
}

impl FileAttr {
    fn new(ino: u64, kind: FileType, size: u64, mode: u32, nlink: u32) -> Self {
        let now = SystemTime::now();
        Self {
            ino,
            size,
            kind,
            mode,
            mtime: now,
            atime: now,
            ctime: now,
            birthtime: now,
            nlink,
            uid: 0,
            gid: 0,
        }
    }

    /// Create attributes for a new file.
    pub fn file(ino: u64, size: u64, mode: u32) -> Self {
        Self::new(ino, FileType::File, size, mode, 1)
    }

    /// Create attributes for a new directory.
    pub fn directory(ino: u64, mode: u32) -> Self {
        Self::new(ino, FileType::Directory, 0, mode, 2) // . and ..
    }

    /// Create attributes for a symlink.
    pub fn symlink(ino: u64, target_len: u64) -> Self {
        Self::new(ino, FileType::Symlink, target_len, 0o777, 1)
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name. For recursive listings, the path relative to the listed
    /// directory (`"sub/file.txt"`).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// How `write_file` treats an existing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum WriteFlag {
    /// Create or truncate.
    #[default]
    #[strum(serialize = "w")]
    Truncate,
    /// Create, failing with EEXIST if the file exists.
    #[strum(serialize = "wx")]
    Exclusive,
    /// Create or append.
    #[strum(serialize = "a")]
    Append,
}

/// Options for `write_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Permission bits for a newly created file.
    pub mode: Option<u32>,
    /// Create/truncate/append behaviour.
    pub flag: WriteFlag,
}

impl WriteOptions {
    /// Append instead of truncating.
    pub fn append() -> Self {
        Self {
            flag: WriteFlag::Append,
            ..Default::default()
        }
    }

    /// Fail if the file already exists.
    pub fn exclusive() -> Self {
        Self {
            flag: WriteFlag::Exclusive,
            ..Default::default()
        }
    }

    /// Set the creation mode.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Options for `mkdir`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirOptions {
    /// Create missing parents; an existing directory is not an error.
    pub recursive: bool,
    /// Permission bits for created directories.
    pub mode: Option<u32>,
}

impl MkdirOptions {
    /// Recursive mkdir (`mkdir -p`).
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            mode: None,
        }
    }
}

/// Options for `rmdir`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmdirOptions {
    /// Remove a populated directory and everything below it.
    pub recursive: bool,
}

/// Options for `rm`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmOptions {
    /// Allow removing directories and their contents.
    pub recursive: bool,
    /// Ignore a missing path.
    pub force: bool,
}

impl RmOptions {
    /// `rm -rf`.
    pub fn recursive_force() -> Self {
        Self {
            recursive: true,
            force: true,
        }
    }
}

/// Options for `readdir`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaddirOptions {
    /// Descend into subdirectories; names become relative paths.
    pub recursive: bool,
}

/// Options for a rename queued in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOptions {
    /// Create the destination's parent directory first.
    pub mkdirp: bool,
    /// Allow replacing an existing destination.
    pub overwrite: bool,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            mkdirp: false,
            overwrite: true,
        }
    }
}

impl RenameOptions {
    /// Create the destination parent before renaming.
    pub fn mkdirp() -> Self {
        Self {
            mkdirp: true,
            ..Default::default()
        }
    }
}

/// Permission check bits for `access` (`F_OK`, `R_OK`, `W_OK`, `X_OK`).
pub mod access {
    /// Existence only.
    pub const F_OK: u32 = 0;
    /// Readable.
    pub const R_OK: u32 = 4;
    /// Writable.
    pub const W_OK: u32 = 2;
    /// Executable / searchable.
    pub const X_OK: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
        assert!(FileType::Symlink.is_symlink());
    }

    #[test]
    fn test_file_attr_constructors() {
        let file = FileAttr::file(7, 1024, 0o644);
        assert!(file.is_file());
        assert_eq!(file.size, 1024);
        assert_eq!(file.mode, 0o644);
        assert_eq!(file.ino, 7);

        let dir = FileAttr::directory(1, 0o755);
        assert!(dir.is_dir());
        assert_eq!(dir.nlink, 2);
    }

    #[test]
    fn test_write_flag_strings() {
        assert_eq!(WriteFlag::from_str("wx").unwrap(), WriteFlag::Exclusive);
        assert_eq!(WriteFlag::Append.to_string(), "a");
        assert_eq!(WriteOptions::default().flag, WriteFlag::Truncate);
    }

    #[test]
    fn test_rename_defaults() {
        let opts = RenameOptions::default();
        assert!(!opts.mkdirp);
        assert!(opts.overwrite);
        assert!(RenameOptions::mkdirp().mkdirp);
    }
}
