//! VFS error types.

use std::io;
use thiserror::Error;
use txfs_types::ErrorCode;

/// VFS error type.
///
/// Each variant maps to exactly one [`ErrorCode`] via [`VfsError::code`].
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation not permitted (e.g. removing the root).
    #[error("operation not permitted: {0}")]
    NotPermitted(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Malformed flags or arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation on a closed handle or one opened with the wrong mode.
    #[error("bad file descriptor: {0}")]
    BadDescriptor(String),

    /// Too many symbolic links.
    #[error("too many symbolic links: {0}")]
    TooManySymlinks(String),

    /// The storage does not provide this operation.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a NotPermitted error.
    pub fn not_permitted(path: impl Into<String>) -> Self {
        Self::NotPermitted(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a BadDescriptor error.
    pub fn bad_descriptor(msg: impl Into<String>) -> Self {
        Self::BadDescriptor(msg.into())
    }

    /// Create an Unsupported error naming the missing operation.
    pub fn unsupported(op: impl Into<String>) -> Self {
        Self::Unsupported(op.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// The machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            VfsError::NotFound(_) => ErrorCode::Enoent,
            VfsError::AlreadyExists(_) => ErrorCode::Eexist,
            VfsError::PermissionDenied(_) => ErrorCode::Eacces,
            VfsError::NotPermitted(_) => ErrorCode::Eperm,
            VfsError::NotADirectory(_) => ErrorCode::Enotdir,
            VfsError::IsADirectory(_) => ErrorCode::Eisdir,
            VfsError::DirectoryNotEmpty(_) => ErrorCode::Enotempty,
            VfsError::InvalidArgument(_) => ErrorCode::Einval,
            VfsError::BadDescriptor(_) => ErrorCode::Ebadf,
            VfsError::TooManySymlinks(_) => ErrorCode::Eloop,
            VfsError::Unsupported(_) => ErrorCode::Enosys,
            VfsError::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => ErrorCode::Enoent,
                io::ErrorKind::AlreadyExists => ErrorCode::Eexist,
                io::ErrorKind::PermissionDenied => ErrorCode::Eacces,
                io::ErrorKind::NotADirectory => ErrorCode::Enotdir,
                io::ErrorKind::IsADirectory => ErrorCode::Eisdir,
                io::ErrorKind::DirectoryNotEmpty => ErrorCode::Enotempty,
                io::ErrorKind::InvalidInput => ErrorCode::Einval,
                io::ErrorKind::Unsupported => ErrorCode::Enosys,
                _ => ErrorCode::Eio,
            },
            VfsError::Other(_) => ErrorCode::Eio,
        }
    }

    /// Returns true if this error carries the given code.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code() == code
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::PermissionDenied(msg) | VfsError::NotPermitted(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::InvalidArgument(msg) | VfsError::BadDescriptor(msg) => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
            VfsError::TooManySymlinks(msg) => io::Error::other(format!("too many symbolic links: {msg}")),
            VfsError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::Io(e) => e,
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
