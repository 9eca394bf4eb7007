//! Machine-readable error codes.
//!
//! Every error raised by the kernel carries one of these codes alongside its
//! human-readable message, so callers branch on the code and never on text.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// POSIX-flavoured error code.
///
/// The string form is the conventional upper-case spelling (`"ENOENT"`).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCode {
    /// No such file or directory.
    Enoent,
    /// Path already exists.
    Eexist,
    /// Expected a file, found a directory.
    Eisdir,
    /// Expected a directory, found something else.
    Enotdir,
    /// Directory is not empty.
    Enotempty,
    /// Permission denied.
    Eacces,
    /// Operation not permitted.
    Eperm,
    /// Invalid argument (malformed flags, bad options).
    Einval,
    /// Bad file descriptor (closed handle, wrong access mode).
    Ebadf,
    /// Too many levels of symbolic links.
    Eloop,
    /// Operation not supported by this storage.
    Enosys,
    /// Generic I/O failure.
    Eio,
    /// Lock is already held by this instance.
    Ealready,
    /// Lock is held elsewhere and the caller asked not to wait.
    Ewouldblock,
    /// Lock acquisition timed out.
    Etimedout,
    /// Operation requires a held lock.
    Enotlocked,
}

impl ErrorCode {
    /// The code as a static string (`"ENOENT"`).
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Returns true for the lock-specific codes.
    pub fn is_lock_code(&self) -> bool {
        matches!(
            self,
            ErrorCode::Ealready | ErrorCode::Ewouldblock | ErrorCode::Etimedout | ErrorCode::Enotlocked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_code_strings() {
        assert_eq!(ErrorCode::Enoent.to_string(), "ENOENT");
        assert_eq!(ErrorCode::Ewouldblock.as_str(), "EWOULDBLOCK");
        assert_eq!(ErrorCode::from_str("ENOTEMPTY").unwrap(), ErrorCode::Enotempty);
        assert!(ErrorCode::from_str("ENOPE").is_err());
    }

    #[test]
    fn test_lock_codes() {
        assert!(ErrorCode::Etimedout.is_lock_code());
        assert!(!ErrorCode::Eexist.is_lock_code());
    }

    #[test]
    fn test_serde_uses_posix_spelling() {
        assert_eq!(serde_json::to_string(&ErrorCode::Enotlocked).unwrap(), "\"ENOTLOCKED\"");
        let code: ErrorCode = serde_json::from_str("\"EACCES\"").unwrap();
        assert_eq!(code, ErrorCode::Eacces);
    }
}
