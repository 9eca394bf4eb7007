//! `open()` flag parsing.
//!
//! Accepts both the string forms (`"r"`, `"w+"`, `"ax"`, `"rs+"`, ...) and
//! numeric `O_*` bitmasks. Anything outside the fixed table is `EINVAL`.

use std::str::FromStr;

use super::{VfsError, VfsResult};

/// Numeric flag bits (Linux values).
pub mod bits {
    /// Read only.
    pub const O_RDONLY: u32 = 0;
    /// Write only.
    pub const O_WRONLY: u32 = 1;
    /// Read and write.
    pub const O_RDWR: u32 = 2;
    /// Mask for the access mode.
    pub const O_ACCMODE: u32 = 3;
    /// Create if missing.
    pub const O_CREAT: u32 = 0o100;
    /// Fail if it exists (with `O_CREAT`).
    pub const O_EXCL: u32 = 0o200;
    /// Truncate on open.
    pub const O_TRUNC: u32 = 0o1000;
    /// Writes go to the end.
    pub const O_APPEND: u32 = 0o2000;
    /// Synchronous writes.
    pub const O_SYNC: u32 = 0o4010000;

    pub(super) const KNOWN: u32 = O_ACCMODE | O_CREAT | O_EXCL | O_TRUNC | O_APPEND | O_SYNC;
}

/// Which directions a handle may transfer data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read access only.
    #[default]
    ReadOnly,
    /// Write access only.
    WriteOnly,
    /// Read and write access.
    ReadWrite,
}

impl AccessMode {
    /// Returns true if reads are allowed.
    pub fn can_read(&self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    /// Returns true if writes are allowed.
    pub fn can_write(&self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Open file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    /// Access mode.
    pub access_mode: AccessMode,
    /// Create if not exists.
    pub create: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Append mode.
    pub append: bool,
    /// Flush to storage after every write.
    pub sync: bool,
}

impl OpenFlags {
    const fn new(access_mode: AccessMode) -> Self {
        Self {
            access_mode,
            create: false,
            exclusive: false,
            truncate: false,
            append: false,
            sync: false,
        }
    }

    /// Read-only access (`"r"`).
    pub fn read() -> Self {
        Self::new(AccessMode::ReadOnly)
    }

    /// Create or truncate for writing (`"w"`).
    pub fn write() -> Self {
        Self {
            create: true,
            truncate: true,
            ..Self::new(AccessMode::WriteOnly)
        }
    }

    /// Create or append (`"a"`).
    pub fn append() -> Self {
        Self {
            create: true,
            append: true,
            ..Self::new(AccessMode::WriteOnly)
        }
    }

    /// Parse a string flag.
    pub fn parse(flags: &str) -> VfsResult<Self> {
        use AccessMode::*;
        let base = |mode| Self::new(mode);
        let parsed = match flags {
            "r" => base(ReadOnly),
            "rs" | "sr" => Self {
                sync: true,
                ..base(ReadOnly)
            },
            "r+" => base(ReadWrite),
            "rs+" | "sr+" => Self {
                sync: true,
                ..base(ReadWrite)
            },
            "w" | "w+" | "wx" | "xw" | "wx+" | "xw+" => Self {
                create: true,
                truncate: true,
                exclusive: flags.contains('x'),
                ..base(if flags.ends_with('+') { ReadWrite } else { WriteOnly })
            },
            "a" | "a+" | "ax" | "xa" | "ax+" | "xa+" | "as" | "sa" | "as+" | "sa+" => Self {
                create: true,
                append: true,
                exclusive: flags.contains('x'),
                sync: flags.contains('s'),
                ..base(if flags.ends_with('+') { ReadWrite } else { WriteOnly })
            },
            other => {
                return Err(VfsError::invalid_argument(format!(
                    "unknown open flags: {other:?}"
                )));
            }
        };
        Ok(parsed)
    }

    /// Decode a numeric `O_*` bitmask.
    pub fn from_bits(flags: u32) -> VfsResult<Self> {
        if flags & !bits::KNOWN != 0 {
            return Err(VfsError::invalid_argument(format!(
                "unsupported open flag bits: {:#o}",
                flags & !bits::KNOWN
            )));
        }
        let access_mode = match flags & bits::O_ACCMODE {
            bits::O_RDONLY => AccessMode::ReadOnly,
            bits::O_WRONLY => AccessMode::WriteOnly,
            bits::O_RDWR => AccessMode::ReadWrite,
            _ => {
                return Err(VfsError::invalid_argument(format!(
                    "invalid access mode in open flags: {flags:#o}"
                )));
            }
        };
        Ok(Self {
            access_mode,
            create: flags & bits::O_CREAT != 0,
            exclusive: flags & bits::O_EXCL != 0,
            truncate: flags & bits::O_TRUNC != 0,
            append: flags & bits::O_APPEND != 0,
            // O_SYNC includes the O_DSYNC bit
            sync: flags & bits::O_SYNC == bits::O_SYNC,
        })
    }

    /// Encode as a numeric bitmask.
    pub fn to_bits(&self) -> u32 {
        let mut out = match self.access_mode {
            AccessMode::ReadOnly => bits::O_RDONLY,
            AccessMode::WriteOnly => bits::O_WRONLY,
            AccessMode::ReadWrite => bits::O_RDWR,
        };
        for (set, bit) in [
            (self.create, bits::O_CREAT),
            (self.exclusive, bits::O_EXCL),
            (self.truncate, bits::O_TRUNC),
            (self.append, bits::O_APPEND),
            (self.sync, bits::O_SYNC),
        ] {
            if set {
                out |= bit;
            }
        }
        out
    }
}

impl FromStr for OpenFlags {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<u32> for OpenFlags {
    type Error = VfsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_bits(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txfs_types::ErrorCode;

    #[test]
    fn test_string_table() {
        let r = OpenFlags::parse("r").unwrap();
        assert_eq!(r, OpenFlags::read());
        assert!(r.access_mode.can_read());
        assert!(!r.access_mode.can_write());

        let w_plus = OpenFlags::parse("w+").unwrap();
        assert_eq!(w_plus.access_mode, AccessMode::ReadWrite);
        assert!(w_plus.create && w_plus.truncate && !w_plus.exclusive);

        let ax = OpenFlags::parse("ax").unwrap();
        assert_eq!(ax.access_mode, AccessMode::WriteOnly);
        assert!(ax.append && ax.exclusive && ax.create);

        let rs_plus = OpenFlags::parse("rs+").unwrap();
        assert_eq!(rs_plus.access_mode, AccessMode::ReadWrite);
        assert!(rs_plus.sync && !rs_plus.create);

        assert_eq!(OpenFlags::parse("xa+").unwrap(), OpenFlags::parse("ax+").unwrap());
        assert!(OpenFlags::parse("sa").unwrap().sync);
    }

    #[test]
    fn test_invalid_strings() {
        for bad in ["", "rw", "x", "r++", "wa", "+r"] {
            let err = OpenFlags::parse(bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Einval, "flag {bad:?}");
        }
    }

    #[test]
    fn test_numeric_flags() {
        let flags = OpenFlags::from_bits(bits::O_WRONLY | bits::O_CREAT | bits::O_TRUNC).unwrap();
        assert_eq!(flags, OpenFlags::write());
        assert_eq!(flags.to_bits(), bits::O_WRONLY | bits::O_CREAT | bits::O_TRUNC);

        assert_eq!(
            OpenFlags::from_bits(bits::O_RDONLY).unwrap(),
            OpenFlags::read()
        );
        let err = OpenFlags::from_bits(3).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Einval);
        assert!(OpenFlags::from_bits(0o40000000).is_err());
    }

    #[test]
    fn test_dsync_bit_alone_is_not_sync() {
        let dsync = OpenFlags::from_bits(bits::O_WRONLY | 0o10000).unwrap();
        assert!(!dsync.sync);
        assert!(OpenFlags::from_bits(bits::O_WRONLY | bits::O_SYNC).unwrap().sync);
    }

    #[test]
    fn test_from_str() {
        let flags: OpenFlags = "a+".parse().unwrap();
        assert!(flags.append);
        assert_eq!(OpenFlags::try_from(bits::O_RDWR).unwrap().access_mode, AccessMode::ReadWrite);
    }
}
