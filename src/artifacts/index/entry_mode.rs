//! Tree and index entry modes
//!
//! Only two modes exist: regular files and directories. Symlinks and
//! executable bits are unsupported.

use crate::errors::{Error, Result};

/// Mode of a tree or index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryMode {
    /// Regular file (`100644`)
    #[default]
    Regular,
    /// Directory (`40000`)
    Directory,
}

impl EntryMode {
    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::Regular => 0o100644,
            EntryMode::Directory => 0o40000,
        }
    }

    pub fn from_u32(mode: u32) -> Result<Self> {
        match mode {
            0o100644 => Ok(EntryMode::Regular),
            0o40000 => Ok(EntryMode::Directory),
            _ => Err(Error::invalid_argument(format!(
                "unsupported entry mode {mode:o}"
            ))),
        }
    }

    /// Parse from the octal string used in tree entries.
    pub fn from_octal_str(mode: &str) -> Result<Self> {
        let value = u32::from_str_radix(mode, 8)
            .map_err(|_| Error::invalid_argument(format!("invalid octal mode '{mode}'")))?;
        Self::from_u32(value)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:o}", self.as_u32())
    }
}
