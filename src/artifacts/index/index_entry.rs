//! Staging index entry
//!
//! One entry per staged path: the blob hash plus the file metadata needed
//! to detect modification without re-hashing (size, mtime, mode).

use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use derive_new::new;

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};

/// A single staged file.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct IndexEntry {
    /// Repo-relative path under the working root, with `/` separators
    pub path: String,
    /// Blob hash of the staged content
    pub oid: ObjectId,
    /// Size of the file in bytes at staging time
    pub size: u64,
    /// Modification time at staging time
    pub mtime: DateTime<Utc>,
    /// File mode
    pub mode: EntryMode,
}

impl IndexEntry {
    /// Final path component (file name).
    pub fn basename(&self) -> Result<&str> {
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::invalid_argument(format!("invalid staged path '{}'", self.path)))
    }

    /// Parent directories from outermost to innermost.
    ///
    /// For `episodic/2026/log.md` this yields `episodic`, `episodic/2026`.
    pub fn parent_dirs(&self) -> Vec<PathBuf> {
        let path = Path::new(&self.path);
        let mut dirs = Vec::new();
        let mut acc = PathBuf::new();

        for component in path.components() {
            if let Component::Normal(part) = component {
                let next = acc.join(part);
                if next != path {
                    dirs.push(next.clone());
                }
                acc = next;
            }
        }

        dirs
    }

    /// Serialize the entry in the index binary format (big-endian).
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let path_bytes = self.path.as_bytes();
        if path_bytes.len() > u16::MAX as usize {
            return Err(Error::invalid_argument(format!(
                "staged path too long: {}",
                self.path
            )));
        }

        writer.write_u16::<BigEndian>(path_bytes.len() as u16)?;
        writer.write_all(path_bytes)?;
        self.oid.write_raw_to(writer)?;
        writer.write_u64::<BigEndian>(self.size)?;
        writer.write_i64::<BigEndian>(self.mtime.timestamp())?;
        writer.write_u32::<BigEndian>(self.mtime.timestamp_subsec_nanos())?;
        writer.write_u32::<BigEndian>(self.mode.as_u32())?;

        Ok(())
    }

    /// Deserialize an entry from the index binary format.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let path_len = reader.read_u16::<BigEndian>()? as usize;
        let mut path_bytes = vec![0u8; path_len];
        reader.read_exact(&mut path_bytes)?;
        let path = String::from_utf8(path_bytes)
            .map_err(|_| Error::invalid_argument("non-utf8 path in staging index"))?;

        let oid = ObjectId::read_raw_from(reader)?;
        let size = reader.read_u64::<BigEndian>()?;
        let secs = reader.read_i64::<BigEndian>()?;
        let nanos = reader.read_u32::<BigEndian>()?;
        let mtime = Utc
            .timestamp_opt(secs, nanos)
            .single()
            .ok_or_else(|| Error::invalid_argument("invalid mtime in staging index"))?;
        let mode = EntryMode::from_u32(reader.read_u32::<BigEndian>()?)?;

        Ok(IndexEntry::new(path, oid, size, mtime, mode))
    }
}
