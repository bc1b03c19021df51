//! Staging index store
//!
//! Persists the staging area at `.mem/index` in the binary format described
//! in [`crate::artifacts::index`]: an `AIDX` header, big-endian entries,
//! and a SHA-256 checksum trailer. The index is empty after init or commit,
//! mutated by stage/unstage, and consumed by the commit builder.
//!
//! Updates rewrite the whole file through a temp path + atomic rename, the
//! same discipline the object store uses.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use derive_new::new;
use sha2::{Digest, Sha256};

use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::index::{CHECKSUM_SIZE, SIGNATURE, VERSION};
use crate::errors::{Error, Result};

/// Staging index store rooted at `.mem/index`.
#[derive(Debug, new)]
pub struct Index {
    /// Path to the index file (typically `.mem/index`)
    path: Box<Path>,
}

impl Index {
    /// Load all staged entries, keyed by path. Missing file = empty index.
    pub fn load(&self) -> Result<BTreeMap<String, IndexEntry>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let raw = std::fs::read(&self.path)?;
        let corrupt = |reason: &str| Error::ObjectCorrupt {
            object: "staging index".to_string(),
            reason: reason.to_string(),
        };

        if raw.len() < 12 + CHECKSUM_SIZE {
            return Err(corrupt("file too short"));
        }

        let body_len = raw.len() - CHECKSUM_SIZE;
        let expected = &raw[body_len..];
        let actual: [u8; CHECKSUM_SIZE] = Sha256::digest(&raw[..body_len]).into();
        if expected != actual {
            return Err(corrupt("checksum mismatch"));
        }

        let mut reader = Cursor::new(&raw[..body_len]);
        let mut signature = [0u8; 4];
        std::io::Read::read_exact(&mut reader, &mut signature)?;
        if &signature != SIGNATURE {
            return Err(corrupt("bad signature"));
        }
        let version = reader.read_u32::<BigEndian>()?;
        if version != VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }

        let count = reader.read_u32::<BigEndian>()? as usize;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let entry = IndexEntry::read_from(&mut reader)?;
            entries.insert(entry.path.clone(), entry);
        }

        Ok(entries)
    }

    /// Persist the staged entries atomically.
    pub fn save(&self, entries: &BTreeMap<String, IndexEntry>) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(SIGNATURE);
        body.write_u32::<BigEndian>(VERSION)?;
        body.write_u32::<BigEndian>(entries.len() as u32)?;
        for entry in entries.values() {
            entry.write_to(&mut body)?;
        }

        let checksum: [u8; CHECKSUM_SIZE] = Sha256::digest(&body).into();
        body.extend_from_slice(&checksum);

        let parent = self.path.parent().ok_or_else(|| {
            Error::invalid_argument(format!("invalid index path {}", self.path.display()))
        })?;
        std::fs::create_dir_all(parent)?;
        let temp = parent.join(format!(".tmp-index-{}", rand::random::<u32>()));
        std::fs::write(&temp, &body)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    /// Stage or restage one entry.
    pub fn add(&self, entry: IndexEntry) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(entry.path.clone(), entry);
        self.save(&entries)
    }

    /// Unstage a path.
    ///
    /// # Returns
    ///
    /// Whether the path was staged.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let mut entries = self.load()?;
        let removed = entries.remove(path).is_some();
        if removed {
            self.save(&entries)?;
        }
        Ok(removed)
    }

    /// Drop every staged entry (after a commit).
    pub fn clear(&self) -> Result<()> {
        self.save(&BTreeMap::new())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.load()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::EntryMode;
    use crate::artifacts::objects::object_id::ObjectId;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn index() -> (assert_fs::TempDir, Index) {
        let dir = assert_fs::TempDir::new().unwrap();
        let index = Index::new(dir.path().join(".mem").join("index").into_boxed_path());
        (dir, index)
    }

    fn entry(path: &str, fill: u8) -> IndexEntry {
        IndexEntry::new(
            path.to_string(),
            ObjectId::from_raw(&[fill; 32]),
            10,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            EntryMode::Regular,
        )
    }

    #[test]
    fn test_empty_index_loads_empty() {
        let (_dir, index) = index();
        assert!(index.load().unwrap().is_empty());
    }

    #[test]
    fn test_add_and_reload() {
        let (_dir, index) = index();
        index.add(entry("semantic/pref.md", 1)).unwrap();
        index.add(entry("episodic/log.md", 2)).unwrap();

        let entries = index.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries.get("semantic/pref.md").unwrap().oid,
            ObjectId::from_raw(&[1; 32])
        );
    }

    #[test]
    fn test_restage_replaces_entry() {
        let (_dir, index) = index();
        index.add(entry("semantic/pref.md", 1)).unwrap();
        index.add(entry("semantic/pref.md", 9)).unwrap();

        let entries = index.load().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries.get("semantic/pref.md").unwrap().oid,
            ObjectId::from_raw(&[9; 32])
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let (_dir, index) = index();
        index.add(entry("a.md", 1)).unwrap();
        index.add(entry("b.md", 2)).unwrap();

        assert!(index.remove("a.md").unwrap());
        assert!(!index.remove("a.md").unwrap());
        assert_eq!(index.load().unwrap().len(), 1);

        index.clear().unwrap();
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_corrupt_index_rejected() {
        let (_dir, index) = index();
        index.add(entry("a.md", 1)).unwrap();

        let mut raw = std::fs::read(index.path.as_ref()).unwrap();
        raw[16] ^= 0xFF;
        std::fs::write(index.path.as_ref(), raw).unwrap();

        assert!(matches!(
            index.load(),
            Err(Error::ObjectCorrupt { .. })
        ));
    }
}
