//! Pack reader
//!
//! Opens a pack file and its side index, verifying both SHA-256 trailers.
//! Lookup is a binary search over the sorted index: at most ⌈log₂ n⌉ + 1
//! hash comparisons for an index of n entries.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use sha2::{Digest, Sha256};

use crate::artifacts::config::MAX_DELTA_CHAIN;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::OBJECT_ID_RAW_LENGTH;
use crate::artifacts::pack::{FLAG_DELTA, IDX_MAGIC, PACK_MAGIC, PACK_VERSION, delta};
use crate::errors::{Error, Result};

/// Entry size in the index: 32-byte hash + u64 offset.
const INDEX_ENTRY_SIZE: usize = OBJECT_ID_RAW_LENGTH + 8;

fn corrupt(reason: impl Into<String>) -> Error {
    Error::PackCorrupt {
        reason: reason.into(),
    }
}

/// An opened pack with its in-memory index.
// TODO: mmap the pack body instead of reading it whole once packs outgrow memory
#[derive(Debug)]
pub struct PackReader {
    id: String,
    data: Bytes,
    /// Sorted `(raw hash, offset)` pairs
    entries: Vec<([u8; OBJECT_ID_RAW_LENGTH], u64)>,
}

impl PackReader {
    /// Open `<id>.pack` + `<id>.idx`, verifying both trailers.
    pub fn open(pack_path: &Path) -> Result<PackReader> {
        let id = pack_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| corrupt(format!("invalid pack path {}", pack_path.display())))?
            .to_string();
        let index_path = pack_path.with_extension("idx");

        let data = Self::read_verified(pack_path)?;
        let index = Self::read_verified(&index_path)?;

        Self::check_header(&data, PACK_MAGIC, "pack")?;
        Self::check_header(&index, IDX_MAGIC, "index")?;

        let entries = Self::parse_index(&index)?;

        Ok(PackReader {
            id,
            data: Bytes::from(data),
            entries,
        })
    }

    /// List all `.pack` files in a pack directory.
    pub fn discover(pack_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut packs = Vec::new();
        if !pack_dir.exists() {
            return Ok(packs);
        }
        for entry in std::fs::read_dir(pack_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("pack") {
                packs.push(path);
            }
        }
        packs.sort();
        Ok(packs)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all object ids in the pack (index order).
    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().map(|(raw, _)| ObjectId::from_raw(raw))
    }

    /// Whether the pack contains an object.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.search(oid).0.is_some()
    }

    /// Binary search for an object's record offset.
    ///
    /// # Returns
    ///
    /// `(offset, comparisons)` — the number of hash comparisons performed,
    /// bounded by ⌈log₂ n⌉ + 1.
    pub fn search(&self, oid: &ObjectId) -> (Option<u64>, u32) {
        let needle = oid.to_raw();
        let mut low = 0usize;
        let mut high = self.entries.len();
        let mut comparisons = 0u32;

        while low < high {
            let mid = low + (high - low) / 2;
            comparisons += 1;
            match self.entries[mid].0.cmp(&needle) {
                std::cmp::Ordering::Equal => return (Some(self.entries[mid].1), comparisons),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }

        (None, comparisons)
    }

    /// Read an object's kind and payload, resolving delta chains.
    pub fn get(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Bytes)>> {
        let (offset, _) = self.search(oid);
        match offset {
            Some(offset) => self.read_record(offset, 0).map(Some),
            None => Ok(None),
        }
    }

    fn read_record(&self, offset: u64, depth: u32) -> Result<(ObjectType, Bytes)> {
        if depth > MAX_DELTA_CHAIN {
            return Err(corrupt("delta chain exceeds maximum depth"));
        }

        let mut reader = Cursor::new(&self.data[..]);
        reader.set_position(offset);

        let kind = ObjectType::from_u8(reader.read_u8().map_err(|_| corrupt("truncated record"))?)?;
        let flags = reader.read_u8().map_err(|_| corrupt("truncated record"))?;

        if flags & FLAG_DELTA != 0 {
            let base_oid = ObjectId::read_raw_from(&mut reader)?;
            let delta_len = reader
                .read_u32::<BigEndian>()
                .map_err(|_| corrupt("truncated delta header"))? as usize;
            let start = reader.position() as usize;
            let end = start
                .checked_add(delta_len)
                .filter(|end| *end <= self.data.len())
                .ok_or_else(|| corrupt("delta runs past pack end"))?;
            let patch = &self.data[start..end];

            let (base_offset, _) = self.search(&base_oid);
            let base_offset = base_offset
                .ok_or_else(|| corrupt(format!("delta base {base_oid} missing from pack")))?;
            let (_, base_payload) = self.read_record(base_offset, depth + 1)?;

            Ok((kind, delta::apply(&base_payload, patch)?))
        } else {
            let payload_len = reader
                .read_u32::<BigEndian>()
                .map_err(|_| corrupt("truncated payload header"))? as usize;
            let start = reader.position() as usize;
            let end = start
                .checked_add(payload_len)
                .filter(|end| *end <= self.data.len())
                .ok_or_else(|| corrupt("payload runs past pack end"))?;

            let mut decoder = ZlibDecoder::new(&self.data[start..end]);
            let mut payload = Vec::new();
            decoder
                .read_to_end(&mut payload)
                .map_err(|_| corrupt("payload decompression failed"))?;

            Ok((kind, Bytes::from(payload)))
        }
    }

    /// Read a file and verify its SHA-256 trailer, returning the body.
    fn read_verified(path: &Path) -> Result<Vec<u8>> {
        let mut raw = std::fs::read(path)?;
        if raw.len() < 32 {
            return Err(corrupt(format!("{} is too short", path.display())));
        }

        let body_len = raw.len() - 32;
        let expected: [u8; 32] = raw[body_len..]
            .try_into()
            .map_err(|_| corrupt("trailer read failed"))?;
        let actual: [u8; 32] = Sha256::digest(&raw[..body_len]).into();
        if expected != actual {
            return Err(corrupt(format!("{} trailer mismatch", path.display())));
        }

        raw.truncate(body_len);
        Ok(raw)
    }

    fn check_header(body: &[u8], magic: &[u8; 4], what: &str) -> Result<()> {
        if body.len() < 12 || &body[..4] != magic {
            return Err(corrupt(format!("bad {what} magic")));
        }
        let version = u32::from_be_bytes(
            body[4..8]
                .try_into()
                .map_err(|_| corrupt("header read failed"))?,
        );
        if version != PACK_VERSION {
            return Err(corrupt(format!("unsupported {what} version {version}")));
        }
        Ok(())
    }

    fn parse_index(body: &[u8]) -> Result<Vec<([u8; OBJECT_ID_RAW_LENGTH], u64)>> {
        let count = u32::from_be_bytes(
            body[8..12]
                .try_into()
                .map_err(|_| corrupt("header read failed"))?,
        ) as usize;

        let expected_len = 12 + count * INDEX_ENTRY_SIZE;
        if body.len() != expected_len {
            return Err(corrupt("index size does not match entry count"));
        }

        let mut entries = Vec::with_capacity(count);
        let mut cursor = Cursor::new(&body[12..]);
        for _ in 0..count {
            let mut hash = [0u8; OBJECT_ID_RAW_LENGTH];
            cursor
                .read_exact(&mut hash)
                .map_err(|_| corrupt("truncated index entry"))?;
            let offset = cursor
                .read_u64::<BigEndian>()
                .map_err(|_| corrupt("truncated index entry"))?;
            entries.push((hash, offset));
        }

        // the writer sorts; verify so binary search is sound
        if !entries.windows(2).all(|pair| pair[0].0 < pair[1].0) {
            return Err(corrupt("index entries are not strictly sorted"));
        }

        Ok(entries)
    }
}
