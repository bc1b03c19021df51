//! Object database
//!
//! Content-addressable storage for all memory objects (blobs, trees,
//! commits). Objects are identified by the SHA-256 of their canonical byte
//! form and stored in a directory structure based on the hash prefix.
//!
//! ## Storage Format
//!
//! - Path: `.mem/objects/ab/cdef123...` (first 2 chars as directory)
//! - Content: zlib-compressed canonical form (`<type> <size>\0<payload>`),
//!   optionally AES-256-GCM encrypted after hashing
//! - Packs: `.mem/objects/pack/<id>.pack` + `.idx`, consulted when a loose
//!   object is missing
//!
//! Writes go to a temp file and are atomically renamed into place, so a
//! reader never observes a half-written object. Storing the same content
//! twice is a no-op (deduplication).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::{BufRead, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use tracing::trace;

use crate::artifacts::crypto::encryption::Encryptor;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::{
    Object, ObjectBox, Unpackable, canonical_bytes, hash_payload,
};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::objects::{MIN_PREFIX_LENGTH, OBJECT_ID_LENGTH};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::pack::reader::PackReader;
use crate::errors::{Error, Result};

/// First byte of a zlib stream with any standard window size.
const ZLIB_MAGIC: u8 = 0x78;

/// Object database
///
/// Manages storage and retrieval of content-addressable objects. Loose
/// objects are immutable once written; pack files are registered lazily.
#[derive(Debug)]
pub struct Database {
    /// Path to the objects directory (typically `.mem/objects`)
    path: Box<Path>,
    /// Optional at-rest encryption, applied after hashing
    encryptor: Option<Encryptor>,
    /// zlib compression toggle from `core.compression`
    compression: bool,
    /// Opened pack readers, loaded on first pack lookup
    packs: Mutex<Option<Vec<PackReader>>>,
}

impl Database {
    /// Create a new database instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the objects directory (typically `.mem/objects`)
    /// * `encryptor` - at-rest encryption, when enabled in config
    /// * `compression` - zlib toggle from `core.compression`
    pub fn new(path: Box<Path>, encryptor: Option<Encryptor>, compression: bool) -> Self {
        Database {
            path,
            encryptor,
            compression,
            packs: Mutex::new(None),
        }
    }

    /// Get the path to the objects directory
    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    /// Get the path to the pack directory
    pub fn pack_path(&self) -> PathBuf {
        self.path.join("pack")
    }

    /// Store a raw payload of the given kind.
    ///
    /// Idempotent: identical content produces the same hash and at most one
    /// on-disk object.
    ///
    /// # Returns
    ///
    /// The object id of the (possibly pre-existing) object.
    pub fn put(&self, kind: ObjectType, payload: &[u8]) -> Result<ObjectId> {
        let oid = hash_payload(kind, payload);
        let object_path = self.path.join(oid.to_path());

        if !object_path.exists() {
            let parent = object_path.parent().ok_or_else(|| {
                Error::invalid_argument(format!("invalid object path {}", object_path.display()))
            })?;
            std::fs::create_dir_all(parent)?;
            self.write_object(&object_path, canonical_bytes(kind, payload))?;
            trace!(object = %oid, kind = %kind, "stored loose object");
        }

        Ok(oid)
    }

    /// Store an object implementing the [`Object`] trait.
    pub fn store(&self, object: &impl Object) -> Result<ObjectId> {
        let content = object.serialize()?;
        let oid = object.object_id()?;
        let object_path = self.path.join(oid.to_path());

        // write the object unless it already exists (deduplication)
        if !object_path.exists() {
            let parent = object_path.parent().ok_or_else(|| {
                Error::invalid_argument(format!("invalid object path {}", object_path.display()))
            })?;
            std::fs::create_dir_all(parent)?;
            self.write_object(&object_path, content)?;
        }

        Ok(oid)
    }

    /// Ingest an object from its canonical byte form, verifying that the
    /// bytes hash to the expected id. Used when promoting fetched objects
    /// out of quarantine.
    pub fn put_canonical(&self, expected: &ObjectId, canonical: &[u8]) -> Result<ObjectId> {
        let mut reader = Cursor::new(canonical);
        let kind = ObjectType::parse_object_type(&mut reader)?;
        let payload = &canonical[reader.position() as usize..];

        let oid = hash_payload(kind, payload);
        if &oid != expected {
            return Err(Error::HashMismatch {
                object: expected.as_ref().to_string(),
            });
        }
        self.put(kind, payload)
    }

    /// Re-hash an object's stored bytes and compare against its name.
    ///
    /// A present-but-unreadable object (failed decompression, torn write)
    /// is tampering evidence and reports as `HashMismatch` too.
    pub fn verify_object(&self, oid: &ObjectId) -> Result<()> {
        let (kind, payload) = match self.get(oid) {
            Ok(found) => found,
            Err(err @ Error::NotFound { .. }) => return Err(err),
            Err(_) => {
                return Err(Error::HashMismatch {
                    object: oid.as_ref().to_string(),
                });
            }
        };
        let actual = hash_payload(kind, &payload);
        if &actual != oid {
            return Err(Error::HashMismatch {
                object: oid.as_ref().to_string(),
            });
        }
        Ok(())
    }

    /// Whether an object exists, loose or packed.
    pub fn exists(&self, oid: &ObjectId) -> bool {
        if self.path.join(oid.to_path()).exists() {
            return true;
        }
        self.with_packs(|packs| packs.iter().any(|pack| pack.contains(oid)))
            .unwrap_or(false)
    }

    /// Read an object's kind and raw payload.
    ///
    /// Resolves from loose storage first, then scans pack indices.
    pub fn get(&self, oid: &ObjectId) -> Result<(ObjectType, Bytes)> {
        let (kind, reader) = self.parse_object_as_bytes(oid)?;
        let payload = reader
            .bytes()
            .collect::<std::result::Result<Vec<u8>, std::io::Error>>()?;
        Ok((kind, Bytes::from(payload)))
    }

    /// Read an object's canonical byte form (`<type> <size>\0<payload>`),
    /// the representation streamed over the remote protocol.
    pub fn get_canonical(&self, oid: &ObjectId) -> Result<Bytes> {
        let (kind, payload) = self.get(oid)?;
        Ok(canonical_bytes(kind, &payload))
    }

    /// Parse an object from the database into the appropriate type
    pub fn parse_object(&self, oid: &ObjectId) -> Result<ObjectBox> {
        let (object_type, object_reader) = self.parse_object_as_bytes(oid)?;

        match object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(object_reader)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(object_reader)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(
                object_reader,
            )?))),
        }
    }

    /// Parse an object as a Blob, if it is one
    pub fn parse_object_as_blob(&self, oid: &ObjectId) -> Result<Option<Blob>> {
        let (object_type, object_reader) = self.parse_object_as_bytes(oid)?;
        match object_type {
            ObjectType::Blob => Ok(Some(Blob::deserialize(object_reader)?)),
            _ => Ok(None),
        }
    }

    /// Parse an object as a Tree, if it is one
    pub fn parse_object_as_tree(&self, oid: &ObjectId) -> Result<Option<Tree>> {
        let (object_type, object_reader) = self.parse_object_as_bytes(oid)?;
        match object_type {
            ObjectType::Tree => Ok(Some(Tree::deserialize(object_reader)?)),
            _ => Ok(None),
        }
    }

    /// Parse an object as a Commit, if it is one
    pub fn parse_object_as_commit(&self, oid: &ObjectId) -> Result<Option<Commit>> {
        let (object_type, object_reader) = self.parse_object_as_bytes(oid)?;
        match object_type {
            ObjectType::Commit => Ok(Some(Commit::deserialize(object_reader)?)),
            _ => Ok(None),
        }
    }

    /// Load a commit, failing if the object is missing or another kind.
    pub fn require_commit(&self, oid: &ObjectId) -> Result<Commit> {
        self.parse_object_as_commit(oid)?
            .ok_or_else(|| Error::not_found(format!("commit {oid}")))
    }

    /// Load a tree, failing if the object is missing or another kind.
    pub fn require_tree(&self, oid: &ObjectId) -> Result<Tree> {
        self.parse_object_as_tree(oid)?
            .ok_or_else(|| Error::not_found(format!("tree {oid}")))
    }

    /// Get the type of an object without materializing it.
    pub fn get_object_type(&self, oid: &ObjectId) -> Result<ObjectType> {
        let (object_type, _) = self.parse_object_as_bytes(oid)?;
        Ok(object_type)
    }

    fn parse_object_as_bytes(&self, oid: &ObjectId) -> Result<(ObjectType, impl BufRead)> {
        let canonical = self.read_canonical(oid)?;
        let mut object_reader = Cursor::new(canonical);
        let object_type = ObjectType::parse_object_type(&mut object_reader)?;
        Ok((object_type, object_reader))
    }

    fn read_canonical(&self, oid: &ObjectId) -> Result<Bytes> {
        let object_path = self.path.join(oid.to_path());
        if object_path.exists() {
            return self.read_loose(&object_path);
        }

        // fall back to pack storage
        if let Some((kind, payload)) =
            self.with_packs(|packs| -> Result<Option<(ObjectType, Bytes)>> {
                for pack in packs {
                    if let Some(found) = pack.get(oid)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            })??
        {
            return Ok(canonical_bytes(kind, &payload));
        }

        Err(Error::not_found(format!("object {oid}")))
    }

    fn read_loose(&self, object_path: &Path) -> Result<Bytes> {
        let mut raw = std::fs::read(object_path)?;

        if let Some(encryptor) = &self.encryptor {
            raw = encryptor.decrypt(&raw)?.to_vec();
        }

        // tolerate repos whose compression setting changed over time
        if raw.first() == Some(&ZLIB_MAGIC) {
            Self::decompress(&raw)
        } else {
            Ok(Bytes::from(raw))
        }
    }

    fn write_object(&self, object_path: &Path, content: Bytes) -> Result<()> {
        let object_dir = object_path.parent().ok_or_else(|| {
            Error::invalid_argument(format!("invalid object path {}", object_path.display()))
        })?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        let mut bytes = if self.compression {
            Self::compress(&content)?
        } else {
            content
        };
        if let Some(encryptor) = &self.encryptor {
            bytes = encryptor.encrypt(&bytes)?;
        }

        let write_result = (|| -> Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_object_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            Ok(())
        })();

        if let Err(err) = write_result {
            let _ = std::fs::remove_file(&temp_object_path);
            return Err(err);
        }

        // rename makes the write atomic for readers
        std::fs::rename(&temp_object_path, object_path)?;
        Ok(())
    }

    fn compress(data: &[u8]) -> Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    fn decompress(data: &[u8]) -> Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(Bytes::from(decompressed))
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }

    /// Iterate all loose object ids, for GC scans.
    pub fn iter_loose(&self) -> Result<Vec<ObjectId>> {
        let mut objects = Vec::new();
        if !self.path.exists() {
            return Ok(objects);
        }

        for prefix_entry in std::fs::read_dir(&self.path)? {
            let prefix_entry = prefix_entry?;
            let prefix_name = prefix_entry.file_name();
            let prefix = prefix_name.to_string_lossy();
            if prefix.len() != 2 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
                continue; // skip pack/ and strays
            }

            for entry in std::fs::read_dir(prefix_entry.path())? {
                let file_name = entry?.file_name();
                let suffix = file_name.to_string_lossy();
                let full = format!("{prefix}{suffix}");
                if let Ok(oid) = ObjectId::try_parse(full) {
                    objects.push(oid);
                }
            }
        }

        Ok(objects)
    }

    /// Delete a loose object. Used only by the GC sweep phase.
    pub fn remove_loose(&self, oid: &ObjectId) -> Result<()> {
        let object_path = self.path.join(oid.to_path());
        if object_path.exists() {
            std::fs::remove_file(&object_path)?;
            // drop the prefix directory when it empties out
            if let Some(parent) = object_path.parent()
                && parent.read_dir()?.next().is_none()
            {
                let _ = std::fs::remove_dir(parent);
            }
        }
        Ok(())
    }

    /// Find all objects whose id starts with the given prefix.
    ///
    /// Used to resolve abbreviated ids. Prefixes shorter than
    /// [`MIN_PREFIX_LENGTH`] are rejected.
    ///
    /// # Returns
    ///
    /// All matching ids; more than one means the prefix is ambiguous.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        if prefix.len() < MIN_PREFIX_LENGTH || prefix.len() > OBJECT_ID_LENGTH {
            return Err(Error::invalid_argument(format!(
                "hash prefix must be {MIN_PREFIX_LENGTH}..{OBJECT_ID_LENGTH} characters"
            )));
        }
        if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_argument(format!(
                "invalid hash prefix '{prefix}'"
            )));
        }

        let prefix = prefix.to_lowercase();
        let mut matches = HashSet::new();

        // loose objects: only the matching fan-out directory needs scanning
        let dir_name = &prefix[..2];
        let file_prefix = &prefix[2..];
        let dir_path = self.path.join(dir_name);
        if dir_path.is_dir() {
            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let file_name = file_name.to_string_lossy();
                if file_name.starts_with(file_prefix)
                    && let Ok(oid) = ObjectId::try_parse(format!("{dir_name}{file_name}"))
                {
                    matches.insert(oid);
                }
            }
        }

        // packed objects
        self.with_packs(|packs| {
            for pack in packs {
                for oid in pack.object_ids() {
                    if oid.as_ref().starts_with(&prefix) {
                        matches.insert(oid);
                    }
                }
            }
        })?;

        let mut matches: Vec<ObjectId> = matches.into_iter().collect();
        matches.sort();
        Ok(matches)
    }

    /// Force pack discovery on next lookup (after a repack).
    pub fn refresh_packs(&self) {
        if let Ok(mut packs) = self.packs.lock() {
            *packs = None;
        }
    }

    /// Ids of every object stored in a pack.
    pub fn packed_object_ids(&self) -> Result<Vec<ObjectId>> {
        self.with_packs(|packs| {
            packs
                .iter()
                .flat_map(|pack| pack.object_ids().collect::<Vec<_>>())
                .collect()
        })
    }

    fn with_packs<T>(&self, action: impl FnOnce(&[PackReader]) -> T) -> Result<T> {
        let mut guard = self
            .packs
            .lock()
            .map_err(|_| Error::invalid_argument("pack registry poisoned"))?;

        if guard.is_none() {
            let mut readers = Vec::new();
            for pack_path in PackReader::discover(&self.pack_path())? {
                readers.push(PackReader::open(&pack_path)?);
            }
            *guard = Some(readers);
        }

        Ok(action(guard.as_deref().unwrap_or_default()))
    }

    /// Flatten a tree into a `path → (blob, mode)` map.
    ///
    /// Iterative worklist traversal; the object DAG is acyclic by
    /// construction but depth is unbounded.
    pub fn flatten_tree(&self, tree_oid: &ObjectId) -> Result<BTreeMap<String, (ObjectId, EntryMode)>> {
        let mut flat = BTreeMap::new();
        let mut worklist = VecDeque::from([(String::new(), tree_oid.clone())]);

        while let Some((prefix, oid)) = worklist.pop_front() {
            let tree = self.require_tree(&oid)?;
            for (name, entry) in tree.entries() {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                if entry.mode.is_directory() {
                    worklist.push_back((path, entry.oid.clone()));
                } else {
                    flat.insert(path, (entry.oid.clone(), entry.mode));
                }
            }
        }

        Ok(flat)
    }

    /// Collect every object hash reachable from a commit: the commit, its
    /// trees, and its blobs. Parents are *not* followed.
    pub fn collect_commit_objects(&self, commit_oid: &ObjectId) -> Result<HashSet<ObjectId>> {
        let mut objects = HashSet::from([commit_oid.clone()]);
        let commit = self.require_commit(commit_oid)?;

        let mut worklist = VecDeque::from([commit.tree_oid().clone()]);
        while let Some(tree_oid) = worklist.pop_front() {
            if !objects.insert(tree_oid.clone()) {
                continue;
            }
            let tree = self.require_tree(&tree_oid)?;
            for (_, entry) in tree.entries() {
                if entry.mode.is_directory() {
                    worklist.push_back(entry.oid.clone());
                } else {
                    objects.insert(entry.oid.clone());
                }
            }
        }

        Ok(objects)
    }
}

/// Commit cache for graph traversal algorithms
///
/// Stores slim commit views so merge-base finding and reachability walks
/// can revisit commits without re-reading the object store.
#[derive(Debug, Default)]
pub struct CommitCache {
    commits: HashMap<ObjectId, SlimCommit>,
}

impl CommitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a commit into the cache if not already present
    pub fn load_commit(&mut self, database: &Database, oid: &ObjectId) -> Result<()> {
        if self.commits.contains_key(oid) {
            return Ok(());
        }
        let commit = database.require_commit(oid)?;
        self.commits.insert(
            oid.clone(),
            SlimCommit {
                oid: oid.clone(),
                parents: commit.parents().to_vec(),
                timestamp: commit.timestamp(),
            },
        );
        Ok(())
    }

    /// Get a slim commit, loading it from the database if necessary.
    pub fn get_or_load(&mut self, database: &Database, oid: &ObjectId) -> Result<SlimCommit> {
        self.load_commit(database, oid)?;
        self.commits
            .get(oid)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("commit {oid}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn database() -> (assert_fs::TempDir, Database) {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = Database::new(
            dir.path().join("objects").into_boxed_path(),
            None,
            true,
        );
        (dir, db)
    }

    #[test]
    fn test_put_get_round_trip() {
        let (_dir, db) = database();
        let oid = db.put(ObjectType::Blob, b"dark mode\n").unwrap();

        let (kind, payload) = db.get(&oid).unwrap();
        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(&payload[..], b"dark mode\n");
    }

    #[test]
    fn test_put_is_idempotent() {
        let (_dir, db) = database();
        let first = db.put(ObjectType::Blob, b"same").unwrap();
        let second = db.put(ObjectType::Blob, b"same").unwrap();
        assert_eq!(first, second);
        assert_eq!(db.iter_loose().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let (_dir, db) = database();
        let absent = ObjectId::from_raw(&[9; 32]);
        assert!(!db.exists(&absent));
        assert!(matches!(db.get(&absent), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_prefix_resolution() {
        let (_dir, db) = database();
        let oid = db.put(ObjectType::Blob, b"unique content").unwrap();

        let matches = db.find_objects_by_prefix(&oid.as_ref()[..8]).unwrap();
        assert_eq!(matches, vec![oid]);
    }

    #[test]
    fn test_prefix_too_short_rejected() {
        let (_dir, db) = database();
        assert!(db.find_objects_by_prefix("abc").is_err());
    }

    #[test]
    fn test_encrypted_round_trip_keeps_plaintext_hash() {
        let dir = assert_fs::TempDir::new().unwrap();
        let plain = Database::new(dir.path().join("a").into_boxed_path(), None, true);
        let encryptor = Encryptor::new(&[7u8; 32]);
        let encrypted = Database::new(
            dir.path().join("b").into_boxed_path(),
            Some(encryptor),
            true,
        );

        let payload = b"hash-then-encrypt keeps dedup";
        let plain_oid = plain.put(ObjectType::Blob, payload).unwrap();
        let encrypted_oid = encrypted.put(ObjectType::Blob, payload).unwrap();

        // same plaintext hash even though the on-disk bytes differ
        assert_eq!(plain_oid, encrypted_oid);
        let (_, read_back) = encrypted.get(&encrypted_oid).unwrap();
        assert_eq!(&read_back[..], payload);
    }

    #[test]
    fn test_uncompressed_round_trip() {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = Database::new(dir.path().join("objects").into_boxed_path(), None, false);
        let oid = db.put(ObjectType::Blob, b"raw bytes").unwrap();
        let (_, payload) = db.get(&oid).unwrap();
        assert_eq!(&payload[..], b"raw bytes");
    }
}
