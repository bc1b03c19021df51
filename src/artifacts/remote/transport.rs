//! Remote transport abstraction
//!
//! Four operations, each with the atomicity stated in the protocol:
//!
//! - `GET refs` — enumerate ref-name → hash
//! - `GET object <hash>` — canonical bytes (loose or resolved from a pack)
//! - `PUT object <hash> <bytes>` — write if absent
//! - `CAS-UPDATE ref <name> <expected> <new>` — atomic compare-and-set
//!
//! [`FileTransport`] is the reference implementation over a repository on
//! the local filesystem. Its CAS takes the remote repository's write lock,
//! so exactly one of two concurrent pushes with the same expected tip can
//! succeed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use file_guard::Lock;

use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::crypto::signing::KeyStore;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};

/// Abstract remote endpoint.
pub trait Transport {
    /// Enumerate the remote's refs as `ref path → commit id`
    /// (e.g. `refs/heads/main`).
    fn list_refs(&self) -> Result<HashMap<String, ObjectId>>;

    /// Canonical bytes of one object. Fails with `NotFound` when absent.
    fn read_object(&self, oid: &ObjectId) -> Result<Bytes>;

    /// Write an object if absent. Idempotent.
    fn write_object(&self, oid: &ObjectId, canonical: &[u8]) -> Result<()>;

    /// Atomically update a ref from `expected` to `new`.
    ///
    /// Fails with `NonFastForward` when the current value is not
    /// `expected`; the ref is left untouched in that case.
    fn cas_update_ref(
        &self,
        name: &str,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> Result<()>;

    /// Whether the remote has an object.
    fn has_object(&self, oid: &ObjectId) -> Result<bool> {
        match self.read_object(oid) {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Public keys the remote publishes, as `(fingerprint, raw bytes)`.
    /// Copied into the local staging area on clone.
    fn published_keys(&self) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(Vec::new())
    }
}

/// Reference transport: another repository on the local filesystem.
#[derive(Debug)]
pub struct FileTransport {
    mem_dir: PathBuf,
    database: Database,
    refs: Refs,
}

impl FileTransport {
    /// Open a transport over `<url>/.mem`.
    pub fn new(url: &Path) -> Result<Self> {
        let mem_dir = url.join(".mem");
        if !mem_dir.exists() {
            return Err(Error::transport(format!(
                "no repository at {}",
                url.display()
            )));
        }
        Ok(FileTransport {
            database: Database::new(mem_dir.join("objects").into_boxed_path(), None, true),
            refs: Refs::new(mem_dir.clone().into_boxed_path()),
            mem_dir,
        })
    }

    fn lock_path(&self) -> PathBuf {
        self.mem_dir.join("lock")
    }
}

impl Transport for FileTransport {
    fn list_refs(&self) -> Result<HashMap<String, ObjectId>> {
        self.refs.all_refs()
    }

    fn read_object(&self, oid: &ObjectId) -> Result<Bytes> {
        self.database.get_canonical(oid)
    }

    fn write_object(&self, oid: &ObjectId, canonical: &[u8]) -> Result<()> {
        self.database.put_canonical(oid, canonical)?;
        Ok(())
    }

    fn cas_update_ref(
        &self,
        name: &str,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> Result<()> {
        let branch = name
            .strip_prefix("refs/heads/")
            .ok_or_else(|| Error::transport(format!("cannot CAS non-branch ref '{name}'")))?;
        let branch = RefName::try_parse(branch)?;

        // the remote repository's write lock serializes concurrent CAS
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        let _guard = file_guard::lock(&lock_file, Lock::Exclusive, 0, 1)
            .map_err(|_| Error::LockBusy)?;

        let current = self.refs.read_branch(&branch)?;
        if current.as_ref() != expected {
            return Err(Error::NonFastForward {
                branch: branch.as_ref().to_string(),
            });
        }

        self.refs.set_branch(&branch, new)
    }

    fn published_keys(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let keystore = KeyStore::new(self.mem_dir.join("keys").into_boxed_path());
        let mut keys = Vec::new();
        for fingerprint in keystore.list_public()? {
            keys.push((fingerprint.clone(), keystore.public_key_bytes(&fingerprint)?));
        }
        Ok(keys)
    }
}
