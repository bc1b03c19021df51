//! Core object traits and types
//!
//! This module defines the fundamental traits that all memory objects
//! implement:
//! - `Packable`: Serialization to the canonical binary format
//! - `Unpackable`: Deserialization from the canonical binary format
//! - `Object`: Common object operations (ID computation, display)
//!
//! ## Object Format
//!
//! All objects are stored as:
//! ```text
//! <type> <size>\0<content>
//! ```
//! Then compressed with zlib and stored in `.mem/objects/`. The SHA-256 of
//! the uncompressed form (header included) is the object id, so the kind is
//! recoverable from the stored bytes without a side table.

use std::io::BufRead;
use std::path::PathBuf;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::errors::Result;

/// Trait for serializing objects to the canonical binary format
pub trait Packable {
    /// Serialize the object to bytes (including header)
    fn serialize(&self) -> Result<Bytes>;
}

/// Trait for deserializing objects from the canonical binary format
pub trait Unpackable {
    /// Deserialize the object from a reader (header already consumed)
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

/// Core object trait
///
/// Implemented by all object types (Blob, Tree, Commit).
/// Provides common operations like ID computation and display.
pub trait Object: Packable {
    /// Get the object's type
    fn object_type(&self) -> ObjectType;

    /// Get a human-readable representation
    fn display(&self) -> String;

    /// Compute the object ID (SHA-256 hash)
    ///
    /// The ID is computed by hashing the serialized content.
    fn object_id(&self) -> Result<ObjectId> {
        let content = self.serialize()?;
        Ok(hash_bytes(&content))
    }

    /// Get the file system path where this object would be stored
    fn object_path(&self) -> Result<PathBuf> {
        Ok(self.object_id()?.to_path())
    }
}

/// SHA-256 over arbitrary bytes as an [`ObjectId`].
pub fn hash_bytes(content: &[u8]) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest: [u8; 32] = hasher.finalize().into();
    ObjectId::from_raw(&digest)
}

/// Compute the object id for a raw payload of the given kind.
///
/// Builds the canonical header without retaining the full canonical buffer.
pub fn hash_payload(object_type: ObjectType, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(format!("{} {}\0", object_type.as_str(), payload.len()).as_bytes());
    hasher.update(payload);
    let digest: [u8; 32] = hasher.finalize().into();
    ObjectId::from_raw(&digest)
}

/// Prepend the canonical `<type> <size>\0` header to a payload.
pub fn canonical_bytes(object_type: ObjectType, payload: &[u8]) -> Bytes {
    let header = format!("{} {}\0", object_type.as_str(), payload.len());
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    Bytes::from(out)
}

/// Type-erased object container
///
/// Used when the specific object type isn't known at compile time.
/// Allows returning different object types from a single function.
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
}

impl ObjectBox {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBox::Blob(_) => ObjectType::Blob,
            ObjectBox::Tree(_) => ObjectType::Tree,
            ObjectBox::Commit(_) => ObjectType::Commit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hash_payload_matches_canonical_hash() {
        let payload = b"dark mode\n";
        let canonical = canonical_bytes(ObjectType::Blob, payload);
        assert_eq!(
            hash_payload(ObjectType::Blob, payload),
            hash_bytes(&canonical)
        );
    }

    #[test]
    fn test_distinct_kinds_hash_differently() {
        let payload = b"same bytes";
        assert_ne!(
            hash_payload(ObjectType::Blob, payload),
            hash_payload(ObjectType::Tree, payload)
        );
    }
}
