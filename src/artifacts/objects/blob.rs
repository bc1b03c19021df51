//! Blob object
//!
//! Blobs store memory-file content. They contain only the raw bytes,
//! without any metadata like filename or permissions (those live in trees).
//!
//! ## Format
//!
//! On disk: `blob <size>\0<content>`

use std::io::BufRead;

use bytes::Bytes;
use derive_new::new;

use crate::artifacts::objects::object::{Object, Packable, Unpackable, canonical_bytes};
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::Result;

/// Blob object representing file content
///
/// Each unique file content is stored once, identified by its SHA-256 hash.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    /// Opaque byte payload
    content: Bytes,
}

impl Blob {
    /// Get the raw content bytes
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Interpret the content as UTF-8 text, lossily.
    pub fn content_utf8_lossy(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl Packable for Blob {
    fn serialize(&self) -> Result<Bytes> {
        Ok(canonical_bytes(self.object_type(), &self.content))
    }
}

impl Unpackable for Blob {
    fn deserialize(reader: impl BufRead) -> Result<Self> {
        // the header has already been read
        let content = reader
            .bytes()
            .collect::<std::result::Result<Vec<u8>, std::io::Error>>()?;

        Ok(Self::new(Bytes::from(content)))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn display(&self) -> String {
        self.content_utf8_lossy()
    }
}
