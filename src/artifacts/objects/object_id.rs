//! Object identifier (SHA-256 hash)
//!
//! Object IDs are 64-character hexadecimal strings representing SHA-256
//! hashes over an object's canonical byte form. They uniquely identify all
//! objects in the store (blobs, trees, commits).
//!
//! ## Format
//!
//! - Full: 64 hex characters
//! - Short: first 8 characters (display abbreviation)
//! - Prefix lookup: at least 4 hex characters
//!
//! ## Storage
//!
//! Objects are stored in `.mem/objects/<first-2-chars>/<remaining-62-chars>`

use std::io;
use std::path::PathBuf;

use crate::artifacts::objects::{OBJECT_ID_LENGTH, OBJECT_ID_RAW_LENGTH};
use crate::errors::{Error, Result};

/// Object identifier (SHA-256 hash)
///
/// A 64-character lowercase hexadecimal string that uniquely identifies an
/// object. Provides parsing, binary serialization, and path conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object ID from a string
    ///
    /// # Arguments
    ///
    /// * `id` - 64-character hexadecimal string
    ///
    /// # Returns
    ///
    /// Validated ObjectId or error if invalid length/characters
    pub fn try_parse(id: String) -> Result<Self> {
        if id.len() != OBJECT_ID_LENGTH {
            return Err(Error::invalid_argument(format!(
                "invalid object id length: {}",
                id.len()
            )));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_argument(format!(
                "invalid object id characters: {id}"
            )));
        }
        Ok(Self(id.to_lowercase()))
    }

    /// Build an object ID from a raw 32-byte digest.
    pub fn from_raw(digest: &[u8; OBJECT_ID_RAW_LENGTH]) -> Self {
        let mut hex = String::with_capacity(OBJECT_ID_LENGTH);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// Convert the hex form back to raw 32 bytes.
    pub fn to_raw(&self) -> [u8; OBJECT_ID_RAW_LENGTH] {
        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        for (i, byte) in raw.iter_mut().enumerate() {
            // validated as hex at construction
            *byte = u8::from_str_radix(&self.0[i * 2..i * 2 + 2], 16).unwrap_or(0);
        }
        raw
    }

    /// Write the object ID in binary format (32 bytes)
    ///
    /// Used when serializing tree objects and pack records.
    ///
    /// # Arguments
    ///
    /// * `writer` - Destination for the binary data
    pub fn write_raw_to<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_raw())?;
        Ok(())
    }

    /// Read an object ID from binary format (32 bytes)
    ///
    /// # Arguments
    ///
    /// * `reader` - Source of the binary data
    pub fn read_raw_from<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        reader.read_exact(&mut raw)?;
        Ok(Self::from_raw(&raw))
    }

    /// Convert to file system path for object storage
    ///
    /// Splits the hash as `XX/YYYY...` where XX is the first 2 chars.
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// Get abbreviated form of the object ID
    ///
    /// # Returns
    ///
    /// First 8 characters of the hash
    pub fn to_short_oid(&self) -> String {
        self.0.split_at(8).0.to_string()
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
