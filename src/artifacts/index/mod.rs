//! Staging index data structures
//!
//! The index (staging area) records which blobs should be included in the
//! next commit, keyed by repo-relative path.
//!
//! ## File Format (Version 1)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "AIDX" (4 bytes)
//!   - Version: 1 (4 bytes, big-endian)
//!   - Entry count (4 bytes, big-endian)
//!
//! Entries (variable length):
//!   - path length u16 | path bytes | oid 32B | size u64 | mtime secs i64 |
//!     mtime nanos u32 | mode u32
//!
//! Checksum (32 bytes):
//!   - SHA-256 hash of all preceding bytes
//! ```

pub mod entry_mode;
pub mod index_entry;

/// Size of SHA-256 checksum in bytes
pub const CHECKSUM_SIZE: usize = 32;

/// Magic signature identifying staging index files
pub const SIGNATURE: &[u8; 4] = b"AIDX";

/// Staging index format version
pub const VERSION: u32 = 1;
