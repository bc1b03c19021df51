//! Pack files
//!
//! A pack concatenates many object payloads into a single file with a side
//! index for O(log n) lookup. Objects appear either FULL (zlib of the raw
//! payload) or DELTA (base hash + copy/insert patch). Delta chains always
//! terminate at a FULL object within the same pack and are at most 16 deep.
//!
//! ## Pack layout (all integers big-endian)
//!
//! ```text
//! magic "PACK" | version u32 | object_count u32
//!   { for each object:
//!       kind u8 | flags u8
//!       if DELTA: base_hash 32B | delta_length u32 | delta_bytes
//!       else:     payload_length u32 | zlib(payload)
//!   }
//! trailer: SHA-256 of all preceding bytes
//! ```
//!
//! ## Index layout
//!
//! ```text
//! magic "PIDX" | version u32 | entry_count u32
//!   sorted_by_hash[ {hash 32B, offset u64} ]
//! trailer: SHA-256
//! ```
//!
//! Both trailers are verified when a pack is opened.

pub mod delta;
pub mod reader;
pub mod writer;

/// Pack file magic bytes
pub const PACK_MAGIC: &[u8; 4] = b"PACK";

/// Pack index magic bytes
pub const IDX_MAGIC: &[u8; 4] = b"PIDX";

/// Pack and index format version
pub const PACK_VERSION: u32 = 1;

/// Record flag marking a delta-encoded object
pub const FLAG_DELTA: u8 = 0x01;

/// Only store a delta when it is smaller than this fraction of the target.
pub const DELTA_SIZE_RATIO: f64 = 0.8;
