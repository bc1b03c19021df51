pub mod blob;
pub mod commit;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tree;

/// Length of an object id in hexadecimal characters (SHA-256).
pub const OBJECT_ID_LENGTH: usize = 64;

/// Length of an object id in raw bytes.
pub const OBJECT_ID_RAW_LENGTH: usize = 32;

/// Shortest hash prefix accepted for object lookup.
pub const MIN_PREFIX_LENGTH: usize = 4;
