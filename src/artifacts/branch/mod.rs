//! Branch and revision handling
//!
//! - `branch_name`: validated ref names (branches, tags)
//! - `revision`: revision expressions (`HEAD`, `HEAD~n`, names, hash
//!   prefixes) and their resolution to commit ids

pub mod branch_name;
pub mod revision;

/// Alias accepted for `HEAD` in revision expressions.
pub const HEAD_ALIAS: &str = "@";
