//! agmem — content-addressed version control for AI-agent memory artifacts
//!
//! Memory files live in three semantic classes derived from their top-level
//! directory under the working root (`current/`):
//!
//! - `episodic/` — time-stamped event logs
//! - `semantic/` — facts and preferences
//! - `procedural/` — workflows and checklists
//!
//! The crate provides Git-style commit history, branching, three-way
//! memory-type-aware merging, pack files with delta compression, remote
//! synchronization over a pluggable transport, and cryptographic integrity
//! (Merkle roots, Ed25519 signatures, a hash-chained audit log, optional
//! AES-256-GCM encryption at rest).
//!
//! The entry point is [`areas::repository::Repository`]: open or initialize
//! a repository, then drive every operation through the handle. All public
//! operations are synchronous and return [`errors::Error`] values; nothing
//! in the core panics on user input.

pub mod areas;
pub mod artifacts;
pub mod errors;

pub use areas::repository::Repository;
pub use errors::{Error, Result};
