//! Cryptographic integrity layer
//!
//! - `merkle`: balanced binary hash tree over a commit's `(path, blob)`
//!   leaves, plus single-leaf membership proofs
//! - `signing`: Ed25519 key management and Merkle-root signatures
//! - `encryption`: optional AES-256-GCM at rest with an Argon2id-derived
//!   key (hash-then-encrypt, so plaintext-hash deduplication survives)
//!
//! The proofs here are Merkle set-membership proofs. They leak the leaf
//! count and are not zero-knowledge.

pub mod encryption;
pub mod merkle;
pub mod signing;
