//! Error taxonomy for the agmem core
//!
//! Every failure carries a stable kind plus human-readable context. The
//! kinds mirror the public error surface: integrity violations, naming and
//! lookup failures, concurrency/state conflicts, remote failures, and
//! client-input problems. Integrity errors are never recovered internally;
//! they are surfaced to the caller as-is.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error kinds of the core engine.
#[derive(Debug, Error)]
pub enum Error {
    // --- invariant / integrity ---
    /// Stored bytes no longer hash to the object's name.
    #[error("object {object} does not match its hash")]
    HashMismatch { object: String },

    /// A commit's recorded Merkle root does not match the recomputed one.
    #[error("merkle root mismatch for commit {commit}")]
    MerkleMismatch { commit: String },

    /// An Ed25519 signature failed verification.
    #[error("invalid signature on commit {commit}")]
    SignatureInvalid { commit: String },

    /// The audit chain is broken starting at this sequence number.
    #[error("audit log corrupt at entry {seq}")]
    AuditCorrupt { seq: u64 },

    /// AES-GCM tag mismatch while decrypting an object payload.
    #[error("decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// A pack file or pack index is malformed.
    #[error("pack corrupt: {reason}")]
    PackCorrupt { reason: String },

    /// An object's canonical byte form cannot be parsed.
    #[error("object {object} is corrupt: {reason}")]
    ObjectCorrupt { object: String, reason: String },

    // --- not-found / naming ---
    /// An object, ref, or path does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// A hash prefix or name matches more than one candidate.
    #[error("ambiguous ref '{name}': {candidates} candidates")]
    AmbiguousRef { name: String, candidates: usize },

    /// A branch or tag name fails validation.
    #[error("invalid ref name '{name}'")]
    InvalidRefName { name: String },

    /// A path escapes the working-tree or refs root after normalization.
    #[error("path '{path}' escapes the repository root")]
    PathOutsideRoot { path: PathBuf },

    // --- concurrency / state ---
    /// The repository write lock could not be acquired within the timeout.
    #[error("repository lock is busy")]
    LockBusy,

    /// The operation observed a cancellation signal and stopped early.
    #[error("operation cancelled")]
    Cancelled,

    /// A merge is in progress; the requested operation is refused.
    #[error("repository is in merging state")]
    MergingState,

    /// A merge cannot complete while conflicts remain unresolved.
    #[error("{remaining} merge conflicts are unresolved")]
    UnresolvedConflicts { remaining: usize },

    // --- remote ---
    /// A push was rejected because it would not fast-forward the remote.
    #[error("push to '{branch}' rejected: not a fast-forward")]
    NonFastForward { branch: String },

    /// The transport failed to complete a protocol operation.
    #[error("transport error: {reason}")]
    TransportError { reason: String },

    /// A commit is signed by a key that is not trusted.
    #[error("key {key_id} is not trusted")]
    UntrustedKey { key_id: String },

    // --- client input ---
    /// A configuration key or value is invalid.
    #[error("invalid config '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // --- environment ---
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] with formatted context.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    /// Shorthand for a [`Error::TransportError`] with formatted context.
    pub fn transport(reason: impl Into<String>) -> Self {
        Error::TransportError {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::InvalidArgument`] with formatted context.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// True for integrity-class errors, which are never recovered locally.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::HashMismatch { .. }
                | Error::MerkleMismatch { .. }
                | Error::SignatureInvalid { .. }
                | Error::AuditCorrupt { .. }
                | Error::DecryptionFailed
                | Error::PackCorrupt { .. }
                | Error::ObjectCorrupt { .. }
        )
    }
}
