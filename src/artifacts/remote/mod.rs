//! Remote synchronization
//!
//! The protocol is abstract over a [`transport::Transport`] offering four
//! operations: `list_refs`, `read_object`, `write_object`, and
//! `cas_update_ref`. The reference transport is the local filesystem; any
//! transport with the same atomicity (HTTP, object store) is acceptable.
//!
//! - **Fetch** streams missing objects into a quarantine directory,
//!   verifies them, applies the trust policy, then promotes them into the
//!   object store and updates `refs/remotes/<remote>/<branch>`.
//! - **Push** streams missing objects to the remote and advances the
//!   branch with a compare-and-set that only succeeds for fast-forwards.
//!   There is no force push.
//! - **Pull** is fetch followed by a merge, driven by the repository.

pub mod sync;
pub mod transport;

/// Default remote name.
pub const DEFAULT_REMOTE: &str = "origin";
