//! Merkle tree over commit blobs
//!
//! Leaves are the sorted `(path, blob_hash)` pairs of a commit's full tree.
//! Each leaf hashes `path \0 blob_hash`; internal nodes hash the
//! concatenation of their two children's raw digests. A level with an odd
//! node count duplicates its last node. The root is stored in
//! `commit.metadata.merkle_root`.
//!
//! A proof for a single `(path, blob_hash)` is the list of sibling hashes
//! from leaf to root plus a left/right bit per level; the verifier rebuilds
//! the root and compares.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifacts::objects::object_id::ObjectId;

type Digest32 = [u8; 32];

/// Which side a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// One proof level: the sibling digest and its side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub side: Side,
}

/// Membership proof for one `(path, blob_hash)` leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub path: String,
    pub blob_hash: String,
    pub steps: Vec<ProofStep>,
}

fn digest(bytes: &[u8]) -> Digest32 {
    Sha256::digest(bytes).into()
}

fn leaf_digest(path: &str, blob_hash: &ObjectId) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update([0u8]);
    hasher.update(blob_hash.as_ref().as_bytes());
    hasher.finalize().into()
}

fn parent_digest(left: &Digest32, right: &Digest32) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn hex(digest: &Digest32) -> String {
    ObjectId::from_raw(digest).as_ref().to_string()
}

/// Compute the Merkle root for a commit's leaves.
///
/// # Arguments
///
/// * `leaves` - `(path, blob_hash)` pairs; sorted internally by path
///
/// # Returns
///
/// Hex-encoded root. An empty leaf set has a fixed sentinel root.
pub fn merkle_root(leaves: &[(String, ObjectId)]) -> String {
    let mut sorted: Vec<&(String, ObjectId)> = leaves.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    if sorted.is_empty() {
        return hex(&digest(b"empty"));
    }

    let mut layer: Vec<Digest32> = sorted
        .iter()
        .map(|(path, blob_hash)| leaf_digest(path, blob_hash))
        .collect();

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left); // odd: duplicate last
            next.push(parent_digest(left, right));
        }
        layer = next;
    }

    hex(&layer[0])
}

/// Build a membership proof for one leaf.
///
/// # Returns
///
/// `None` if the `(path, blob_hash)` pair is not among the leaves.
pub fn merkle_proof(
    leaves: &[(String, ObjectId)],
    path: &str,
    blob_hash: &ObjectId,
) -> Option<MerkleProof> {
    let mut sorted: Vec<&(String, ObjectId)> = leaves.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut position = sorted
        .iter()
        .position(|(leaf_path, leaf_hash)| leaf_path == path && leaf_hash == blob_hash)?;

    let mut layer: Vec<Digest32> = sorted
        .iter()
        .map(|(leaf_path, leaf_hash)| leaf_digest(leaf_path, leaf_hash))
        .collect();

    let mut steps = Vec::new();
    while layer.len() > 1 {
        let sibling_index = position ^ 1;
        let sibling = layer.get(sibling_index).unwrap_or(&layer[position]);
        steps.push(ProofStep {
            sibling: hex(sibling),
            side: if sibling_index > position {
                Side::Right
            } else {
                Side::Left
            },
        });

        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(parent_digest(left, right));
        }
        layer = next;
        position /= 2;
    }

    Some(MerkleProof {
        path: path.to_string(),
        blob_hash: blob_hash.as_ref().to_string(),
        steps,
    })
}

/// Verify a membership proof against a root.
pub fn verify_proof(proof: &MerkleProof, root: &str) -> bool {
    let Ok(blob_hash) = ObjectId::try_parse(proof.blob_hash.clone()) else {
        return false;
    };

    let mut current = leaf_digest(&proof.path, &blob_hash);
    for step in &proof.steps {
        let Ok(sibling) = ObjectId::try_parse(step.sibling.clone()) else {
            return false;
        };
        let sibling = sibling.to_raw();
        current = match step.side {
            Side::Right => parent_digest(&current, &sibling),
            Side::Left => parent_digest(&sibling, &current),
        };
    }

    hex(&current) == root
}
