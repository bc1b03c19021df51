//! Multi-tier similarity matcher
//!
//! Selects delta-base candidates for repacking without the O(n²) cost of
//! comparing every pair with Levenshtein distance. Three tiers, applied in
//! order to each candidate pair:
//!
//! 1. **Length ratio** (O(1)): skip if `|len(a) − len(b)| / max(len) > τ₁`
//! 2. **SimHash** (O(n)): skip if the Hamming distance between 64-bit
//!    fingerprints exceeds τ₂. Fingerprints are computed from token
//!    shingles, so near-duplicate content lands close in Hamming space.
//! 3. **Edit similarity** (O(n·m)): keep if the normalized similarity
//!    `1 − lev(a,b)/max(len)` is at least τ₃.
//!
//! Tier 3 fans out across worker threads with a join barrier inside the
//! call. Group construction picks, for each object, the smallest accepted
//! match as its delta base; ties break toward the smaller hash. Only one
//! delta hop is formed per pair.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::artifacts::config::SimilarityConfig;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};

/// Objects smaller than this are never worth delta-encoding.
const MIN_DELTA_SIZE: usize = 64;

/// Shingle width in bytes for SimHash tokenization.
const SHINGLE_LEN: usize = 8;

/// A pair of objects that passed all three tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarPair {
    pub left: ObjectId,
    pub right: ObjectId,
    pub similarity: f64,
}

/// 64-bit SimHash fingerprint over byte shingles.
pub fn simhash(content: &[u8]) -> u64 {
    if content.is_empty() {
        return 0;
    }

    let mut weights = [0i32; 64];

    let windows: Box<dyn Iterator<Item = &[u8]>> = if content.len() < SHINGLE_LEN {
        Box::new(std::iter::once(content))
    } else {
        Box::new(content.windows(SHINGLE_LEN).step_by(SHINGLE_LEN / 2))
    };

    for shingle in windows {
        let digest = Sha256::digest(shingle);
        let mut token = [0u8; 8];
        token.copy_from_slice(&digest[..8]);
        let token = u64::from_be_bytes(token);

        for (bit, weight) in weights.iter_mut().enumerate() {
            if (token >> bit) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    let mut fingerprint = 0u64;
    for (bit, weight) in weights.iter().enumerate() {
        if *weight > 0 {
            fingerprint |= 1 << bit;
        }
    }
    fingerprint
}

/// Hamming distance between two fingerprints.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Levenshtein distance with a two-row table.
pub fn levenshtein(a: &[u8], b: &[u8]) -> usize {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0usize; short.len() + 1];

    for (row, &long_byte) in long.iter().enumerate() {
        curr[0] = row + 1;
        for (col, &short_byte) in short.iter().enumerate() {
            let substitution = prev[col] + usize::from(long_byte != short_byte);
            curr[col + 1] = substitution
                .min(prev[col + 1] + 1)
                .min(curr[col] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// Normalized edit similarity in `[0, 1]`.
pub fn edit_similarity(a: &[u8], b: &[u8]) -> f64 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Tiered similarity matcher.
#[derive(Debug, Clone)]
pub struct SimilarityMatcher {
    config: SimilarityConfig,
    workers: usize,
}

impl SimilarityMatcher {
    pub fn new(config: SimilarityConfig) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        SimilarityMatcher { config, workers }
    }

    /// Find all pairs that survive the three tiers.
    ///
    /// # Arguments
    ///
    /// * `objects` - candidate payloads keyed by object id
    /// * `cancel` - checked between pairs; aborts with `Cancelled`
    pub fn find_similar_pairs(
        &self,
        objects: &HashMap<ObjectId, bytes::Bytes>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<SimilarPair>> {
        let mut candidates: Vec<(&ObjectId, &bytes::Bytes)> = objects
            .iter()
            .filter(|(_, content)| content.len() >= MIN_DELTA_SIZE)
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(b.0));

        if candidates.len() < 2 {
            return Ok(Vec::new());
        }

        // tier 2 fingerprints, one pass
        let fingerprints: Vec<u64> = candidates
            .iter()
            .map(|(_, content)| simhash(content))
            .collect();

        // tiers 1 + 2 prune the pair list cheaply
        let mut survivors = Vec::new();
        for i in 0..candidates.len() {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            for j in (i + 1)..candidates.len() {
                let len_a = candidates[i].1.len();
                let len_b = candidates[j].1.len();
                let max_len = len_a.max(len_b) as f64;
                if (len_a.abs_diff(len_b) as f64) / max_len > self.config.tau1 {
                    continue;
                }
                if hamming_distance(fingerprints[i], fingerprints[j]) > self.config.tau2 {
                    continue;
                }
                survivors.push((i, j));
            }
        }

        debug!(
            candidates = candidates.len(),
            surviving_pairs = survivors.len(),
            "similarity tiers 1-2 complete"
        );

        // tier 3 is the expensive one; fan out across worker threads
        let tau3 = self.config.tau3;
        let chunk_size = survivors.len().div_ceil(self.workers).max(1);
        let mut pairs = Vec::new();

        std::thread::scope(|scope| {
            let handles: Vec<_> = survivors
                .chunks(chunk_size)
                .map(|chunk| {
                    let candidates = &candidates;
                    let cancel = Arc::clone(cancel);
                    scope.spawn(move || {
                        let mut kept = Vec::new();
                        for &(i, j) in chunk {
                            if cancel.load(Ordering::Relaxed) {
                                return Err(Error::Cancelled);
                            }
                            let similarity =
                                edit_similarity(candidates[i].1, candidates[j].1);
                            if similarity >= tau3 {
                                kept.push(SimilarPair {
                                    left: candidates[i].0.clone(),
                                    right: candidates[j].0.clone(),
                                    similarity,
                                });
                            }
                        }
                        Ok(kept)
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(Ok(kept)) => pairs.extend(kept),
                    Ok(Err(err)) => return Err(err),
                    Err(_) => {
                        return Err(Error::invalid_argument(
                            "similarity worker thread panicked",
                        ));
                    }
                }
            }
            Ok(())
        })?;

        Ok(pairs)
    }

    /// Choose one delta base per object from the accepted pairs.
    ///
    /// For each object the smallest accepted match becomes the base; ties
    /// break toward the smaller hash. Single hop only: a chosen base is
    /// never itself delta-encoded against the object that chose it.
    pub fn select_delta_bases(
        &self,
        objects: &HashMap<ObjectId, bytes::Bytes>,
        pairs: &[SimilarPair],
    ) -> HashMap<ObjectId, ObjectId> {
        let size_of = |oid: &ObjectId| objects.get(oid).map(|b| b.len()).unwrap_or(usize::MAX);

        let mut best: HashMap<ObjectId, ObjectId> = HashMap::new();
        for pair in pairs {
            for (target, other) in [
                (&pair.left, &pair.right),
                (&pair.right, &pair.left),
            ] {
                let candidate = other.clone();
                match best.get(target) {
                    None => {
                        best.insert(target.clone(), candidate);
                    }
                    Some(current) => {
                        let current_key = (size_of(current), current.clone());
                        let candidate_key = (size_of(&candidate), candidate.clone());
                        if candidate_key < current_key {
                            best.insert(target.clone(), candidate);
                        }
                    }
                }
            }
        }

        // one hop: a base may not itself be a delta target
        let bases: std::collections::HashSet<ObjectId> = best.values().cloned().collect();
        best.retain(|target, _| !bases.contains(target));
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn matcher() -> SimilarityMatcher {
        SimilarityMatcher::new(SimilarityConfig::default())
    }

    fn oid(fill: u8) -> ObjectId {
        ObjectId::from_raw(&[fill; 32])
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn test_simhash_stable_and_close_for_similar_content() {
        let a = b"the agent prefers dark mode and python for scripting tasks".repeat(4);
        let mut b = a.clone();
        b.extend_from_slice(b" plus one more preference");

        assert_eq!(simhash(&a), simhash(&a));
        assert!(hamming_distance(simhash(&a), simhash(&b)) <= 15);
    }

    #[test]
    fn test_simhash_far_for_unrelated_content() {
        let a: Vec<u8> = (0u32..400).flat_map(|n| n.to_be_bytes()).collect();
        let b: Vec<u8> = (10_000u32..10_400)
            .flat_map(|n| (n.wrapping_mul(2_654_435_761)).to_be_bytes())
            .collect();
        assert!(hamming_distance(simhash(&a), simhash(&b)) > 15);
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein(b"kitten", b"sitting"), 3);
        assert_eq!(levenshtein(b"", b"abc"), 3);
        assert_eq!(levenshtein(b"same", b"same"), 0);
    }

    #[test]
    fn test_finds_near_duplicates() {
        let base = b"2026-01-01T10:00:00Z session started with context loaded\n".repeat(4);
        let mut appended = base.clone();
        appended.extend_from_slice(b"2026-01-01T11:00:00Z session ended\n");

        let objects = HashMap::from([
            (oid(1), Bytes::from(base)),
            (oid(2), Bytes::from(appended)),
        ]);

        let pairs = matcher()
            .find_similar_pairs(&objects, &no_cancel())
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].similarity >= 0.7);
    }

    #[test]
    fn test_length_ratio_tier_prunes() {
        let objects = HashMap::from([
            (oid(1), Bytes::from(vec![b'a'; 100])),
            (oid(2), Bytes::from(vec![b'a'; 1000])),
        ]);

        let pairs = matcher()
            .find_similar_pairs(&objects, &no_cancel())
            .unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_cancellation_aborts() {
        let objects = HashMap::from([
            (oid(1), Bytes::from(vec![b'a'; 200])),
            (oid(2), Bytes::from(vec![b'a'; 210])),
        ]);
        let cancel = Arc::new(AtomicBool::new(true));

        assert!(matches!(
            matcher().find_similar_pairs(&objects, &cancel),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_base_selection_is_single_hop() {
        let small = Bytes::from(vec![b'x'; 100]);
        let medium = Bytes::from(vec![b'x'; 110]);
        let large = Bytes::from(vec![b'x'; 120]);
        let objects = HashMap::from([
            (oid(1), small),
            (oid(2), medium),
            (oid(3), large),
        ]);

        let pairs = vec![
            SimilarPair {
                left: oid(1),
                right: oid(2),
                similarity: 0.9,
            },
            SimilarPair {
                left: oid(2),
                right: oid(3),
                similarity: 0.9,
            },
        ];

        let bases = matcher().select_delta_bases(&objects, &pairs);

        // every chosen base must be stored FULL, so no base is also a target
        let base_set: std::collections::HashSet<_> = bases.values().collect();
        assert!(bases.keys().all(|target| !base_set.contains(target)));
    }
}
