//! Copy/insert delta codec
//!
//! A delta transforms a base payload into a target payload through three
//! opcodes:
//!
//! ```text
//! 0x00 off u32 len u32   copy `len` bytes from base at `off`
//! 0x01 len u32 bytes...  insert `len` literal bytes
//! 0x02                   end of delta
//! ```
//!
//! `apply(base, compute_delta(base, target)) == target` holds for any pair
//! of payloads. Matching is anchor-based: 16-byte windows of the base are
//! indexed, target bytes are matched greedily and extended as far as they
//! run, everything in between becomes literal inserts.

use std::collections::HashMap;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::errors::{Error, Result};

const OP_COPY: u8 = 0x00;
const OP_INSERT: u8 = 0x01;
const OP_END: u8 = 0x02;

/// Anchor width for base indexing.
const ANCHOR_LEN: usize = 16;

/// Cap on candidate positions per anchor, keeps pathological inputs linear.
const MAX_CANDIDATES: usize = 8;

/// Compute a delta that rebuilds `target` from `base`.
pub fn compute_delta(base: &[u8], target: &[u8]) -> Bytes {
    let mut out = Vec::new();

    if base.len() >= ANCHOR_LEN && target.len() >= ANCHOR_LEN {
        encode_with_anchors(base, target, &mut out);
    } else if !target.is_empty() {
        write_insert(&mut out, target);
    }

    out.push(OP_END);
    Bytes::from(out)
}

fn encode_with_anchors(base: &[u8], target: &[u8], out: &mut Vec<u8>) {
    // index every anchor-sized window of the base
    let mut anchors: HashMap<&[u8], Vec<u32>> = HashMap::new();
    for offset in 0..=base.len() - ANCHOR_LEN {
        let window = &base[offset..offset + ANCHOR_LEN];
        let positions = anchors.entry(window).or_default();
        if positions.len() < MAX_CANDIDATES {
            positions.push(offset as u32);
        }
    }

    let mut literal_start = 0usize;
    let mut cursor = 0usize;

    while cursor + ANCHOR_LEN <= target.len() {
        let window = &target[cursor..cursor + ANCHOR_LEN];
        let best = anchors.get(window).map(|positions| {
            // extend each candidate and keep the longest run
            positions
                .iter()
                .map(|&start| {
                    let start = start as usize;
                    let mut len = ANCHOR_LEN;
                    while start + len < base.len()
                        && cursor + len < target.len()
                        && base[start + len] == target[cursor + len]
                    {
                        len += 1;
                    }
                    (start, len)
                })
                .max_by_key(|&(_, len)| len)
        });

        match best.flatten() {
            Some((start, len)) => {
                if literal_start < cursor {
                    write_insert(out, &target[literal_start..cursor]);
                }
                write_copy(out, start as u32, len as u32);
                cursor += len;
                literal_start = cursor;
            }
            None => cursor += 1,
        }
    }

    if literal_start < target.len() {
        write_insert(out, &target[literal_start..]);
    }
}

fn write_copy(out: &mut Vec<u8>, off: u32, len: u32) {
    out.push(OP_COPY);
    let _ = out.write_u32::<BigEndian>(off);
    let _ = out.write_u32::<BigEndian>(len);
}

fn write_insert(out: &mut Vec<u8>, bytes: &[u8]) {
    // u32 length limit; split oversized literals
    for chunk in bytes.chunks(u32::MAX as usize) {
        out.push(OP_INSERT);
        let _ = out.write_u32::<BigEndian>(chunk.len() as u32);
        out.extend_from_slice(chunk);
    }
}

/// Rebuild the target payload from a base and a delta.
///
/// # Arguments
///
/// * `base` - the payload the delta was computed against
/// * `delta` - opcode stream produced by [`compute_delta`]
///
/// # Returns
///
/// The reconstructed target, or `PackCorrupt` if the stream is malformed
/// or references bytes outside the base.
pub fn apply(base: &[u8], delta: &[u8]) -> Result<Bytes> {
    let corrupt = |reason: &str| Error::PackCorrupt {
        reason: reason.to_string(),
    };

    let mut reader = Cursor::new(delta);
    let mut out = Vec::new();

    loop {
        let opcode = reader
            .read_u8()
            .map_err(|_| corrupt("delta ended without end opcode"))?;

        match opcode {
            OP_COPY => {
                let off = reader
                    .read_u32::<BigEndian>()
                    .map_err(|_| corrupt("truncated copy opcode"))? as usize;
                let len = reader
                    .read_u32::<BigEndian>()
                    .map_err(|_| corrupt("truncated copy opcode"))? as usize;
                let end = off
                    .checked_add(len)
                    .ok_or_else(|| corrupt("copy range overflow"))?;
                if end > base.len() {
                    return Err(corrupt("copy range outside base"));
                }
                out.extend_from_slice(&base[off..end]);
            }
            OP_INSERT => {
                let len = reader
                    .read_u32::<BigEndian>()
                    .map_err(|_| corrupt("truncated insert opcode"))? as usize;
                let start = reader.position() as usize;
                let end = start
                    .checked_add(len)
                    .ok_or_else(|| corrupt("insert length overflow"))?;
                if end > delta.len() {
                    return Err(corrupt("insert runs past delta end"));
                }
                out.extend_from_slice(&delta[start..end]);
                reader.set_position(end as u64);
            }
            OP_END => {
                if (reader.position() as usize) != delta.len() {
                    return Err(corrupt("trailing bytes after end opcode"));
                }
                return Ok(Bytes::from(out));
            }
            other => return Err(corrupt(&format!("unknown delta opcode {other:#04x}"))),
        }
    }
}

/// True when the delta is worth storing over a FULL record.
pub fn worth_storing(delta: &[u8], target: &[u8]) -> bool {
    (delta.len() as f64) < super::DELTA_SIZE_RATIO * (target.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn round_trip(base: &[u8], target: &[u8]) {
        let delta = compute_delta(base, target);
        let rebuilt = apply(base, &delta).unwrap();
        assert_eq!(&rebuilt[..], target);
    }

    #[test]
    fn test_round_trip_append_only() {
        let base = b"2026-01-01T10:00:00Z started session\n";
        let target = b"2026-01-01T10:00:00Z started session\n2026-01-01T11:00:00Z finished\n";
        round_trip(base, target);
    }

    #[test]
    fn test_round_trip_disjoint_content() {
        round_trip(b"completely different", b"nothing shared at all here");
    }

    #[test]
    fn test_round_trip_empty_target() {
        round_trip(b"some base", b"");
    }

    #[test]
    fn test_round_trip_empty_base() {
        round_trip(b"", b"fresh content with no base");
    }

    #[test]
    fn test_append_produces_small_delta() {
        let base: Vec<u8> = (0..2000u32).flat_map(|n| n.to_be_bytes()).collect();
        let mut target = base.clone();
        target.extend_from_slice(b"tail");

        let delta = compute_delta(&base, &target);
        assert!(delta.len() < target.len() / 10);
        assert!(worth_storing(&delta, &target));
    }

    #[test]
    fn test_apply_rejects_copy_outside_base() {
        let mut delta = Vec::new();
        write_copy(&mut delta, 0, 100);
        delta.push(OP_END);
        assert!(apply(b"short", &delta).is_err());
    }

    #[test]
    fn test_apply_rejects_missing_end() {
        let mut delta = Vec::new();
        write_insert(&mut delta, b"abc");
        assert!(apply(b"", &delta).is_err());
    }

    proptest! {
        #[test]
        fn test_round_trip_property(
            base in proptest::collection::vec(any::<u8>(), 0..512),
            target in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let delta = compute_delta(&base, &target);
            let rebuilt = apply(&base, &delta).unwrap();
            prop_assert_eq!(&rebuilt[..], &target[..]);
        }

        #[test]
        fn test_round_trip_related_property(
            prefix in proptest::collection::vec(any::<u8>(), 64..256),
            middle in proptest::collection::vec(any::<u8>(), 0..64),
            suffix in proptest::collection::vec(any::<u8>(), 64..256),
        ) {
            let base: Vec<u8> = prefix.iter().chain(suffix.iter()).copied().collect();
            let target: Vec<u8> = prefix
                .iter()
                .chain(middle.iter())
                .chain(suffix.iter())
                .copied()
                .collect();
            let delta = compute_delta(&base, &target);
            let rebuilt = apply(&base, &delta).unwrap();
            prop_assert_eq!(&rebuilt[..], &target[..]);
        }
    }
}
