//! Pack writer
//!
//! Encodes a set of objects into a pack file plus its side index. Delta
//! suggestions come from the similarity matcher; the writer enforces the
//! size gate (delta < 0.8 × target), chain depth (≤ max), cycle rejection,
//! and that every chain terminates at a FULL object inside the same pack.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::{FLAG_DELTA, IDX_MAGIC, PACK_MAGIC, PACK_VERSION, delta};
use crate::errors::{Error, Result};

/// One object to be packed.
#[derive(Debug, Clone)]
pub struct PackInput {
    pub oid: ObjectId,
    pub kind: ObjectType,
    pub payload: Bytes,
}

/// Result of writing a pack: its id and on-disk paths.
#[derive(Debug, Clone)]
pub struct WrittenPack {
    pub id: String,
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub delta_count: usize,
}

/// Pack writer with delta-chain bookkeeping.
#[derive(Debug)]
pub struct PackWriter {
    max_chain: u32,
    delta_enabled: bool,
}

impl PackWriter {
    pub fn new(delta_enabled: bool, max_chain: u32) -> Self {
        PackWriter {
            delta_enabled,
            max_chain,
        }
    }

    /// Write `objects` into `<pack_dir>/<packid>.pack` + `.idx`.
    ///
    /// # Arguments
    ///
    /// * `pack_dir` - destination directory (created if missing)
    /// * `objects` - payloads to pack, deduplicated by the caller
    /// * `delta_bases` - target oid → suggested base oid (single hop)
    ///
    /// # Returns
    ///
    /// The written pack's id and paths.
    pub fn write(
        &self,
        pack_dir: &Path,
        objects: &[PackInput],
        delta_bases: &HashMap<ObjectId, ObjectId>,
    ) -> Result<WrittenPack> {
        if objects.is_empty() {
            return Err(Error::invalid_argument("cannot write an empty pack"));
        }

        let by_oid: HashMap<&ObjectId, &PackInput> =
            objects.iter().map(|obj| (&obj.oid, obj)).collect();
        let plan = self.plan_deltas(objects, delta_bases, &by_oid);

        let mut body = Vec::new();
        body.extend_from_slice(PACK_MAGIC);
        body.write_u32::<BigEndian>(PACK_VERSION)?;
        body.write_u32::<BigEndian>(objects.len() as u32)?;

        let mut offsets: Vec<(ObjectId, u64)> = Vec::with_capacity(objects.len());
        let mut delta_count = 0usize;

        for object in objects {
            offsets.push((object.oid.clone(), body.len() as u64));

            let base = plan.get(&object.oid).and_then(|base_oid| {
                by_oid.get(base_oid).map(|input| (base_oid.clone(), *input))
            });

            match base {
                Some((base_oid, base_input)) => {
                    let patch = delta::compute_delta(&base_input.payload, &object.payload);
                    if delta::worth_storing(&patch, &object.payload) {
                        body.push(object.kind.as_u8());
                        body.push(FLAG_DELTA);
                        base_oid.write_raw_to(&mut body)?;
                        body.write_u32::<BigEndian>(patch.len() as u32)?;
                        body.extend_from_slice(&patch);
                        delta_count += 1;
                        continue;
                    }
                    // gate failed, fall through to FULL
                    Self::write_full(&mut body, object)?;
                }
                None => Self::write_full(&mut body, object)?,
            }
        }

        let trailer: [u8; 32] = Sha256::digest(&body).into();
        body.extend_from_slice(&trailer);

        let pack_id = ObjectId::from_raw(&trailer).as_ref().to_string();
        std::fs::create_dir_all(pack_dir)?;

        let pack_path = pack_dir.join(format!("{pack_id}.pack"));
        let index_path = pack_dir.join(format!("{pack_id}.idx"));
        Self::write_atomic(&pack_path, &body)?;
        Self::write_atomic(&index_path, &Self::encode_index(&mut offsets)?)?;

        debug!(
            pack = %pack_id,
            objects = objects.len(),
            deltas = delta_count,
            "wrote pack"
        );

        Ok(WrittenPack {
            id: pack_id,
            pack_path,
            index_path,
            delta_count,
        })
    }

    fn write_full(body: &mut Vec<u8>, object: &PackInput) -> Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&object.payload)?;
        let compressed = encoder.finish()?;

        body.push(object.kind.as_u8());
        body.push(0);
        body.write_u32::<BigEndian>(compressed.len() as u32)?;
        body.extend_from_slice(&compressed);
        Ok(())
    }

    /// Validate delta suggestions: base present in pack, no cycles, chain
    /// depth within bounds. Invalid suggestions demote to FULL.
    fn plan_deltas(
        &self,
        objects: &[PackInput],
        suggestions: &HashMap<ObjectId, ObjectId>,
        by_oid: &HashMap<&ObjectId, &PackInput>,
    ) -> HashMap<ObjectId, ObjectId> {
        if !self.delta_enabled {
            return HashMap::new();
        }

        let mut plan: HashMap<ObjectId, ObjectId> = HashMap::new();

        for object in objects {
            let Some(base) = suggestions.get(&object.oid) else {
                continue;
            };
            if base == &object.oid || !by_oid.contains_key(base) {
                continue;
            }

            // walk the prospective chain through already accepted hops
            let mut depth = 1u32;
            let mut cursor = base.clone();
            let mut valid = true;
            while let Some(next) = suggestions.get(&cursor) {
                if next == &object.oid || depth >= self.max_chain {
                    valid = false; // cycle or over-deep chain
                    break;
                }
                if !by_oid.contains_key(next) {
                    break; // chain ends at a FULL object
                }
                cursor = next.clone();
                depth += 1;
            }

            if valid {
                plan.insert(object.oid.clone(), base.clone());
            }
        }

        plan
    }

    fn encode_index(offsets: &mut Vec<(ObjectId, u64)>) -> Result<Vec<u8>> {
        offsets.sort_by(|a, b| a.0.cmp(&b.0));

        let mut index = Vec::new();
        index.extend_from_slice(IDX_MAGIC);
        index.write_u32::<BigEndian>(PACK_VERSION)?;
        index.write_u32::<BigEndian>(offsets.len() as u32)?;
        for (oid, offset) in offsets.iter() {
            oid.write_raw_to(&mut index)?;
            index.write_u64::<BigEndian>(*offset)?;
        }

        let trailer: [u8; 32] = Sha256::digest(&index).into();
        index.extend_from_slice(&trailer);
        Ok(index)
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let temp = path.with_extension(format!("tmp-{}", rand::random::<u32>()));
        std::fs::write(&temp, bytes)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }
}
