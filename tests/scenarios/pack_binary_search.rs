//! Pack index lookups stay within the binary-search comparison bound

use std::collections::HashMap;

use agmem::artifacts::objects::object::hash_payload;
use agmem::artifacts::objects::object_type::ObjectType;
use agmem::artifacts::pack::reader::PackReader;
use agmem::artifacts::pack::writer::{PackInput, PackWriter};
use bytes::Bytes;
use pretty_assertions::assert_eq;

const BLOB_COUNT: usize = 10_000;

fn build_pack(dir: &std::path::Path) -> (Vec<PackInput>, PackReader) {
    let objects: Vec<PackInput> = (0..BLOB_COUNT)
        .map(|n| {
            let payload = format!("episodic entry number {n}: routine heartbeat event\n");
            PackInput {
                oid: hash_payload(ObjectType::Blob, payload.as_bytes()),
                kind: ObjectType::Blob,
                payload: Bytes::from(payload),
            }
        })
        .collect();

    let writer = PackWriter::new(true, 16);
    let written = writer.write(dir, &objects, &HashMap::new()).unwrap();
    let reader = PackReader::open(&written.pack_path).unwrap();
    (objects, reader)
}

#[test]
fn every_object_is_found_within_the_comparison_bound() {
    let dir = assert_fs::TempDir::new().unwrap();
    let (objects, reader) = build_pack(dir.path());
    assert_eq!(reader.len(), BLOB_COUNT);

    // ceil(log2(10_000)) = 14
    let bound = (BLOB_COUNT as f64).log2().ceil() as u32;
    let mut worst = 0u32;

    for object in &objects {
        let (offset, comparisons) = reader.search(&object.oid);
        assert!(offset.is_some(), "object {} not found", object.oid);
        worst = worst.max(comparisons);
    }

    assert!(
        worst <= bound,
        "worst lookup took {worst} comparisons, bound is {bound}"
    );
}

#[test]
fn every_object_reads_back_bitwise_equal() {
    let dir = assert_fs::TempDir::new().unwrap();
    let (objects, reader) = build_pack(dir.path());

    for object in objects.iter().step_by(97) {
        let (kind, payload) = reader.get(&object.oid).unwrap().unwrap();
        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(payload, object.payload);
    }
}

#[test]
fn absent_lookups_also_respect_the_bound() {
    let dir = assert_fs::TempDir::new().unwrap();
    let (_, reader) = build_pack(dir.path());

    let bound = (BLOB_COUNT as f64).log2().ceil() as u32;
    for n in 0..100u32 {
        let absent = hash_payload(ObjectType::Blob, format!("missing {n}").as_bytes());
        let (offset, comparisons) = reader.search(&absent);
        assert!(offset.is_none());
        assert!(comparisons <= bound);
    }
}
