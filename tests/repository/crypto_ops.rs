//! Merkle proofs and encryption at rest through the repository API

use crate::common::{TestRepo, commit_file, repo};
use agmem::{Error, Repository};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn merkle_proof_round_trip_for_each_path(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "fact a\n", "a");
    commit_file(&repo.repo, "semantic/b.md", "fact b\n", "b");
    let tip = commit_file(&repo.repo, "episodic/log.md", "event\n", "c");

    for path in ["semantic/a.md", "semantic/b.md", "episodic/log.md"] {
        let proof = repo.repo.prove_path("HEAD", path).unwrap();
        assert!(repo.repo.verify_path_proof(tip.as_ref(), &proof).unwrap());
    }
}

#[rstest]
fn tampered_proof_fails_verification(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "fact a\n", "a");
    commit_file(&repo.repo, "semantic/b.md", "fact b\n", "b");

    let mut proof = repo.repo.prove_path("HEAD", "semantic/a.md").unwrap();
    proof.blob_hash = "0".repeat(64);
    assert!(!repo.repo.verify_path_proof("HEAD", &proof).unwrap());
}

#[rstest]
fn proof_for_an_absent_path_is_refused(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "fact a\n", "a");
    assert!(matches!(
        repo.repo.prove_path("HEAD", "semantic/missing.md"),
        Err(Error::NotFound { .. })
    ));
}

#[rstest]
fn encrypted_repository_round_trips_through_reopen(repo: TestRepo) {
    let root = repo.dir.path().join("repo");

    {
        let mut plain = Repository::open(&root).unwrap();
        plain.enable_encryption().unwrap();
    }

    // encrypted opens need the passphrase
    assert!(matches!(
        Repository::open(&root),
        Err(Error::InvalidConfig { .. })
    ));

    let encrypted = Repository::open_with_passphrase(&root, b"correct horse").unwrap();
    let tip = commit_file(&encrypted, "semantic/secret.md", "hidden fact\n", "secret");

    // content reads back through the encryptor
    let commit = encrypted.database().require_commit(&tip).unwrap();
    let flat = encrypted.database().flatten_tree(commit.tree_oid()).unwrap();
    let (blob_oid, _) = flat.get("semantic/secret.md").unwrap();
    let blob = encrypted
        .database()
        .parse_object_as_blob(blob_oid)
        .unwrap()
        .unwrap();
    assert_eq!(blob.content_utf8_lossy(), "hidden fact\n");

    // a wrong passphrase cannot read the stored blob
    drop(encrypted);
    let wrong = Repository::open_with_passphrase(&root, b"wrong passphrase").unwrap();
    assert!(matches!(
        wrong.database().get(blob_oid),
        Err(Error::DecryptionFailed)
    ));
}
