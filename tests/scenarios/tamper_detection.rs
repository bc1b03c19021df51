//! Tampering with a stored blob is caught by fsck and crypto verification

use crate::common::{TestRepo, cancel, commit_file, repo};
use agmem::Error;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn tampered_blob_is_reported_by_fsck_and_merkle_check(repo: TestRepo) {
    let mut repo = repo;
    repo.repo.generate_signing_key().unwrap();
    repo.repo.config_set("signing.enabled", "true").unwrap();

    let commit_oid = commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "signed");
    // a second blob supplies valid-but-wrong stored bytes
    let decoy_oid = repo
        .repo
        .database()
        .put(
            agmem::artifacts::objects::object_type::ObjectType::Blob,
            b"decoy content\n",
        )
        .unwrap();

    // the untampered repository verifies end to end
    repo.repo.verify_commit(commit_oid.as_ref()).unwrap();
    assert!(repo.repo.fsck(&cancel()).unwrap().is_clean());

    // overwrite the real blob's stored bytes with the decoy's
    let commit = repo.repo.database().require_commit(&commit_oid).unwrap();
    let flat = repo.repo.database().flatten_tree(commit.tree_oid()).unwrap();
    let (blob_oid, _) = flat.get("semantic/pref.md").unwrap();

    let objects_dir = repo.dir.path().join("repo").join(".mem").join("objects");
    let blob_path = objects_dir.join(blob_oid.to_path());
    let decoy_path = objects_dir.join(decoy_oid.to_path());
    std::fs::copy(&decoy_path, &blob_path).unwrap();

    // fsck flags exactly the tampered object with HashMismatch
    let report = repo.repo.fsck(&cancel()).unwrap();
    let hash_issues: Vec<_> = report
        .issues
        .iter()
        .filter(|issue| matches!(issue.error, Error::HashMismatch { .. }))
        .collect();
    assert_eq!(hash_issues.len(), 1);
    assert!(hash_issues[0].context.contains(blob_oid.as_ref()));

    // the audit chain is unaffected
    repo.repo.audit_verify().unwrap();

    // crypto verification of the containing commit reports MerkleMismatch
    assert!(matches!(
        repo.repo.verify_commit(commit_oid.as_ref()),
        Err(Error::MerkleMismatch { .. })
    ));
}

#[rstest]
fn clean_signed_repository_passes_all_checks(repo: TestRepo) {
    let mut repo = repo;
    repo.repo.generate_signing_key().unwrap();
    repo.repo.config_set("signing.enabled", "true").unwrap();

    let commit_oid = commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "signed");
    let commit = repo.repo.database().require_commit(&commit_oid).unwrap();
    assert!(commit.metadata().merkle_root.is_some());
    assert!(commit.metadata().signature.is_some());

    repo.repo.verify_commit("HEAD").unwrap();
    let report = repo.repo.fsck(&cancel()).unwrap();
    assert!(report.is_clean(), "unexpected issues: {:?}", report.issues);
}
