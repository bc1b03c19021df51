//! Linear history: one file, one commit, audit trail intact

use crate::common::{TestRepo, commit_file, repo};
use agmem::artifacts::audit::AuditOp;
use agmem::artifacts::branch::branch_name::RefName;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn single_commit_creates_linear_history(repo: TestRepo) {
    let commit_oid = commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "first");

    // one commit, no parents
    let log = repo.repo.log().unwrap();
    assert_eq!(log.len(), 1);
    let (oid, commit) = &log[0];
    assert_eq!(oid, &commit_oid);
    assert!(commit.parents().is_empty());
    assert_eq!(commit.message(), "first");

    // main points at the commit
    let main = RefName::try_parse("main").unwrap();
    assert_eq!(repo.repo.refs().read_branch(&main).unwrap(), Some(commit_oid.clone()));

    // the tree resolves back to the staged blob
    let flat = repo
        .repo
        .database()
        .flatten_tree(commit.tree_oid())
        .unwrap();
    assert_eq!(flat.len(), 1);
    let (blob_oid, _) = flat.get("semantic/pref.md").unwrap();
    let blob = repo
        .repo
        .database()
        .parse_object_as_blob(blob_oid)
        .unwrap()
        .unwrap();
    assert_eq!(blob.content_utf8_lossy(), "dark mode\n");

    // audit trail: init, stage, commit
    let ops: Vec<AuditOp> = repo
        .repo
        .audit_entries(10)
        .unwrap()
        .into_iter()
        .rev()
        .map(|entry| entry.payload.op)
        .collect();
    assert_eq!(ops, vec![AuditOp::Init, AuditOp::Stage, AuditOp::Commit]);
    assert_eq!(repo.repo.audit_verify().unwrap(), 3);
}

#[rstest]
fn staging_index_is_empty_after_commit(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "first");
    let status = repo.repo.status().unwrap();
    assert!(status.staged.is_empty());
    assert!(status.modified.is_empty());
}

#[rstest]
fn second_commit_links_to_first(repo: TestRepo) {
    let first = commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "first");
    let second = commit_file(&repo.repo, "semantic/pref.md", "dark mode\npython\n", "second");

    let commit = repo.repo.database().require_commit(&second).unwrap();
    assert_eq!(commit.parent(), Some(&first));

    // timestamps never decrease along the chain
    let first_commit = repo.repo.database().require_commit(&first).unwrap();
    assert!(commit.timestamp() >= first_commit.timestamp());
}
