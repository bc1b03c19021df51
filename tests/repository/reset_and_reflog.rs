//! Reset, reflog records, and crash recovery at open

use crate::common::{TestRepo, commit_file, read_file, repo, write_file};
use agmem::areas::refs::ReflogOp;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn reset_moves_tip_and_working_tree(repo: TestRepo) {
    let c0 = commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    commit_file(&repo.repo, "semantic/a.md", "v1\n", "c1");

    // stale staged entry must not survive the reset
    write_file(&repo.repo, "semantic/a.md", "dirty\n");
    repo.repo.stage("semantic/a.md").unwrap();

    repo.repo.reset("HEAD~1").unwrap();

    assert_eq!(repo.repo.resolve("main").unwrap(), c0);
    assert_eq!(read_file(&repo.repo, "semantic/a.md"), "v0\n");
    assert!(repo.repo.status().unwrap().staged.is_empty());
}

#[rstest]
fn reflog_records_head_movements(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    commit_file(&repo.repo, "semantic/a.md", "v1\n", "c1");
    repo.repo.create_branch("exp").unwrap();
    repo.repo.checkout("exp").unwrap();
    repo.repo.reset("HEAD~1").unwrap();

    let ops: Vec<ReflogOp> = repo
        .repo
        .reflog()
        .unwrap()
        .into_iter()
        .map(|entry| entry.op)
        .collect();
    assert_eq!(
        ops,
        vec![
            ReflogOp::Commit,
            ReflogOp::Commit,
            ReflogOp::Branch,
            ReflogOp::Checkout,
            ReflogOp::Reset,
        ]
    );

    // each entry chains prev → new
    let entries = repo.repo.reflog().unwrap();
    assert_eq!(entries[0].prev, None);
    assert_eq!(entries[1].prev.as_deref(), Some(entries[0].new.as_str()));
}

#[rstest]
fn missing_reflog_tip_is_recovered_at_open(repo: TestRepo) {
    let tip = commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");

    // simulate a crash between ref update and reflog append
    let reflog_path = repo.dir.path().join("repo").join(".mem").join("reflog");
    std::fs::write(&reflog_path, "").unwrap();

    let repo = repo.reopen();
    let entries = repo.repo.reflog().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].new, tip.as_ref());
    assert_eq!(entries[0].message, "recovered at open");
}
