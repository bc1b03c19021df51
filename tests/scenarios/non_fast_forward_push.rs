//! Push is fast-forward only; a diverged push leaves the remote untouched

use crate::common::{TestRepo, cancel, commit_file, repo};
use agmem::Error;
use agmem::Repository;
use agmem::artifacts::remote::sync::PushOutcome;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn diverged_push_is_rejected_and_remote_unchanged(repo: TestRepo) {
    // R: the remote repository with one commit
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "base");
    let remote_root = repo.dir.path().join("repo");

    // R': a clone
    let clone_root = repo.dir.path().join("clone");
    let clone = Repository::clone_from(&remote_root, &clone_root, "main", &cancel()).unwrap();
    assert_eq!(
        clone.resolve("main").unwrap(),
        repo.repo.resolve("main").unwrap()
    );

    // both sides commit independently
    commit_file(&clone, "semantic/pref.md", "dark mode\nc1\n", "clone change");
    let remote_tip = commit_file(&repo.repo, "semantic/pref.md", "dark mode\nc2\n", "remote change");

    // push from the clone must fail without touching the remote
    let result = clone.push(&remote_root, "main", &cancel());
    assert!(matches!(result, Err(Error::NonFastForward { .. })));
    assert_eq!(repo.repo.resolve("main").unwrap(), remote_tip);
}

#[rstest]
fn fast_forward_push_advances_the_remote(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "base");
    let remote_root = repo.dir.path().join("repo");

    let clone_root = repo.dir.path().join("clone");
    let clone = Repository::clone_from(&remote_root, &clone_root, "main", &cancel()).unwrap();

    let new_tip = commit_file(&clone, "semantic/pref.md", "dark mode\npython\n", "advance");
    let outcome = clone.push(&remote_root, "main", &cancel()).unwrap();
    assert!(matches!(outcome, PushOutcome::Advanced { .. }));

    assert_eq!(repo.repo.resolve("main").unwrap(), new_tip);
    // the remote can materialize the pushed tree
    let commit = repo.repo.database().require_commit(&new_tip).unwrap();
    let flat = repo.repo.database().flatten_tree(commit.tree_oid()).unwrap();
    assert!(flat.contains_key("semantic/pref.md"));
}

#[rstest]
fn pushing_an_unchanged_branch_is_up_to_date(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "base");
    let remote_root = repo.dir.path().join("repo");

    let clone_root = repo.dir.path().join("clone");
    let clone = Repository::clone_from(&remote_root, &clone_root, "main", &cancel()).unwrap();

    let outcome = clone.push(&remote_root, "main", &cancel()).unwrap();
    assert_eq!(outcome, PushOutcome::UpToDate);
}
