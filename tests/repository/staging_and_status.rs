//! Staging, unstaging, deletions, and status classification

use crate::common::{TestRepo, commit_file, repo, write_file};
use fake::Fake;
use fake::faker::lorem::en::Words;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn status_classifies_staged_modified_deleted_untracked(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/tracked.md", "original\n", "base");

    // modified: tracked file changed on disk, not staged
    write_file(&repo.repo, "semantic/tracked.md", "changed\n");
    // untracked: new file, never staged
    write_file(&repo.repo, "semantic/new.md", "new\n");
    // staged: another new file, staged
    write_file(&repo.repo, "episodic/staged.md", "event\n");
    repo.repo.stage("episodic/staged.md").unwrap();

    let status = repo.repo.status().unwrap();
    assert_eq!(status.staged, vec!["episodic/staged.md"]);
    assert_eq!(status.modified, vec!["semantic/tracked.md"]);
    assert_eq!(status.untracked, vec!["semantic/new.md"]);
    assert!(status.deleted.is_empty());
}

#[rstest]
fn deleted_tracked_file_shows_and_commits_as_deletion(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "a\n", "base a");
    commit_file(&repo.repo, "semantic/b.md", "b\n", "base b");

    repo.repo.workspace().remove_file("semantic/a.md").unwrap();
    assert_eq!(repo.repo.status().unwrap().deleted, vec!["semantic/a.md"]);

    // staging the missing tracked path records a deletion
    repo.repo.stage("semantic/a.md").unwrap();
    let commit_oid = repo.repo.commit("drop a").unwrap();

    let commit = repo.repo.database().require_commit(&commit_oid).unwrap();
    let flat = repo.repo.database().flatten_tree(commit.tree_oid()).unwrap();
    assert!(!flat.contains_key("semantic/a.md"));
    assert!(flat.contains_key("semantic/b.md"));
}

#[rstest]
fn staging_an_unknown_missing_path_is_ignored(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "a\n", "base");
    repo.repo.stage("semantic/never-existed.md").unwrap();
    assert!(repo.repo.status().unwrap().staged.is_empty());
}

#[rstest]
fn unstage_removes_the_entry(repo: TestRepo) {
    write_file(&repo.repo, "semantic/a.md", "a\n");
    repo.repo.stage("semantic/a.md").unwrap();
    assert!(repo.repo.unstage("semantic/a.md").unwrap());
    assert!(!repo.repo.unstage("semantic/a.md").unwrap());

    assert!(matches!(
        repo.repo.commit("nothing left"),
        Err(agmem::Error::InvalidArgument { .. })
    ));
}

#[rstest]
fn stage_all_covers_nested_directories(repo: TestRepo) {
    for n in 0..5 {
        let words: Vec<String> = Words(3..6).fake();
        write_file(
            &repo.repo,
            &format!("episodic/2026/{n:02}/entry.md"),
            &format!("{}\n", words.join(" ")),
        );
    }

    let staged = repo.repo.stage_all().unwrap();
    assert_eq!(staged, 5);

    let commit_oid = repo.repo.commit("bulk import").unwrap();
    let commit = repo.repo.database().require_commit(&commit_oid).unwrap();
    let flat = repo.repo.database().flatten_tree(commit.tree_oid()).unwrap();
    assert_eq!(flat.len(), 5);
}

#[rstest]
fn partial_staging_keeps_unstaged_tracked_files(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/keep.md", "keep\n", "base");

    write_file(&repo.repo, "semantic/only-this.md", "staged\n");
    repo.repo.stage("semantic/only-this.md").unwrap();
    let commit_oid = repo.repo.commit("partial").unwrap();

    // the untouched tracked file is still in the new tree
    let commit = repo.repo.database().require_commit(&commit_oid).unwrap();
    let flat = repo.repo.database().flatten_tree(commit.tree_oid()).unwrap();
    assert!(flat.contains_key("semantic/keep.md"));
    assert!(flat.contains_key("semantic/only-this.md"));
}

#[rstest]
fn paths_escaping_the_working_root_are_rejected(repo: TestRepo) {
    assert!(matches!(
        repo.repo.stage("../outside.md"),
        Err(agmem::Error::PathOutsideRoot { .. })
    ));
}
