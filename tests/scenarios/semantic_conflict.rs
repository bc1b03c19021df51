//! Overlapping semantic edits conflict and gate commits until resolved

use crate::common::{TestRepo, commit_file, read_file, repo, write_file};
use agmem::Error;
use agmem::areas::repository::MergeOutcome;
use agmem::artifacts::merge::state::Resolution;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn conflicted_repo(repo: &TestRepo) -> MergeOutcome {
    commit_file(&repo.repo, "semantic/fact.md", "X is unknown\n", "base");
    repo.repo.create_branch("a").unwrap();
    repo.repo.create_branch("b").unwrap();

    repo.repo.checkout("a").unwrap();
    commit_file(&repo.repo, "semantic/fact.md", "X is red\n", "red");

    repo.repo.checkout("b").unwrap();
    commit_file(&repo.repo, "semantic/fact.md", "X is blue\n", "blue");

    repo.repo.checkout("a").unwrap();
    repo.repo.merge("b").unwrap()
}

#[rstest]
fn overlapping_edits_conflict_with_markers(repo: TestRepo) {
    let outcome = conflicted_repo(&repo);
    assert_eq!(outcome, MergeOutcome::Conflicted { conflicts: 1 });

    // merge state is recorded
    assert!(repo.repo.is_merging());
    let state = repo.repo.merge_status().unwrap().unwrap();
    assert_eq!(state.conflicts.len(), 1);
    assert_eq!(state.conflicts[0].path, "semantic/fact.md");
    assert_eq!(state.conflicts[0].strategy, "semantic");

    // the working file carries the literal markers
    assert_eq!(
        read_file(&repo.repo, "semantic/fact.md"),
        "<<<<<<< ours\nX is red\n=======\nX is blue\n>>>>>>> theirs\n"
    );

    // commits are refused while MERGING
    write_file(&repo.repo, "semantic/fact.md", "X is purple\n");
    repo.repo.stage("semantic/fact.md").unwrap();
    assert!(matches!(
        repo.repo.commit("try anyway"),
        Err(Error::MergingState)
    ));
}

#[rstest]
fn resolving_ours_completes_the_merge(repo: TestRepo) {
    conflicted_repo(&repo);

    let completed = repo
        .repo
        .resolve_conflict("semantic/fact.md", Resolution::Ours)
        .unwrap();
    let merge_commit = completed.expect("last resolution completes the merge");

    assert!(!repo.repo.is_merging());
    assert_eq!(read_file(&repo.repo, "semantic/fact.md"), "X is red\n");

    let commit = repo.repo.database().require_commit(&merge_commit).unwrap();
    assert_eq!(commit.parents().len(), 2);
}

#[rstest]
fn resolving_both_keeps_both_sides(repo: TestRepo) {
    conflicted_repo(&repo);

    repo.repo
        .resolve_conflict("semantic/fact.md", Resolution::Both)
        .unwrap();

    assert_eq!(
        read_file(&repo.repo, "semantic/fact.md"),
        "X is red\nX is blue\n"
    );
    assert!(!repo.repo.is_merging());
}

#[rstest]
fn non_overlapping_semantic_edits_merge_cleanly(repo: TestRepo) {
    commit_file(
        &repo.repo,
        "semantic/fact.md",
        "color: unknown\nsize: unknown\nshape: unknown\n",
        "base",
    );
    repo.repo.create_branch("a").unwrap();
    repo.repo.create_branch("b").unwrap();

    repo.repo.checkout("a").unwrap();
    commit_file(
        &repo.repo,
        "semantic/fact.md",
        "color: red\nsize: unknown\nshape: unknown\n",
        "color",
    );

    repo.repo.checkout("b").unwrap();
    commit_file(
        &repo.repo,
        "semantic/fact.md",
        "color: unknown\nsize: unknown\nshape: round\n",
        "shape",
    );

    repo.repo.checkout("a").unwrap();
    let outcome = repo.repo.merge("b").unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));
    assert_eq!(
        read_file(&repo.repo, "semantic/fact.md"),
        "color: red\nsize: unknown\nshape: round\n"
    );
}
