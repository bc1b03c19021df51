//! Fast-forward merge advances the pointer without a merge commit

use crate::common::{TestRepo, commit_file, read_file, repo};
use agmem::areas::repository::MergeOutcome;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn merging_a_descendant_fast_forwards(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "first");

    repo.repo.create_branch("exp").unwrap();
    repo.repo.checkout("exp").unwrap();
    let exp_tip = commit_file(
        &repo.repo,
        "semantic/pref.md",
        "dark mode\npython\n",
        "add python",
    );

    repo.repo.checkout("main").unwrap();
    assert_eq!(read_file(&repo.repo, "semantic/pref.md"), "dark mode\n");

    let outcome = repo.repo.merge("exp").unwrap();
    assert_eq!(outcome, MergeOutcome::FastForward { tip: exp_tip.clone() });

    // main advanced to the exp tip; history has no merge commit
    assert_eq!(repo.repo.resolve("main").unwrap(), exp_tip);
    let log = repo.repo.log().unwrap();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|(_, commit)| !commit.is_merge()));

    // the working tree followed
    assert_eq!(
        read_file(&repo.repo, "semantic/pref.md"),
        "dark mode\npython\n"
    );
}

#[rstest]
fn merging_an_ancestor_is_a_noop(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "first");
    repo.repo.create_branch("old").unwrap();
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\npython\n", "second");

    let tip_before = repo.repo.resolve("HEAD").unwrap();
    let outcome = repo.repo.merge("old").unwrap();
    assert_eq!(outcome, MergeOutcome::AlreadyUpToDate);
    assert_eq!(repo.repo.resolve("HEAD").unwrap(), tip_before);
}

#[rstest]
fn merging_a_branch_into_itself_is_a_noop(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "first");
    let outcome = repo.repo.merge("main").unwrap();
    assert_eq!(outcome, MergeOutcome::AlreadyUpToDate);
}
