//! Episodic files merge by chronological append, never with markers

use crate::common::{TestRepo, commit_file, read_file, repo};
use agmem::areas::repository::MergeOutcome;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn episodic_append_merge_orders_by_timestamp(repo: TestRepo) {
    commit_file(
        &repo.repo,
        "episodic/log.md",
        "2026-01-01T09:00:00Z session started\n",
        "base",
    );

    repo.repo.create_branch("a").unwrap();
    repo.repo.create_branch("b").unwrap();

    // branch a appends the 10:00 line
    repo.repo.checkout("a").unwrap();
    commit_file(
        &repo.repo,
        "episodic/log.md",
        "2026-01-01T09:00:00Z session started\n2026-01-01T10:00:00Z first event\n",
        "a event",
    );

    // branch b appends the 11:00 line
    repo.repo.checkout("b").unwrap();
    commit_file(
        &repo.repo,
        "episodic/log.md",
        "2026-01-01T09:00:00Z session started\n2026-01-01T11:00:00Z second event\n",
        "b event",
    );

    // merge b into a
    repo.repo.checkout("a").unwrap();
    let outcome = repo.repo.merge("b").unwrap();
    let MergeOutcome::Merged { commit } = outcome else {
        panic!("expected a merge commit, got {outcome:?}");
    };

    // one merge commit with both parents
    let merge_commit = repo.repo.database().require_commit(&commit).unwrap();
    assert_eq!(merge_commit.parents().len(), 2);

    // both lines present, in timestamp order, no conflict markers
    let merged = read_file(&repo.repo, "episodic/log.md");
    assert_eq!(
        merged,
        "2026-01-01T09:00:00Z session started\n\
         2026-01-01T10:00:00Z first event\n\
         2026-01-01T11:00:00Z second event\n"
    );
    assert!(!merged.contains("<<<<<<<"));
}

#[rstest]
fn episodic_merge_direction_does_not_change_order(repo: TestRepo) {
    commit_file(
        &repo.repo,
        "episodic/log.md",
        "2026-01-01T09:00:00Z start\n",
        "base",
    );
    repo.repo.create_branch("late").unwrap();
    repo.repo.create_branch("early").unwrap();

    // "late" commits first but carries the later timestamp
    repo.repo.checkout("late").unwrap();
    commit_file(
        &repo.repo,
        "episodic/log.md",
        "2026-01-01T09:00:00Z start\n2026-01-01T12:00:00Z wrap up\n",
        "late event",
    );

    repo.repo.checkout("early").unwrap();
    commit_file(
        &repo.repo,
        "episodic/log.md",
        "2026-01-01T09:00:00Z start\n2026-01-01T10:00:00Z midpoint\n",
        "early event",
    );

    repo.repo.merge("late").unwrap();
    assert_eq!(
        read_file(&repo.repo, "episodic/log.md"),
        "2026-01-01T09:00:00Z start\n\
         2026-01-01T10:00:00Z midpoint\n\
         2026-01-01T12:00:00Z wrap up\n"
    );
}
