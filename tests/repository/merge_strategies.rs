//! Strategy dispatch: procedural prefer-newer, overrides, diverged roots

use crate::common::{TestRepo, commit_file, read_file, repo};
use agmem::areas::repository::MergeOutcome;
use agmem::artifacts::index::entry_mode::EntryMode;
use agmem::artifacts::index::index_entry::IndexEntry;
use agmem::artifacts::objects::commit::{Author, Commit};
use agmem::artifacts::objects::object::Object;
use agmem::artifacts::objects::object_type::ObjectType;
use agmem::artifacts::objects::tree::TreeBuilder;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::time::Duration;

#[rstest]
fn procedural_merge_prefers_the_newer_side_and_flags_review(repo: TestRepo) {
    commit_file(&repo.repo, "procedural/deploy.md", "step one\n", "base");
    repo.repo.create_branch("a").unwrap();
    repo.repo.create_branch("b").unwrap();

    repo.repo.checkout("a").unwrap();
    commit_file(&repo.repo, "procedural/deploy.md", "step one, then restart\n", "a steps");

    // make sure the second side carries a strictly newer timestamp
    std::thread::sleep(Duration::from_millis(10));

    repo.repo.checkout("b").unwrap();
    commit_file(&repo.repo, "procedural/deploy.md", "step one, then verify\n", "b steps");

    repo.repo.checkout("a").unwrap();
    let outcome = repo.repo.merge("b").unwrap();
    let MergeOutcome::Merged { commit } = outcome else {
        panic!("procedural merges never conflict, got {outcome:?}");
    };

    // the newer side (b) won, without in-file markers
    let merged = read_file(&repo.repo, "procedural/deploy.md");
    assert_eq!(merged, "step one, then verify\n");

    // the path is flagged for manual review in the commit metadata
    let merge_commit = repo.repo.database().require_commit(&commit).unwrap();
    assert_eq!(
        merge_commit.metadata().review_paths,
        vec!["procedural/deploy.md"]
    );
}

#[rstest]
fn strategy_override_reroutes_a_class(repo: TestRepo) {
    let mut repo = repo;
    repo.repo
        .config_set("merge.strategy_override.episodic", "semantic")
        .unwrap();

    commit_file(&repo.repo, "episodic/log.md", "base line\n", "base");
    repo.repo.create_branch("a").unwrap();
    repo.repo.create_branch("b").unwrap();

    repo.repo.checkout("a").unwrap();
    commit_file(&repo.repo, "episodic/log.md", "a line\n", "a");

    repo.repo.checkout("b").unwrap();
    commit_file(&repo.repo, "episodic/log.md", "b line\n", "b");

    repo.repo.checkout("a").unwrap();
    // with the override, overlapping episodic edits now conflict
    let outcome = repo.repo.merge("b").unwrap();
    assert_eq!(outcome, MergeOutcome::Conflicted { conflicts: 1 });
}

#[rstest]
fn other_class_paths_merge_like_semantic(repo: TestRepo) {
    commit_file(&repo.repo, "notes.md", "topic\n", "base");
    repo.repo.create_branch("a").unwrap();
    repo.repo.create_branch("b").unwrap();

    repo.repo.checkout("a").unwrap();
    commit_file(&repo.repo, "notes.md", "topic a\n", "a");

    repo.repo.checkout("b").unwrap();
    commit_file(&repo.repo, "notes.md", "topic b\n", "b");

    repo.repo.checkout("a").unwrap();
    let outcome = repo.repo.merge("b").unwrap();
    assert_eq!(outcome, MergeOutcome::Conflicted { conflicts: 1 });
    assert!(read_file(&repo.repo, "notes.md").contains("<<<<<<< ours"));
}

#[rstest]
fn diverged_histories_merge_against_the_empty_tree(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/pref.md", "dark mode\n", "main base");

    // fabricate an orphan root commit with a disjoint file
    let blob = repo
        .repo
        .database()
        .put(ObjectType::Blob, b"orphan fact\n")
        .unwrap();
    let entry = IndexEntry::new(
        "semantic/other.md".to_string(),
        blob,
        12,
        chrono_now(),
        EntryMode::Regular,
    );
    let entries = std::collections::BTreeMap::from([(entry.path.clone(), entry)]);
    let builder = TreeBuilder::from_entries(entries.values()).unwrap();
    let tree_oid = builder
        .write(&mut |tree| repo.repo.database().store(tree))
        .unwrap();
    let orphan = Commit::new(
        vec![],
        tree_oid,
        Author::new("orphan".to_string(), "orphan@localhost".to_string()),
        "orphan root".to_string(),
    );
    repo.repo.database().store(&orphan).unwrap();
    let orphan_oid = orphan.object_id().unwrap();
    repo.repo.create_branch_at("orphan", &orphan_oid).unwrap();

    // no common ancestor: merge still proceeds with the empty-tree base
    let outcome = repo.repo.merge("orphan").unwrap();
    let MergeOutcome::Merged { commit } = outcome else {
        panic!("disjoint files should merge cleanly, got {outcome:?}");
    };

    let merge_commit = repo.repo.database().require_commit(&commit).unwrap();
    assert_eq!(merge_commit.parents().len(), 2);
    assert_eq!(read_file(&repo.repo, "semantic/pref.md"), "dark mode\n");
    assert_eq!(read_file(&repo.repo, "semantic/other.md"), "orphan fact\n");
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
