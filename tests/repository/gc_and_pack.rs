//! GC safety and repacking through the similarity matcher

use crate::common::{TestRepo, cancel, commit_file, repo, write_file};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn gc_sweeps_unreachable_objects_and_keeps_reachable_history(repo: TestRepo) {
    // reachable: two commits on main, one on a branch, one tagged
    let c0 = commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    repo.repo.create_tag("keep", c0.as_ref()).unwrap();
    repo.repo.create_branch("side").unwrap();
    repo.repo.checkout("side").unwrap();
    let side_tip = commit_file(&repo.repo, "semantic/side.md", "side\n", "side");
    repo.repo.checkout("main").unwrap();
    let c1 = commit_file(&repo.repo, "semantic/a.md", "v1\n", "c1");

    // garbage: a staged-then-unstaged blob is unreachable
    write_file(&repo.repo, "semantic/garbage.md", "forget me\n");
    repo.repo.stage("semantic/garbage.md").unwrap();
    repo.repo.unstage("semantic/garbage.md").unwrap();

    let report = repo.repo.gc(false, &cancel()).unwrap();
    assert!(report.swept >= 1, "expected the orphan blob to be swept");

    // every reachable commit is still readable
    for oid in [&c0, &c1, &side_tip] {
        repo.repo.database().require_commit(oid).unwrap();
    }
    assert_eq!(repo.repo.log().unwrap().len(), 2);
    assert_eq!(repo.repo.resolve("keep").unwrap(), c0);
}

#[rstest]
fn commits_reachable_only_through_the_reflog_survive_gc(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    let c1 = commit_file(&repo.repo, "semantic/a.md", "v1\n", "c1");
    repo.repo.reset("HEAD~1").unwrap();

    // c1 is no longer reachable from any ref, only from the reflog
    repo.repo.gc(false, &cancel()).unwrap();
    repo.repo.database().require_commit(&c1).unwrap();
}

#[rstest]
fn repack_moves_loose_objects_into_a_pack(repo: TestRepo) {
    // similar episodic entries give the delta selector something to chew on
    let mut content = String::from("2026-01-01T08:00:00Z session opened with the usual context\n");
    for n in 0..6 {
        content.push_str(&format!(
            "2026-01-01T0{n}:10:00Z heartbeat event number {n} with stable wording\n"
        ));
        commit_file(&repo.repo, "episodic/log.md", &content, &format!("event {n}"));
    }

    let loose_before = repo.repo.database().iter_loose().unwrap().len();
    assert!(loose_before > 0);

    let report = repo.repo.gc(true, &cancel()).unwrap();
    assert_eq!(report.packed, report.marked);
    assert!(repo.repo.database().iter_loose().unwrap().is_empty());

    // everything still reads back through the pack
    let log = repo.repo.log().unwrap();
    assert_eq!(log.len(), 6);
    for (_, commit) in &log {
        repo.repo
            .database()
            .flatten_tree(commit.tree_oid())
            .unwrap();
    }

    // and the whole store still verifies
    let fsck = repo.repo.fsck(&cancel()).unwrap();
    assert!(fsck.is_clean(), "unexpected issues: {:?}", fsck.issues);
}

#[rstest]
fn commits_after_a_repack_coexist_with_the_pack(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    repo.repo.gc(true, &cancel()).unwrap();

    let c1 = commit_file(&repo.repo, "semantic/a.md", "v1\n", "c1");
    assert_eq!(repo.repo.resolve("HEAD").unwrap(), c1);
    assert_eq!(repo.repo.log().unwrap().len(), 2);
}

#[rstest]
fn cancelled_gc_deletes_nothing(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    write_file(&repo.repo, "semantic/garbage.md", "orphan\n");
    repo.repo.stage("semantic/garbage.md").unwrap();
    repo.repo.unstage("semantic/garbage.md").unwrap();

    let loose_before = repo.repo.database().iter_loose().unwrap().len();

    let flag = cancel();
    flag.store(true, std::sync::atomic::Ordering::Relaxed);
    assert!(matches!(
        repo.repo.gc(false, &flag),
        Err(agmem::Error::Cancelled)
    ));

    assert_eq!(repo.repo.database().iter_loose().unwrap().len(), loose_before);
}
