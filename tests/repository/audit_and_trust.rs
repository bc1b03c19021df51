//! Audit coverage of operations and trust gating on pull

use crate::common::{TestRepo, cancel, commit_file, repo};
use agmem::areas::repository::MergeOutcome;
use agmem::artifacts::audit::AuditOp;
use agmem::artifacts::trust::TrustLevel;
use agmem::{Error, Repository};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn state_changing_operations_land_in_the_audit_log(repo: TestRepo) {
    let mut repo = repo;
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    repo.repo.create_branch("exp").unwrap();
    repo.repo.create_tag("v1", "HEAD").unwrap();
    repo.repo.checkout("exp").unwrap();
    repo.repo.reset("HEAD").unwrap();
    repo.repo.config_set("gc.prune_days", "30").unwrap();
    repo.repo.gc(false, &cancel()).unwrap();

    let ops: Vec<AuditOp> = repo
        .repo
        .audit_entries(100)
        .unwrap()
        .into_iter()
        .rev()
        .map(|entry| entry.payload.op)
        .collect();
    assert_eq!(
        ops,
        vec![
            AuditOp::Init,
            AuditOp::Stage,
            AuditOp::Commit,
            AuditOp::Branch,
            AuditOp::Tag,
            AuditOp::Checkout,
            AuditOp::Reset,
            AuditOp::Config,
            AuditOp::Gc,
        ]
    );

    // the chain still verifies after all of it
    assert_eq!(repo.repo.audit_verify().unwrap(), ops.len() as u64);
}

#[rstest]
fn pull_from_an_untrusted_key_leaves_refs_alone(repo: TestRepo) {
    // remote: commit an unsigned base, then publish a signing key
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "base");
    let key_id = repo.repo.generate_signing_key().unwrap();
    let remote_root = repo.dir.path().join("repo");

    // clone while the tip is still unsigned
    let clone_root = repo.dir.path().join("clone");
    let clone = Repository::clone_from(&remote_root, &clone_root, "main", &cancel()).unwrap();

    // cloned keys start untrusted
    assert_eq!(clone.keystore().list_staged().unwrap(), vec![key_id.clone()]);
    assert_eq!(
        clone.trust_store().effective_level(&key_id).unwrap(),
        TrustLevel::Untrusted
    );

    // the remote signs a new commit
    {
        let mut remote = Repository::open(&remote_root).unwrap();
        remote.config_set("signing.enabled", "true").unwrap();
        commit_file(&remote, "semantic/a.md", "v1\n", "signed change");
    }

    // pulling the signed commit is blocked and no ref moves
    let before = clone.resolve("main").unwrap();
    let result = clone.pull(&remote_root, "origin", "main", &cancel());
    assert!(matches!(result, Err(Error::UntrustedKey { .. })));
    assert_eq!(clone.resolve("main").unwrap(), before);
    // the remote-tracking ref still points at the tip from clone time
    let main = agmem::artifacts::branch::branch_name::RefName::try_parse("main").unwrap();
    assert_eq!(
        clone.refs().read_remote_branch("origin", &main).unwrap(),
        Some(before.clone())
    );

    // promote the key, then the pull fast-forwards
    clone.keystore().promote_staged(&key_id).unwrap();
    clone.set_trust(&key_id, TrustLevel::Full).unwrap();
    let outcome = clone.pull(&remote_root, "origin", "main", &cancel()).unwrap();
    assert!(matches!(outcome, MergeOutcome::FastForward { .. }));
    assert_ne!(clone.resolve("main").unwrap(), before);
}

#[rstest]
fn conditionally_trusted_pull_flags_the_merge_commit(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "base");
    let key_id = repo.repo.generate_signing_key().unwrap();
    let remote_root = repo.dir.path().join("repo");

    let clone_root = repo.dir.path().join("clone");
    let clone = Repository::clone_from(&remote_root, &clone_root, "main", &cancel()).unwrap();
    clone.set_trust(&key_id, TrustLevel::Conditional).unwrap();

    // diverge: remote signs a change, clone changes a different file
    {
        let mut remote = Repository::open(&remote_root).unwrap();
        remote.config_set("signing.enabled", "true").unwrap();
        commit_file(&remote, "semantic/a.md", "v0\nremote\n", "remote signed");
    }
    commit_file(&clone, "semantic/b.md", "local\n", "local change");

    let outcome = clone.pull(&remote_root, "origin", "main", &cancel()).unwrap();
    let MergeOutcome::Merged { commit } = outcome else {
        panic!("expected a merge commit, got {outcome:?}");
    };

    let merge_commit = clone.database().require_commit(&commit).unwrap();
    assert!(merge_commit.metadata().conditional_trust);
}
