//! Branches, tags, detached HEAD, and revision resolution

use crate::common::{TestRepo, commit_file, read_file, repo};
use agmem::Error;
use agmem::areas::refs::Head;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn ancestor_expressions_walk_first_parents(repo: TestRepo) {
    let c0 = commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    let c1 = commit_file(&repo.repo, "semantic/a.md", "v1\n", "c1");
    let c2 = commit_file(&repo.repo, "semantic/a.md", "v2\n", "c2");

    assert_eq!(repo.repo.resolve("HEAD").unwrap(), c2);
    assert_eq!(repo.repo.resolve("HEAD~1").unwrap(), c1);
    assert_eq!(repo.repo.resolve("HEAD~2").unwrap(), c0);
    assert_eq!(repo.repo.resolve("main~1").unwrap(), c1);
    assert_eq!(repo.repo.resolve("main^").unwrap(), c1);

    assert!(matches!(
        repo.repo.resolve("HEAD~3"),
        Err(Error::NotFound { .. })
    ));
}

#[rstest]
fn full_and_short_hashes_resolve(repo: TestRepo) {
    let c0 = commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");

    assert_eq!(repo.repo.resolve(c0.as_ref()).unwrap(), c0);
    assert_eq!(repo.repo.resolve(&c0.as_ref()[..10]).unwrap(), c0);
}

#[rstest]
fn ambiguous_prefix_is_rejected(repo: TestRepo) {
    use agmem::artifacts::objects::object_type::ObjectType;
    use std::collections::HashMap;

    // brute-force two blobs sharing a 4-hex prefix
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut ambiguous_prefix = None;
    for n in 0..5000u32 {
        let oid = repo
            .repo
            .database()
            .put(ObjectType::Blob, format!("filler {n}").as_bytes())
            .unwrap();
        let prefix = oid.as_ref()[..4].to_string();
        if seen.insert(prefix.clone(), oid.as_ref().to_string()).is_some() {
            ambiguous_prefix = Some(prefix);
            break;
        }
    }

    let prefix = ambiguous_prefix.expect("a 4-hex prefix collision within 5000 blobs");
    assert!(matches!(
        repo.repo.resolve(&prefix),
        Err(Error::AmbiguousRef { .. })
    ));
}

#[rstest]
fn checkout_by_hash_detaches_head(repo: TestRepo) {
    let c0 = commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    commit_file(&repo.repo, "semantic/a.md", "v1\n", "c1");

    repo.repo.checkout(c0.as_ref()).unwrap();
    assert_eq!(repo.repo.refs().head().unwrap(), Head::Detached(c0.clone()));
    assert_eq!(read_file(&repo.repo, "semantic/a.md"), "v0\n");
}

#[rstest]
fn hierarchical_branch_names_round_trip(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    repo.repo.create_branch("feature/deep/name").unwrap();

    let branches: Vec<String> = repo
        .repo
        .list_branches()
        .unwrap()
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect();
    assert_eq!(branches, vec!["feature/deep/name", "main"]);

    repo.repo.checkout("feature/deep/name").unwrap();
    commit_file(&repo.repo, "semantic/a.md", "v1\n", "on feature");
    repo.repo.checkout("main").unwrap();
    repo.repo.delete_branch("feature/deep/name").unwrap();
}

#[rstest]
fn invalid_ref_names_are_rejected(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");

    for name in ["..", "a/../b", "has space", "ctrl\x07name", "x.lock"] {
        assert!(
            matches!(
                repo.repo.create_branch(name),
                Err(Error::InvalidRefName { .. })
            ),
            "name {name:?} should be invalid"
        );
    }
}

#[rstest]
fn deleting_the_current_branch_is_refused(repo: TestRepo) {
    commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    assert!(repo.repo.delete_branch("main").is_err());
}

#[rstest]
fn tags_pin_commits(repo: TestRepo) {
    let c0 = commit_file(&repo.repo, "semantic/a.md", "v0\n", "c0");
    commit_file(&repo.repo, "semantic/a.md", "v1\n", "c1");

    repo.repo.create_tag("v1", c0.as_ref()).unwrap();
    assert_eq!(repo.repo.resolve("v1").unwrap(), c0);

    // duplicate tags are rejected, deletion works
    assert!(repo.repo.create_tag("v1", "HEAD").is_err());
    repo.repo.delete_tag("v1").unwrap();
    assert!(matches!(
        repo.repo.resolve("v1"),
        Err(Error::NotFound { .. })
    ));
}
