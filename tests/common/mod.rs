//! Shared fixtures and helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use agmem::Repository;
use agmem::artifacts::objects::object_id::ObjectId;
use assert_fs::TempDir;
use rstest::fixture;

/// A repository in a temp directory. The directory must outlive the
/// repository handle, so both travel together.
pub struct TestRepo {
    pub dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub fn reopen(self) -> TestRepo {
        let repo = Repository::open(self.dir.path().join("repo").as_path())
            .expect("reopen repository");
        TestRepo {
            dir: self.dir,
            repo,
        }
    }
}

#[fixture]
pub fn repo() -> TestRepo {
    let dir = TempDir::new().expect("create temp dir");
    let repo = Repository::init(dir.path().join("repo").as_path()).expect("init repository");
    TestRepo { dir, repo }
}

/// A second repository in the same temp dir, for remote scenarios.
pub fn sibling_repo(test_repo: &TestRepo, name: &str) -> Repository {
    Repository::init(test_repo.dir.path().join(name).as_path()).expect("init sibling repository")
}

pub fn cancel() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Write a working-tree file.
pub fn write_file(repo: &Repository, path: &str, content: &str) {
    repo.workspace()
        .write_file(path, content.as_bytes())
        .expect("write working file");
}

/// Write, stage, and commit a single file.
pub fn commit_file(repo: &Repository, path: &str, content: &str, message: &str) -> ObjectId {
    write_file(repo, path, content);
    repo.stage(path).expect("stage file");
    repo.commit(message).expect("commit")
}

/// Read a working-tree file as a string.
pub fn read_file(repo: &Repository, path: &str) -> String {
    String::from_utf8(repo.workspace().read_file(path).expect("read working file").to_vec())
        .expect("utf8 working file")
}
