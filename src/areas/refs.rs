//! References (branches, HEAD, tags, remotes) and the reflog
//!
//! References are human-readable names pointing to commits:
//! - `HEAD`: the current branch (`ref: refs/heads/<name>`) or a detached
//!   commit hash
//! - `refs/heads/*`: branch tips
//! - `refs/tags/*`: lightweight tags
//! - `refs/remotes/<remote>/*`: remote-tracking branches
//!
//! Every ref file holds a single hex commit hash (or the symbolic form for
//! HEAD) and is updated via temp file + atomic rename, so readers never
//! observe a torn write. The reflog records one line per HEAD-moving
//! operation; a crash between a ref update and its reflog append is
//! repaired at open time by [`Refs::recover_reflog`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use derive_new::new;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: refs/heads/(.+)$";

/// Where HEAD currently points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// Symbolic: on a branch (which may not have any commit yet)
    Branch(RefName),
    /// Detached: directly at a commit
    Detached(ObjectId),
}

/// Operations that move HEAD and therefore land in the reflog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflogOp {
    Commit,
    Checkout,
    Merge,
    Reset,
    Branch,
}

/// One reflog record, serialized as a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflogEntry {
    /// Previous HEAD target, absent for the first entry
    pub prev: Option<String>,
    /// New HEAD target
    pub new: String,
    pub op: ReflogOp,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// References manager rooted at the `.mem` directory.
#[derive(Debug, new)]
pub struct Refs {
    /// Path to the repository metadata directory (typically `.mem`)
    path: Box<Path>,
}

impl Refs {
    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.refs_path().join("heads")
    }

    pub fn tags_path(&self) -> PathBuf {
        self.refs_path().join("tags")
    }

    pub fn remotes_path(&self) -> PathBuf {
        self.refs_path().join("remotes")
    }

    pub fn reflog_path(&self) -> PathBuf {
        self.path.join("reflog")
    }

    /// Point HEAD at the default branch of a fresh repository.
    pub fn init_head(&self, branch: &RefName) -> Result<()> {
        std::fs::create_dir_all(self.heads_path())?;
        std::fs::create_dir_all(self.tags_path())?;
        self.write_atomic(&self.head_path(), &format!("ref: refs/heads/{branch}\n"))
    }

    /// Where HEAD points: a branch name or a detached commit.
    pub fn head(&self) -> Result<Head> {
        let content = std::fs::read_to_string(self.head_path())?;
        let content = content.trim();

        let symref = Regex::new(SYMREF_REGEX)
            .map_err(|err| Error::invalid_argument(err.to_string()))?;
        if let Some(captures) = symref.captures(content) {
            return Ok(Head::Branch(RefName::try_parse(&captures[1])?));
        }

        Ok(Head::Detached(ObjectId::try_parse(content.to_string())?))
    }

    /// Commit id HEAD resolves to, `None` on an unborn branch.
    pub fn read_head(&self) -> Result<Option<ObjectId>> {
        match self.head()? {
            Head::Branch(branch) => self.read_branch(&branch),
            Head::Detached(oid) => Ok(Some(oid)),
        }
    }

    /// Attach HEAD to a branch.
    pub fn set_head_branch(&self, branch: &RefName) -> Result<()> {
        self.write_atomic(&self.head_path(), &format!("ref: refs/heads/{branch}\n"))
    }

    /// Detach HEAD at a commit.
    pub fn set_head_detached(&self, oid: &ObjectId) -> Result<()> {
        self.write_atomic(&self.head_path(), &format!("{oid}\n"))
    }

    /// Move HEAD's target: the branch tip when attached, the HEAD file
    /// itself when detached.
    pub fn update_head(&self, oid: &ObjectId) -> Result<()> {
        match self.head()? {
            Head::Branch(branch) => self.set_branch(&branch, oid),
            Head::Detached(_) => self.set_head_detached(oid),
        }
    }

    // --- branches ---

    pub fn read_branch(&self, name: &RefName) -> Result<Option<ObjectId>> {
        self.read_ref_file(&self.heads_path().join(name.to_path()))
    }

    pub fn set_branch(&self, name: &RefName, oid: &ObjectId) -> Result<()> {
        let path = self.heads_path().join(name.to_path());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_atomic(&path, &format!("{oid}\n"))
    }

    /// Create a branch at a commit; fails if it already exists.
    pub fn create_branch(&self, name: &RefName, oid: &ObjectId) -> Result<()> {
        let path = self.heads_path().join(name.to_path());
        if path.exists() {
            return Err(Error::invalid_argument(format!(
                "branch {name} already exists"
            )));
        }
        debug!(branch = %name, tip = %oid, "creating branch");
        self.set_branch(name, oid)
    }

    pub fn delete_branch(&self, name: &RefName) -> Result<ObjectId> {
        let path = self.heads_path().join(name.to_path());
        let oid = self
            .read_ref_file(&path)?
            .ok_or_else(|| Error::not_found(format!("branch {name}")))?;

        std::fs::remove_file(&path)?;
        self.prune_empty_parent_dirs(&path, &self.heads_path())?;
        Ok(oid)
    }

    pub fn branch_exists(&self, name: &RefName) -> bool {
        self.heads_path().join(name.to_path()).exists()
    }

    pub fn list_branches(&self) -> Result<Vec<RefName>> {
        self.list_refs(&self.heads_path())
    }

    // --- tags ---

    pub fn read_tag(&self, name: &RefName) -> Result<Option<ObjectId>> {
        self.read_ref_file(&self.tags_path().join(name.to_path()))
    }

    /// Create a lightweight tag; fails if it already exists.
    pub fn create_tag(&self, name: &RefName, oid: &ObjectId) -> Result<()> {
        let path = self.tags_path().join(name.to_path());
        if path.exists() {
            return Err(Error::invalid_argument(format!("tag {name} already exists")));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_atomic(&path, &format!("{oid}\n"))
    }

    pub fn delete_tag(&self, name: &RefName) -> Result<ObjectId> {
        let path = self.tags_path().join(name.to_path());
        let oid = self
            .read_ref_file(&path)?
            .ok_or_else(|| Error::not_found(format!("tag {name}")))?;

        std::fs::remove_file(&path)?;
        self.prune_empty_parent_dirs(&path, &self.tags_path())?;
        Ok(oid)
    }

    pub fn list_tags(&self) -> Result<Vec<RefName>> {
        self.list_refs(&self.tags_path())
    }

    // --- remote-tracking refs ---

    pub fn read_remote_branch(&self, remote: &str, branch: &RefName) -> Result<Option<ObjectId>> {
        let remote = RefName::try_parse(remote)?;
        self.read_ref_file(
            &self
                .remotes_path()
                .join(remote.to_path())
                .join(branch.to_path()),
        )
    }

    pub fn set_remote_branch(&self, remote: &str, branch: &RefName, oid: &ObjectId) -> Result<()> {
        let remote = RefName::try_parse(remote)?;
        let path = self
            .remotes_path()
            .join(remote.to_path())
            .join(branch.to_path());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_atomic(&path, &format!("{oid}\n"))
    }

    /// Map of every ref (branches, tags, remotes) to its target.
    pub fn all_refs(&self) -> Result<HashMap<String, ObjectId>> {
        let mut refs = HashMap::new();
        for root in [self.heads_path(), self.tags_path(), self.remotes_path()] {
            if !root.exists() {
                continue;
            }
            for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if !entry.path().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(self.path.as_ref())
                    .map_err(|_| Error::invalid_argument("ref outside refs root"))?;
                if let Some(oid) = self.read_ref_file(entry.path())? {
                    refs.insert(relative.to_string_lossy().replace('\\', "/"), oid);
                }
            }
        }
        Ok(refs)
    }

    // --- reflog ---

    /// Append a reflog record. Caller holds the repository write lock.
    pub fn reflog_append(
        &self,
        prev: Option<&ObjectId>,
        new: &ObjectId,
        op: ReflogOp,
        message: impl Into<String>,
    ) -> Result<()> {
        let entry = ReflogEntry {
            prev: prev.map(|oid| oid.as_ref().to_string()),
            new: new.as_ref().to_string(),
            op,
            timestamp: Utc::now(),
            message: message.into(),
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.reflog_path())?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// All reflog records, oldest first.
    pub fn reflog_entries(&self) -> Result<Vec<ReflogEntry>> {
        let path = self.reflog_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    /// Crash recovery at open time: if HEAD moved without a matching
    /// reflog append (crash between ref update and reflog write), record
    /// the current tip so reachability scans keep seeing it.
    pub fn recover_reflog(&self) -> Result<()> {
        let Some(head_oid) = self.read_head()? else {
            return Ok(());
        };
        let entries = self.reflog_entries()?;
        let last_new = entries.last().map(|entry| entry.new.as_str());

        if last_new != Some(head_oid.as_ref()) {
            debug!(tip = %head_oid, "reflog missing current tip, repairing");
            let prev = match last_new {
                Some(prev) => Some(ObjectId::try_parse(prev.to_string())?),
                None => None,
            };
            self.reflog_append(
                prev.as_ref(),
                &head_oid,
                ReflogOp::Commit,
                "recovered at open",
            )?;
        }
        Ok(())
    }

    // --- internals ---

    fn read_ref_file(&self, path: &Path) -> Result<Option<ObjectId>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(ObjectId::try_parse(content.to_string())?))
    }

    fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            Error::invalid_argument(format!("invalid ref path {}", path.display()))
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = parent.join(format!(".tmp-ref-{}", rand::random::<u32>()));
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    fn list_refs(&self, root: &Path) -> Result<Vec<RefName>> {
        let mut names = Vec::new();
        if !root.exists() {
            return Ok(names);
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.path().is_file()
                && let Ok(relative) = entry.path().strip_prefix(root)
                && let Ok(name) = RefName::try_parse(relative.to_string_lossy().replace('\\', "/"))
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn prune_empty_parent_dirs(&self, path: &Path, root: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && parent != root
            && parent.starts_with(root)
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent)?;
            self.prune_empty_parent_dirs(parent, root)?;
        }
        Ok(())
    }
}
