//! Repository handle and high-level operations
//!
//! The repository is the only mutable state container in the core; every
//! operation goes through a [`Repository`] handle opened on a directory
//! with the layout:
//!
//! ```text
//! <repo>/
//!   current/          working tree (episodic/ semantic/ procedural/ ...)
//!   .mem/             objects, refs, index, reflog, audit, merge state,
//!                     keys, trust store, config, lock
//! ```
//!
//! All operations are synchronous. Mutating operations serialize on an
//! advisory file lock (`.mem/lock`) with a caller-configurable timeout;
//! expiry yields `LockBusy`. Within a commit the ordering is: blobs →
//! trees → commit object → ref update → reflog append → audit append, the
//! last three under the lock. A crash between the ref update and the
//! appends is repaired at open time.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use file_guard::Lock;
use tracing::{debug, info};

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::{Head, ReflogEntry, ReflogOp, Refs};
use crate::areas::workspace::Workspace;
use crate::artifacts::audit::{AuditEntry, AuditLog, AuditOp};
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::config::Config;
use crate::artifacts::crypto::encryption::Encryptor;
use crate::artifacts::crypto::merkle::{MerkleProof, merkle_proof, merkle_root, verify_proof};
use crate::artifacts::crypto::signing::{KeyStore, sign_root, verify_root_signature};
use crate::artifacts::fsck::{FsckReport, fsck};
use crate::artifacts::gc::{GcReport, run_gc};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::memory::MemoryClass;
use crate::artifacts::merge::diff3::strip_markers_keep_both;
use crate::artifacts::merge::engine::{MergeAnalysis, MergeEngine, MergePlan};
use crate::artifacts::merge::state::{MergeState, MergeStateStore, Resolution};
use crate::artifacts::objects::commit::{Author, Commit, CommitMetadata};
use crate::artifacts::objects::object::hash_payload;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::TreeBuilder;
use crate::artifacts::remote::sync::{FetchOutcome, PushOutcome, RemoteSync};
use crate::artifacts::remote::transport::{FileTransport, Transport};
use crate::artifacts::trust::{TrustLevel, TrustStore};
use crate::errors::{Error, Result};

/// Name of the repository metadata directory.
pub const MEM_DIR: &str = ".mem";

/// Name of the working-tree directory.
pub const WORK_DIR: &str = "current";

/// Default lock-acquisition timeout.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Staged-deletion sentinel: an all-zero object id marks a tombstone.
fn tombstone_oid() -> ObjectId {
    ObjectId::from_raw(&[0u8; 32])
}

/// Fresh cancellation flag for long-running operations.
pub fn cancel_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Working-tree status.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
}

/// Outcome of a merge operation.
#[derive(Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The other tip was already contained in ours
    AlreadyUpToDate,
    /// Pointer update only, no new commit
    FastForward { tip: ObjectId },
    /// Clean three-way merge commit
    Merged { commit: ObjectId },
    /// Conflicts persisted; repository is now MERGING
    Conflicted { conflicts: usize },
}

/// Repository handle.
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    mem_dir: PathBuf,
    config: Config,
    database: Database,
    refs: Refs,
    index: Index,
    workspace: Workspace,
    audit: AuditLog,
    trust: TrustStore,
    keystore: KeyStore,
    merge_state: MergeStateStore,
    lock_timeout: Duration,
}

impl Repository {
    // --- lifecycle ---

    /// Initialize a new repository at `root` with the given configuration.
    pub fn init_with_config(root: &Path, config: Config) -> Result<Repository> {
        config.validate()?;

        let mem_dir = root.join(MEM_DIR);
        if mem_dir.exists() {
            return Err(Error::invalid_argument(format!(
                "repository already exists at {}",
                root.display()
            )));
        }

        std::fs::create_dir_all(root.join(WORK_DIR))?;
        std::fs::create_dir_all(mem_dir.join("objects"))?;
        for class in ["episodic", "semantic", "procedural"] {
            std::fs::create_dir_all(root.join(WORK_DIR).join(class))?;
        }

        config.save(&mem_dir.join("config"))?;

        let refs = Refs::new(mem_dir.clone().into_boxed_path());
        let default_branch = RefName::try_parse(config.core.default_branch.clone())?;
        refs.init_head(&default_branch)?;

        let repository = Self::open(root)?;
        repository.audit.append(
            AuditOp::Init,
            serde_json::json!({ "branch": default_branch.as_ref() }),
        )?;
        info!(root = %root.display(), branch = %default_branch, "initialized repository");
        Ok(repository)
    }

    /// Initialize with default configuration.
    pub fn init(root: &Path) -> Result<Repository> {
        Self::init_with_config(root, Config::default())
    }

    /// Open an existing repository.
    ///
    /// Fails with `InvalidConfig` when encryption at rest is enabled; use
    /// [`Repository::open_with_passphrase`] in that case.
    pub fn open(root: &Path) -> Result<Repository> {
        Self::open_inner(root, None)
    }

    /// Open a repository whose object store is encrypted at rest.
    pub fn open_with_passphrase(root: &Path, passphrase: &[u8]) -> Result<Repository> {
        Self::open_inner(root, Some(passphrase))
    }

    fn open_inner(root: &Path, passphrase: Option<&[u8]>) -> Result<Repository> {
        let root = root.to_path_buf();
        let mem_dir = root.join(MEM_DIR);
        if !mem_dir.exists() {
            return Err(Error::not_found(format!(
                "repository at {}",
                root.display()
            )));
        }

        let config = Config::load(&mem_dir.join("config"))?;

        let encryptor = if config.encryption.enabled {
            let passphrase = passphrase.ok_or_else(|| Error::InvalidConfig {
                key: "encryption.enabled".to_string(),
                reason: "repository is encrypted; a passphrase is required".to_string(),
            })?;
            let salt_hex = config.encryption.salt.clone().ok_or_else(|| {
                Error::InvalidConfig {
                    key: "encryption.salt".to_string(),
                    reason: "missing KDF salt".to_string(),
                }
            })?;
            let salt = decode_hex(&salt_hex)?;
            Some(Encryptor::from_passphrase(
                passphrase,
                &salt,
                &config.encryption.kdf,
            )?)
        } else {
            None
        };

        let repository = Repository {
            database: Database::new(
                mem_dir.join("objects").into_boxed_path(),
                encryptor,
                config.core.compression,
            ),
            refs: Refs::new(mem_dir.clone().into_boxed_path()),
            index: Index::new(mem_dir.join("index").into_boxed_path()),
            workspace: Workspace::new(root.join(WORK_DIR).into_boxed_path()),
            audit: AuditLog::new(mem_dir.join("audit").into_boxed_path()),
            trust: TrustStore::new(mem_dir.join("trust").into_boxed_path()),
            keystore: KeyStore::new(mem_dir.join("keys").into_boxed_path()),
            merge_state: MergeStateStore::new(mem_dir.join("merge").into_boxed_path()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            config,
            mem_dir,
            root,
        };

        // repair a crash between ref update and reflog append
        repository.refs.recover_reflog()?;
        Ok(repository)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    /// Override the lock-acquisition timeout.
    pub fn set_lock_timeout(&mut self, timeout: Duration) {
        self.lock_timeout = timeout;
    }

    /// Whether a merge is in progress.
    pub fn is_merging(&self) -> bool {
        self.merge_state.exists()
    }

    // --- locking ---

    /// Run `action` while holding the repository write lock.
    fn with_lock<T>(&self, action: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.mem_dir.join("lock"))?;

        let deadline = Instant::now() + self.lock_timeout;
        let guard = loop {
            match file_guard::try_lock(&lock_file, Lock::Exclusive, 0, 1) {
                Ok(guard) => break guard,
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(_) => return Err(Error::LockBusy),
            }
        };

        let result = action();
        drop(guard);
        result
    }

    // --- staging ---

    /// Stage a file. A tracked file missing from disk is staged as a
    /// deletion; an unknown missing path is ignored.
    pub fn stage(&self, path: &str) -> Result<()> {
        self.workspace.resolve(path)?;

        self.with_lock(|| {
            if self.workspace.exists(path)? {
                let entry = self.stage_blob(path)?;
                self.audit.append(
                    AuditOp::Stage,
                    serde_json::json!({ "path": path, "blob": entry.oid.as_ref() }),
                )?;
            } else if self.head_flat_tree()?.contains_key(path) {
                // tombstone: the next commit drops this path
                self.index.add(IndexEntry::new(
                    path.to_string(),
                    tombstone_oid(),
                    0,
                    Utc::now(),
                    EntryMode::Regular,
                ))?;
                self.audit.append(
                    AuditOp::Stage,
                    serde_json::json!({ "path": path, "deleted": true }),
                )?;
            }
            Ok(())
        })
    }

    /// Stage every working file, plus deletions of tracked files that are
    /// gone from disk.
    pub fn stage_all(&self) -> Result<usize> {
        self.with_lock(|| {
            let files = self.workspace.list_files()?;
            let on_disk: HashSet<String> = files.iter().cloned().collect();
            let mut staged = 0usize;

            for path in &files {
                self.stage_blob(path)?;
                staged += 1;
            }
            for path in self.head_flat_tree()?.keys() {
                if !on_disk.contains(path) {
                    self.index.add(IndexEntry::new(
                        path.clone(),
                        tombstone_oid(),
                        0,
                        Utc::now(),
                        EntryMode::Regular,
                    ))?;
                    staged += 1;
                }
            }

            self.audit
                .append(AuditOp::Stage, serde_json::json!({ "count": staged }))?;
            Ok(staged)
        })
    }

    /// Remove a path from the staging index.
    pub fn unstage(&self, path: &str) -> Result<bool> {
        self.with_lock(|| self.index.remove(path))
    }

    fn stage_blob(&self, path: &str) -> Result<IndexEntry> {
        let content = self.workspace.read_file(path)?;
        let oid = self.database.put(ObjectType::Blob, &content)?;
        let stat = self.workspace.stat(path)?;

        let entry = IndexEntry::new(
            path.to_string(),
            oid,
            stat.size,
            stat.mtime,
            EntryMode::Regular,
        );
        self.index.add(entry.clone())?;
        Ok(entry)
    }

    // --- status ---

    /// Staged / modified / deleted / untracked classification.
    pub fn status(&self) -> Result<StatusReport> {
        let staged_entries = self.index.load()?;
        let head_flat = self.head_flat_tree()?;

        let mut report = StatusReport {
            staged: staged_entries.keys().cloned().collect(),
            ..StatusReport::default()
        };

        let mut known: HashSet<String> = head_flat.keys().cloned().collect();
        known.extend(staged_entries.keys().cloned());

        for (path, (head_oid, _)) in &head_flat {
            if staged_entries.contains_key(path) {
                continue;
            }
            if !self.workspace.exists(path)? {
                report.deleted.push(path.clone());
                continue;
            }
            let content = self.workspace.read_file(path)?;
            if &hash_payload(ObjectType::Blob, &content) != head_oid {
                report.modified.push(path.clone());
            }
        }

        report.untracked = self.workspace.untracked(&known)?;
        Ok(report)
    }

    // --- commit ---

    /// Commit the staging index on top of HEAD.
    ///
    /// Refused while a merge is in progress (`MergingState`) and when
    /// nothing is staged.
    pub fn commit(&self, message: &str) -> Result<ObjectId> {
        if self.is_merging() {
            return Err(Error::MergingState);
        }

        let staged = self.index.load()?;
        if staged.is_empty() {
            return Err(Error::invalid_argument("nothing staged to commit"));
        }

        // overlay staged entries on the tracked tree; tombstones drop paths
        let mut entries = self.head_entries()?;
        for (path, entry) in staged {
            if entry.oid == tombstone_oid() {
                entries.remove(&path);
            } else {
                entries.insert(path, entry);
            }
        }

        let parent = self.refs.read_head()?;
        let parents: Vec<ObjectId> = parent.into_iter().collect();
        let commit_oid = self.write_commit(&entries, parents.clone(), message, Vec::new(), false)?;

        self.with_lock(|| {
            self.refs.update_head(&commit_oid)?;
            self.refs.reflog_append(
                parents.first(),
                &commit_oid,
                ReflogOp::Commit,
                message.lines().next().unwrap_or(""),
            )?;
            self.audit.append(
                AuditOp::Commit,
                serde_json::json!({ "commit": commit_oid.as_ref(), "message": message }),
            )?;
            self.index.clear()
        })?;

        info!(commit = %commit_oid.to_short_oid(), "created commit");
        Ok(commit_oid)
    }

    /// Build and store blobs→trees→commit, returning the commit id. The
    /// caller is responsible for advancing refs under the lock.
    fn write_commit(
        &self,
        entries: &BTreeMap<String, IndexEntry>,
        parents: Vec<ObjectId>,
        message: &str,
        review_paths: Vec<String>,
        conditional_trust: bool,
    ) -> Result<ObjectId> {
        let builder = TreeBuilder::from_entries(entries.values())?;
        let tree_oid = builder.write(&mut |tree| self.database.store(tree))?;

        // timestamps are monotonically non-decreasing along parent chains
        let mut timestamp = Utc::now();
        for parent in &parents {
            let parent_commit = self.database.require_commit(parent)?;
            timestamp = timestamp.max(parent_commit.timestamp());
        }

        let author = Author::new_with_timestamp(
            self.config.author.name.clone(),
            self.config.author.email.clone(),
            timestamp,
        );

        let mut metadata = CommitMetadata {
            review_paths,
            conditional_trust,
            ..CommitMetadata::default()
        };

        if self.config.signing.enabled {
            let leaves: Vec<(String, ObjectId)> = entries
                .iter()
                .map(|(path, entry)| (path.clone(), entry.oid.clone()))
                .collect();
            let root = merkle_root(&leaves);
            if let Some(signing_key) = self.keystore.signing_key()? {
                let (signature, key_id) = sign_root(&signing_key, &root);
                metadata.signature = Some(signature);
                metadata.signing_key_id = Some(key_id);
            }
            metadata.merkle_root = Some(root);
        }

        let commit =
            Commit::new(parents, tree_oid, author, message.to_string()).with_metadata(metadata);
        self.database.store(&commit)
    }

    // --- history ---

    /// Resolve a revision expression to a commit id.
    pub fn resolve(&self, revision: &str) -> Result<ObjectId> {
        Revision::parse(revision)?.resolve(&self.refs, &self.database)
    }

    /// Commits reachable from HEAD, newest-first along the walk order.
    pub fn log(&self) -> Result<Vec<(ObjectId, Commit)>> {
        let Some(head) = self.refs.read_head()? else {
            return Ok(Vec::new());
        };
        RevList::new(&self.database, head).collect()
    }

    pub fn reflog(&self) -> Result<Vec<ReflogEntry>> {
        self.refs.reflog_entries()
    }

    // --- branches, tags, checkout, reset ---

    /// Create a branch at HEAD.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        let tip = self
            .refs
            .read_head()?
            .ok_or_else(|| Error::not_found("HEAD (no commits yet)"))?;
        self.create_branch_at(name, &tip)
    }

    /// Create a branch at an arbitrary revision.
    pub fn create_branch_at(&self, name: &str, tip: &ObjectId) -> Result<()> {
        let name = RefName::try_parse(name)?;
        if self.database.parse_object_as_commit(tip)?.is_none() {
            return Err(Error::invalid_argument(format!(
                "object {tip} is not a commit"
            )));
        }

        self.with_lock(|| {
            self.refs.create_branch(&name, tip)?;
            self.refs
                .reflog_append(None, tip, ReflogOp::Branch, format!("branch {name}"))?;
            self.audit.append(
                AuditOp::Branch,
                serde_json::json!({ "branch": name.as_ref(), "tip": tip.as_ref() }),
            )
        })
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let name = RefName::try_parse(name)?;
        if let Head::Branch(current) = self.refs.head()?
            && current == name
        {
            return Err(Error::invalid_argument(format!(
                "cannot delete the current branch {name}"
            )));
        }

        self.with_lock(|| {
            let tip = self.refs.delete_branch(&name)?;
            self.audit.append(
                AuditOp::Branch,
                serde_json::json!({ "branch": name.as_ref(), "deleted": tip.as_ref() }),
            )
        })
    }

    pub fn list_branches(&self) -> Result<Vec<RefName>> {
        self.refs.list_branches()
    }

    pub fn create_tag(&self, name: &str, revision: &str) -> Result<()> {
        let name = RefName::try_parse(name)?;
        let target = self.resolve(revision)?;

        self.with_lock(|| {
            self.refs.create_tag(&name, &target)?;
            self.audit.append(
                AuditOp::Tag,
                serde_json::json!({ "tag": name.as_ref(), "target": target.as_ref() }),
            )
        })
    }

    pub fn delete_tag(&self, name: &str) -> Result<()> {
        let name = RefName::try_parse(name)?;
        self.with_lock(|| {
            let target = self.refs.delete_tag(&name)?;
            self.audit.append(
                AuditOp::Tag,
                serde_json::json!({ "tag": name.as_ref(), "deleted": target.as_ref() }),
            )
        })
    }

    pub fn list_tags(&self) -> Result<Vec<RefName>> {
        self.refs.list_tags()
    }

    /// Check out a branch or revision, replacing tracked working files.
    pub fn checkout(&self, target: &str) -> Result<()> {
        if self.is_merging() {
            return Err(Error::MergingState);
        }

        let prev_oid = self.refs.read_head()?;
        let target_oid = self.resolve(target)?;

        let previous = self.tracked_content()?;
        let commit = self.database.require_commit(&target_oid)?;
        let next = self.tree_content(commit.tree_oid())?;

        self.with_lock(|| {
            self.workspace.apply_tree(&previous, &next)?;

            // branch name attaches HEAD; anything else detaches it
            match RefName::try_parse(target) {
                Ok(branch) if self.refs.branch_exists(&branch) => {
                    self.refs.set_head_branch(&branch)?;
                }
                _ => self.refs.set_head_detached(&target_oid)?,
            }

            self.refs.reflog_append(
                prev_oid.as_ref(),
                &target_oid,
                ReflogOp::Checkout,
                format!("checkout {target}"),
            )?;
            self.audit.append(
                AuditOp::Checkout,
                serde_json::json!({ "target": target, "commit": target_oid.as_ref() }),
            )?;
            self.index.clear()
        })
    }

    /// Hard reset: move the current branch tip (and working tree) to a
    /// revision and clear the staging index.
    pub fn reset(&self, revision: &str) -> Result<()> {
        if self.is_merging() {
            return Err(Error::MergingState);
        }

        let prev_oid = self.refs.read_head()?;
        let target_oid = self.resolve(revision)?;

        let previous = self.tracked_content()?;
        let commit = self.database.require_commit(&target_oid)?;
        let next = self.tree_content(commit.tree_oid())?;

        self.with_lock(|| {
            self.workspace.apply_tree(&previous, &next)?;
            self.refs.update_head(&target_oid)?;
            self.refs.reflog_append(
                prev_oid.as_ref(),
                &target_oid,
                ReflogOp::Reset,
                format!("reset to {revision}"),
            )?;
            self.audit.append(
                AuditOp::Reset,
                serde_json::json!({ "revision": revision, "commit": target_oid.as_ref() }),
            )?;
            self.index.clear()
        })
    }

    // --- merge ---

    /// Merge another branch (or revision) into the current branch.
    pub fn merge(&self, theirs: &str) -> Result<MergeOutcome> {
        self.merge_inner(theirs, theirs, false)
    }

    fn merge_inner(
        &self,
        theirs: &str,
        theirs_label: &str,
        conditional_trust: bool,
    ) -> Result<MergeOutcome> {
        if self.is_merging() {
            return Err(Error::MergingState);
        }

        let ours_tip = self
            .refs
            .read_head()?
            .ok_or_else(|| Error::not_found("HEAD (no commits yet)"))?;
        let theirs_tip = self.resolve(theirs)?;

        let engine = MergeEngine::new(&self.database, &self.config);
        match engine.analyze(&ours_tip, &theirs_tip)? {
            MergeAnalysis::AlreadyUpToDate => Ok(MergeOutcome::AlreadyUpToDate),
            MergeAnalysis::FastForward(tip) => {
                let previous = self.tracked_content()?;
                let commit = self.database.require_commit(&tip)?;
                let next = self.tree_content(commit.tree_oid())?;

                self.with_lock(|| {
                    self.workspace.apply_tree(&previous, &next)?;
                    self.refs.update_head(&tip)?;
                    self.refs.reflog_append(
                        Some(&ours_tip),
                        &tip,
                        ReflogOp::Merge,
                        format!("fast-forward to {theirs_label}"),
                    )?;
                    self.audit.append(
                        AuditOp::Merge,
                        serde_json::json!({
                            "theirs": theirs_label,
                            "tip": tip.as_ref(),
                            "fast_forward": true,
                        }),
                    )
                })?;
                Ok(MergeOutcome::FastForward { tip })
            }
            MergeAnalysis::ThreeWay(plan) => {
                self.apply_three_way(plan, ours_tip, theirs_tip, theirs_label, conditional_trust)
            }
        }
    }

    fn apply_three_way(
        &self,
        plan: MergePlan,
        ours_tip: ObjectId,
        theirs_tip: ObjectId,
        theirs_label: &str,
        conditional_trust: bool,
    ) -> Result<MergeOutcome> {
        let previous = self.tracked_content()?;
        self.workspace.apply_tree(&previous, &plan.merged_files)?;

        if plan.conflicts.is_empty() {
            let commit_oid = self.commit_merge_result(
                &plan.merged_files,
                &ours_tip,
                &theirs_tip,
                theirs_label,
                plan.review_paths.clone(),
                conditional_trust,
            )?;
            return Ok(MergeOutcome::Merged { commit: commit_oid });
        }

        let state = MergeState {
            ours_tip: ours_tip.as_ref().to_string(),
            theirs_tip: theirs_tip.as_ref().to_string(),
            base: plan.base.as_ref().map(|oid| oid.as_ref().to_string()),
            theirs_label: theirs_label.to_string(),
            conflicts: plan.conflicts,
            review_paths: plan.review_paths,
        };
        let conflict_count = state.conflicts.len();

        self.with_lock(|| {
            self.merge_state.save(&state)?;
            self.audit.append(
                AuditOp::Merge,
                serde_json::json!({
                    "theirs": theirs_label,
                    "conflicts": conflict_count,
                }),
            )
        })?;

        debug!(conflicts = conflict_count, "merge left in MERGING state");
        Ok(MergeOutcome::Conflicted {
            conflicts: conflict_count,
        })
    }

    /// Write the two-parent merge commit from merged file content.
    fn commit_merge_result(
        &self,
        merged_files: &BTreeMap<String, Bytes>,
        ours_tip: &ObjectId,
        theirs_tip: &ObjectId,
        theirs_label: &str,
        review_paths: Vec<String>,
        conditional_trust: bool,
    ) -> Result<ObjectId> {
        let mut entries = BTreeMap::new();
        for (path, content) in merged_files {
            let oid = self.database.put(ObjectType::Blob, content)?;
            entries.insert(
                path.clone(),
                IndexEntry::new(
                    path.clone(),
                    oid,
                    content.len() as u64,
                    Utc::now(),
                    EntryMode::Regular,
                ),
            );
        }

        let message = format!("merge {theirs_label}");
        let commit_oid = self.write_commit(
            &entries,
            vec![ours_tip.clone(), theirs_tip.clone()],
            &message,
            review_paths,
            conditional_trust,
        )?;

        self.with_lock(|| {
            self.refs.update_head(&commit_oid)?;
            self.refs
                .reflog_append(Some(ours_tip), &commit_oid, ReflogOp::Merge, &message)?;
            self.audit.append(
                AuditOp::Merge,
                serde_json::json!({
                    "theirs": theirs_label,
                    "commit": commit_oid.as_ref(),
                }),
            )?;
            self.index.clear()
        })?;

        info!(commit = %commit_oid.to_short_oid(), "created merge commit");
        Ok(commit_oid)
    }

    /// Resolve one conflicted path; completes the merge when it was the
    /// last one.
    ///
    /// # Arguments
    ///
    /// * `path` - conflicted path from the merge state
    /// * `resolution` - `ours`, `theirs`, or `both`
    pub fn resolve_conflict(&self, path: &str, resolution: Resolution) -> Result<Option<ObjectId>> {
        let mut state = self.merge_state.require()?;

        let conflict = state
            .conflicts
            .iter_mut()
            .find(|conflict| conflict.path == path)
            .ok_or_else(|| Error::not_found(format!("conflict at {path}")))?;

        // materialize the chosen content
        let chosen: Option<Bytes> = match resolution {
            Resolution::Ours => self.read_optional_blob(conflict.ours.as_deref())?,
            Resolution::Theirs => self.read_optional_blob(conflict.theirs.as_deref())?,
            Resolution::Both => {
                let current = self.workspace.read_file(path)?;
                Some(Bytes::from(strip_markers_keep_both(
                    &String::from_utf8_lossy(&current),
                )))
            }
        };
        match &chosen {
            Some(content) => self.workspace.write_file(path, content)?,
            None => self.workspace.remove_file(path)?,
        }
        conflict.resolution = Some(resolution);

        self.with_lock(|| {
            self.merge_state.save(&state)?;
            self.audit.append(
                AuditOp::Resolve,
                serde_json::json!({ "path": path, "resolution": resolution }),
            )
        })?;

        if !state.is_fully_resolved() {
            return Ok(None);
        }
        self.complete_merge(&state).map(Some)
    }

    /// Build the merge-completion commit once every conflict is resolved.
    fn complete_merge(&self, state: &MergeState) -> Result<ObjectId> {
        if !state.is_fully_resolved() {
            return Err(Error::UnresolvedConflicts {
                remaining: state.unresolved().len(),
            });
        }

        let ours_tip = ObjectId::try_parse(state.ours_tip.clone())?;
        let theirs_tip = ObjectId::try_parse(state.theirs_tip.clone())?;

        // replan deterministically, then overlay the resolved content as it
        // now stands in the working tree
        let engine = MergeEngine::new(&self.database, &self.config);
        let MergeAnalysis::ThreeWay(plan) = engine.analyze(&ours_tip, &theirs_tip)? else {
            return Err(Error::invalid_argument("merge state no longer applies"));
        };

        let mut merged_files = plan.merged_files;
        for conflict in &state.conflicts {
            if self.workspace.exists(&conflict.path)? {
                merged_files.insert(
                    conflict.path.clone(),
                    self.workspace.read_file(&conflict.path)?,
                );
            } else {
                merged_files.remove(&conflict.path);
            }
        }

        let commit_oid = self.commit_merge_result(
            &merged_files,
            &ours_tip,
            &theirs_tip,
            &state.theirs_label,
            state.review_paths.clone(),
            false,
        )?;
        self.merge_state.clear()?;
        Ok(commit_oid)
    }

    /// The persisted merge state, when MERGING.
    pub fn merge_status(&self) -> Result<Option<MergeState>> {
        self.merge_state.load()
    }

    // --- remote ---

    /// Fetch a branch from a remote repository on the local filesystem.
    pub fn fetch(
        &self,
        url: &Path,
        remote_name: &str,
        branch: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<FetchOutcome> {
        let transport = FileTransport::new(url)?;
        self.fetch_with(&transport, remote_name, branch, cancel)
    }

    /// Fetch over an arbitrary transport.
    pub fn fetch_with(
        &self,
        transport: &dyn Transport,
        remote_name: &str,
        branch: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<FetchOutcome> {
        let branch = RefName::try_parse(branch)?;
        let sync = RemoteSync::new(&self.database, &self.refs, &self.trust, &self.mem_dir);
        sync.fetch(transport, remote_name, &branch, cancel)
    }

    /// Pull: fetch, then merge the remote-tracking branch into the current
    /// branch.
    pub fn pull(
        &self,
        url: &Path,
        remote_name: &str,
        branch: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<MergeOutcome> {
        let transport = FileTransport::new(url)?;
        self.pull_with(&transport, remote_name, branch, cancel)
    }

    /// Pull over an arbitrary transport.
    pub fn pull_with(
        &self,
        transport: &dyn Transport,
        remote_name: &str,
        branch: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<MergeOutcome> {
        let outcome = self.fetch_with(transport, remote_name, branch, cancel)?;

        let label = format!("{remote_name}/{branch}");
        let merged = self.merge_inner(
            outcome.tip.as_ref(),
            &label,
            outcome.conditional_trust,
        )?;

        self.audit.append(
            AuditOp::Pull,
            serde_json::json!({
                "remote": remote_name,
                "branch": branch,
                "tip": outcome.tip.as_ref(),
            }),
        )?;
        Ok(merged)
    }

    /// Push the current (or named) branch. Fast-forward only; a
    /// non-fast-forward push fails with `NonFastForward` and leaves the
    /// remote untouched.
    pub fn push(
        &self,
        url: &Path,
        branch: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PushOutcome> {
        let transport = FileTransport::new(url)?;
        self.push_with(&transport, branch, cancel)
    }

    /// Push over an arbitrary transport.
    pub fn push_with(
        &self,
        transport: &dyn Transport,
        branch: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PushOutcome> {
        let branch = RefName::try_parse(branch)?;
        let sync = RemoteSync::new(&self.database, &self.refs, &self.trust, &self.mem_dir);
        let outcome = sync.push(transport, &branch, cancel)?;

        self.audit.append(
            AuditOp::Push,
            serde_json::json!({ "branch": branch.as_ref() }),
        )?;
        Ok(outcome)
    }

    /// Clone a repository: initialize, copy the remote's published keys
    /// into the staging area (untrusted until promoted), fetch the branch,
    /// and check it out.
    pub fn clone_from(
        src_url: &Path,
        dest: &Path,
        branch: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Repository> {
        let transport = FileTransport::new(src_url)?;
        let repository = Repository::init(dest)?;

        // key propagation: remote keys start untrusted
        for (fingerprint, raw) in transport.published_keys()? {
            repository.keystore.stage_remote_key(&fingerprint, &raw)?;
            repository.trust.learn(&fingerprint, TrustLevel::Untrusted)?;
        }

        let outcome =
            repository.fetch_with(&transport, crate::artifacts::remote::DEFAULT_REMOTE, branch, cancel)?;

        let branch_name = RefName::try_parse(branch)?;
        repository.with_lock(|| {
            repository.refs.set_branch(&branch_name, &outcome.tip)?;
            repository.refs.set_head_branch(&branch_name)?;
            repository.refs.reflog_append(
                None,
                &outcome.tip,
                ReflogOp::Checkout,
                format!("clone from {}", src_url.display()),
            )?;
            repository.audit.append(
                AuditOp::Pull,
                serde_json::json!({
                    "clone": src_url.display().to_string(),
                    "branch": branch,
                    "tip": outcome.tip.as_ref(),
                }),
            )
        })?;

        // materialize the working tree
        let commit = repository.database.require_commit(&outcome.tip)?;
        let next = repository.tree_content(commit.tree_oid())?;
        repository.workspace.apply_tree(&BTreeMap::new(), &next)?;

        Ok(repository)
    }

    // --- maintenance ---

    /// Garbage collect unreachable loose objects; optionally repack.
    pub fn gc(&self, repack: bool, cancel: &Arc<AtomicBool>) -> Result<GcReport> {
        self.with_lock(|| {
            let report = run_gc(&self.database, &self.refs, &self.config, repack, cancel)?;
            self.audit.append(
                AuditOp::Gc,
                serde_json::json!({
                    "swept": report.swept,
                    "packed": report.packed,
                }),
            )?;
            Ok(report)
        })
    }

    /// End-to-end integrity verification.
    pub fn fsck(&self, cancel: &Arc<AtomicBool>) -> Result<FsckReport> {
        fsck(&self.database, &self.refs, &self.audit, &self.keystore, cancel)
    }

    /// Verify a commit's Merkle root and signature.
    pub fn verify_commit(&self, revision: &str) -> Result<()> {
        let commit_oid = self.resolve(revision)?;
        let commit = self.database.require_commit(&commit_oid)?;

        let Some(recorded_root) = &commit.metadata().merkle_root else {
            return Ok(()); // unsigned, nothing to verify
        };

        // leaves are recomputed from stored blob *content*, so a tampered
        // blob shows up as a root mismatch even though the tree still
        // records the original hash
        let mut leaves = Vec::new();
        for (path, (recorded_oid, _)) in self.database.flatten_tree(commit.tree_oid())? {
            let recomputed_oid = match self.database.get(&recorded_oid) {
                Ok((kind, payload)) => hash_payload(kind, &payload),
                Err(_) => tombstone_oid(), // unreadable leaf can never match
            };
            leaves.push((path, recomputed_oid));
        }
        let recomputed = merkle_root(&leaves);
        if &recomputed != recorded_root {
            return Err(Error::MerkleMismatch {
                commit: commit_oid.as_ref().to_string(),
            });
        }

        if let Some(signature) = &commit.metadata().signature {
            let key_id = commit.metadata().signing_key_id.as_ref().ok_or_else(|| {
                Error::SignatureInvalid {
                    commit: commit_oid.as_ref().to_string(),
                }
            })?;
            let key = self
                .keystore
                .verifying_key(key_id)?
                .ok_or_else(|| Error::UntrustedKey {
                    key_id: key_id.clone(),
                })?;
            verify_root_signature(&key, recorded_root, signature, commit_oid.as_ref())?;
        }

        Ok(())
    }

    /// Produce a Merkle membership proof for one path of a commit.
    pub fn prove_path(&self, revision: &str, path: &str) -> Result<MerkleProof> {
        let commit_oid = self.resolve(revision)?;
        let commit = self.database.require_commit(&commit_oid)?;
        let leaves = self.commit_leaves(&commit)?;

        let blob_oid = leaves
            .iter()
            .find(|(leaf_path, _)| leaf_path == path)
            .map(|(_, oid)| oid.clone())
            .ok_or_else(|| Error::not_found(format!("{path} in commit {commit_oid}")))?;

        merkle_proof(&leaves, path, &blob_oid)
            .ok_or_else(|| Error::not_found(format!("{path} in commit {commit_oid}")))
    }

    /// Verify a Merkle proof against a commit's recorded root.
    pub fn verify_path_proof(&self, revision: &str, proof: &MerkleProof) -> Result<bool> {
        let commit_oid = self.resolve(revision)?;
        let commit = self.database.require_commit(&commit_oid)?;
        let root = match &commit.metadata().merkle_root {
            Some(root) => root.clone(),
            None => merkle_root(&self.commit_leaves(&commit)?),
        };
        Ok(verify_proof(proof, &root))
    }

    // --- audit, trust, config ---

    pub fn audit_entries(&self, max_entries: usize) -> Result<Vec<AuditEntry>> {
        self.audit.read_recent(max_entries)
    }

    pub fn audit_verify(&self) -> Result<u64> {
        self.audit.verify()
    }

    /// Generate the repository's Ed25519 signing key pair.
    pub fn generate_signing_key(&self) -> Result<String> {
        let fingerprint = self.keystore.generate()?;
        self.trust.set(&fingerprint, TrustLevel::Full)?;
        Ok(fingerprint)
    }

    pub fn set_trust(&self, key_id: &str, level: TrustLevel) -> Result<()> {
        self.trust.set(key_id, level)
    }

    /// Set one configuration key and persist the file.
    pub fn config_set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut config = self.config.clone();
        config.set(key, value)?;
        config.save(&self.mem_dir.join("config"))?;
        self.audit.append(
            AuditOp::Config,
            serde_json::json!({ "key": key, "value": value }),
        )?;
        self.config = config;
        Ok(())
    }

    // --- helpers ---

    /// `(path, blob)` leaves of a commit's full tree.
    fn commit_leaves(&self, commit: &Commit) -> Result<Vec<(String, ObjectId)>> {
        Ok(self
            .database
            .flatten_tree(commit.tree_oid())?
            .into_iter()
            .map(|(path, (oid, _))| (path, oid))
            .collect())
    }

    /// HEAD's flat tree (`path → (blob, mode)`); empty for an unborn branch.
    fn head_flat_tree(&self) -> Result<BTreeMap<String, (ObjectId, EntryMode)>> {
        match self.refs.read_head()? {
            Some(head) => {
                let commit = self.database.require_commit(&head)?;
                self.database.flatten_tree(commit.tree_oid())
            }
            None => Ok(BTreeMap::new()),
        }
    }

    /// HEAD's flat tree as index entries (the tracked baseline).
    fn head_entries(&self) -> Result<BTreeMap<String, IndexEntry>> {
        Ok(self
            .head_flat_tree()?
            .into_iter()
            .map(|(path, (oid, mode))| {
                let entry = IndexEntry::new(path.clone(), oid, 0, Utc::now(), mode);
                (path, entry)
            })
            .collect())
    }

    /// Content of every tracked (HEAD) file.
    fn tracked_content(&self) -> Result<BTreeMap<String, Bytes>> {
        let mut content = BTreeMap::new();
        for (path, (oid, _)) in self.head_flat_tree()? {
            let blob = self
                .database
                .parse_object_as_blob(&oid)?
                .map(|blob| blob.content().clone())
                .unwrap_or_default();
            content.insert(path, blob);
        }
        Ok(content)
    }

    /// Content of every file in a tree.
    fn tree_content(&self, tree_oid: &ObjectId) -> Result<BTreeMap<String, Bytes>> {
        let mut content = BTreeMap::new();
        for (path, (oid, _)) in self.database.flatten_tree(tree_oid)? {
            let blob = self
                .database
                .parse_object_as_blob(&oid)?
                .map(|blob| blob.content().clone())
                .unwrap_or_default();
            content.insert(path, blob);
        }
        Ok(content)
    }

    fn read_optional_blob(&self, oid: Option<&str>) -> Result<Option<Bytes>> {
        match oid {
            Some(oid) => {
                let oid = ObjectId::try_parse(oid.to_string())?;
                Ok(self
                    .database
                    .parse_object_as_blob(&oid)?
                    .map(|blob| blob.content().clone()))
            }
            None => Ok(None),
        }
    }

    /// Memory class of a repo-relative path.
    pub fn classify(&self, path: &str) -> MemoryClass {
        MemoryClass::from_path(path)
    }
}

impl Repository {
    /// Enable encryption at rest: generate and persist the KDF salt.
    ///
    /// Takes effect when the repository is reopened with
    /// [`Repository::open_with_passphrase`]; objects written before that
    /// stay unencrypted until repacked.
    pub fn enable_encryption(&mut self) -> Result<()> {
        let salt = crate::artifacts::crypto::encryption::generate_salt();
        let mut config = self.config.clone();
        config.encryption.enabled = true;
        config.encryption.salt = Some(salt.iter().map(|b| format!("{b:02x}")).collect());
        config.save(&self.mem_dir.join("config"))?;
        self.audit.append(
            AuditOp::Config,
            serde_json::json!({ "key": "encryption.enabled", "value": "true" }),
        )?;
        self.config = config;
        Ok(())
    }
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidConfig {
            key: "encryption.salt".to_string(),
            reason: "malformed hex salt".to_string(),
        });
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| Error::InvalidConfig {
                key: "encryption.salt".to_string(),
                reason: "malformed hex salt".to_string(),
            })
        })
        .collect()
}
