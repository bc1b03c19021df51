//! Fetch and push over a transport
//!
//! Fetch walks the remote commit graph from the wanted tip, streaming every
//! object the local store lacks into a quarantine directory. Only after the
//! whole closure arrived, verified, and passed the trust gate are the
//! objects promoted into the store and the remote-tracking ref updated. A
//! commit signed by an untrusted (or unknown) key leaves everything in
//! quarantine and advances nothing.
//!
//! Push is fast-forward only: the remote tip must be an ancestor of the
//! local tip, and the final compare-and-set re-checks the expected tip so a
//! concurrent push loses cleanly with `NonFastForward`.

use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Unpackable, hash_payload};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::remote::transport::Transport;
use crate::artifacts::trust::{TrustLevel, TrustStore};
use crate::errors::{Error, Result};

/// Result of a fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub branch: RefName,
    pub tip: ObjectId,
    pub fetched_objects: usize,
    /// The tip is signed by a conditionally trusted key; the merge commit
    /// should be flagged for review
    pub conditional_trust: bool,
}

/// Result of a push.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Remote already had our tip
    UpToDate,
    /// Remote advanced to our tip
    Advanced { pushed_objects: usize },
}

/// Quarantine area for objects that have not been promoted yet.
#[derive(Debug)]
struct Quarantine {
    dir: PathBuf,
}

impl Quarantine {
    fn create(mem_dir: &Path) -> Result<Self> {
        let dir = mem_dir
            .join("quarantine")
            .join(format!("fetch-{}", rand::random::<u32>()));
        std::fs::create_dir_all(&dir)?;
        Ok(Quarantine { dir })
    }

    fn write(&self, oid: &ObjectId, canonical: &[u8]) -> Result<()> {
        std::fs::write(self.dir.join(oid.as_ref()), canonical)?;
        Ok(())
    }

    fn read(&self, oid: &ObjectId) -> Result<Bytes> {
        Ok(Bytes::from(std::fs::read(self.dir.join(oid.as_ref()))?))
    }

    fn discard(self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Remote synchronization over the local repository state.
pub struct RemoteSync<'repo> {
    database: &'repo Database,
    refs: &'repo Refs,
    trust: &'repo TrustStore,
    mem_dir: &'repo Path,
}

impl<'repo> RemoteSync<'repo> {
    pub fn new(
        database: &'repo Database,
        refs: &'repo Refs,
        trust: &'repo TrustStore,
        mem_dir: &'repo Path,
    ) -> Self {
        RemoteSync {
            database,
            refs,
            trust,
            mem_dir,
        }
    }

    /// Fetch one branch from a remote.
    ///
    /// # Arguments
    ///
    /// * `transport` - the remote endpoint
    /// * `remote_name` - name for the remote-tracking ref
    /// * `branch` - branch to fetch
    /// * `cancel` - checked between objects; quarantine is discarded on
    ///   cancellation
    pub fn fetch(
        &self,
        transport: &dyn Transport,
        remote_name: &str,
        branch: &RefName,
        cancel: &Arc<AtomicBool>,
    ) -> Result<FetchOutcome> {
        let remote_refs = transport.list_refs()?;
        let tip = remote_refs
            .get(&format!("refs/heads/{branch}"))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("remote branch {branch}")))?;

        let quarantine = Quarantine::create(self.mem_dir)?;
        let fetched = match self.stream_closure(transport, &tip, &quarantine, cancel) {
            Ok(fetched) => fetched,
            Err(err) => {
                quarantine.discard();
                return Err(err);
            }
        };

        // trust gate on the tip commit's signing key
        let tip_commit = self.load_commit(&tip, &quarantine)?;
        let conditional_trust = match self.gate_trust(&tip_commit) {
            Ok(conditional) => conditional,
            Err(err) => {
                // objects stay quarantined; no ref advances
                warn!(tip = %tip, "fetch blocked by trust policy");
                return Err(err);
            }
        };

        // promote into the object store, then update the tracking ref
        for oid in &fetched {
            let canonical = quarantine.read(oid)?;
            self.database.put_canonical(oid, &canonical)?;
        }
        quarantine.discard();
        self.refs.set_remote_branch(remote_name, branch, &tip)?;

        info!(
            remote = remote_name,
            branch = %branch,
            objects = fetched.len(),
            "fetch complete"
        );

        Ok(FetchOutcome {
            branch: branch.clone(),
            tip,
            fetched_objects: fetched.len(),
            conditional_trust,
        })
    }

    /// Push one branch to a remote. Fast-forward only.
    pub fn push(
        &self,
        transport: &dyn Transport,
        branch: &RefName,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PushOutcome> {
        let local_tip = self
            .refs
            .read_branch(branch)?
            .ok_or_else(|| Error::not_found(format!("branch {branch}")))?;

        let remote_refs = transport.list_refs()?;
        let remote_tip = remote_refs.get(&format!("refs/heads/{branch}")).cloned();

        if let Some(remote_tip) = &remote_tip {
            if remote_tip == &local_tip {
                return Ok(PushOutcome::UpToDate);
            }
            // the expected parent must be an ancestor of what we are
            // pushing; a remote tip we do not even have locally means the
            // remote moved ahead of us
            if !self.database.exists(remote_tip)
                || !RevList::is_ancestor(self.database, remote_tip, &local_tip)?
            {
                return Err(Error::NonFastForward {
                    branch: branch.as_ref().to_string(),
                });
            }
        }

        // objects the remote is missing: everything reachable from our tip
        // minus what the remote tip already covers
        let already_remote = match &remote_tip {
            Some(remote_tip) => RevList::reachable_commits(self.database, remote_tip)?,
            None => HashSet::new(),
        };

        let mut pushed = 0usize;
        for step in RevList::new(self.database, local_tip.clone()) {
            let (commit_oid, _) = step?;
            if already_remote.contains(&commit_oid) {
                continue;
            }
            for oid in self.database.collect_commit_objects(&commit_oid)? {
                if cancel.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
                if !transport.has_object(&oid)? {
                    transport.write_object(&oid, &self.database.get_canonical(&oid)?)?;
                    pushed += 1;
                }
            }
        }

        transport.cas_update_ref(
            &format!("refs/heads/{branch}"),
            remote_tip.as_ref(),
            &local_tip,
        )?;

        info!(branch = %branch, objects = pushed, "push complete");
        Ok(PushOutcome::Advanced {
            pushed_objects: pushed,
        })
    }

    /// Stream the object closure of `tip` that the local store lacks into
    /// quarantine. Returns the fetched object ids.
    fn stream_closure(
        &self,
        transport: &dyn Transport,
        tip: &ObjectId,
        quarantine: &Quarantine,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<ObjectId>> {
        let mut fetched: Vec<ObjectId> = Vec::new();
        let mut fetched_set: HashSet<ObjectId> = HashSet::new();
        let mut commits = VecDeque::from([tip.clone()]);
        let mut seen_commits: HashSet<ObjectId> = HashSet::new();

        while let Some(commit_oid) = commits.pop_front() {
            if !seen_commits.insert(commit_oid.clone()) {
                continue;
            }
            // local history is already complete below a known commit
            if self.database.exists(&commit_oid) {
                continue;
            }
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }

            let canonical = transport.read_object(&commit_oid)?;
            let (kind, payload) = parse_canonical(&commit_oid, &canonical)?;
            if kind != ObjectType::Commit {
                return Err(Error::ObjectCorrupt {
                    object: commit_oid.as_ref().to_string(),
                    reason: format!("expected commit, found {kind}"),
                });
            }
            quarantine.write(&commit_oid, &canonical)?;
            fetched_set.insert(commit_oid.clone());
            fetched.push(commit_oid.clone());

            let commit = Commit::deserialize(Cursor::new(payload))?;
            self.stream_tree(
                transport,
                commit.tree_oid(),
                quarantine,
                &mut fetched,
                &mut fetched_set,
                cancel,
            )?;
            for parent in commit.parents() {
                commits.push_back(parent.clone());
            }
        }

        debug!(objects = fetched.len(), "streamed fetch closure");
        Ok(fetched)
    }

    fn stream_tree(
        &self,
        transport: &dyn Transport,
        tree_oid: &ObjectId,
        quarantine: &Quarantine,
        fetched: &mut Vec<ObjectId>,
        fetched_set: &mut HashSet<ObjectId>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        let mut worklist = VecDeque::from([tree_oid.clone()]);

        while let Some(oid) = worklist.pop_front() {
            if fetched_set.contains(&oid) || self.database.exists(&oid) {
                continue;
            }
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }

            let canonical = transport.read_object(&oid)?;
            let (kind, payload) = parse_canonical(&oid, &canonical)?;
            quarantine.write(&oid, &canonical)?;
            fetched_set.insert(oid.clone());
            fetched.push(oid.clone());

            if kind == ObjectType::Tree {
                let tree = Tree::deserialize(Cursor::new(payload))?;
                for (_, entry) in tree.entries() {
                    if entry.mode == EntryMode::Directory {
                        worklist.push_back(entry.oid.clone());
                    } else if !fetched_set.contains(&entry.oid) && !self.database.exists(&entry.oid)
                    {
                        worklist.push_back(entry.oid.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Load a commit from the local store or the quarantine.
    fn load_commit(&self, oid: &ObjectId, quarantine: &Quarantine) -> Result<Commit> {
        if self.database.exists(oid) {
            return self.database.require_commit(oid);
        }
        let canonical = quarantine.read(oid)?;
        let (kind, payload) = parse_canonical(oid, &canonical)?;
        if kind != ObjectType::Commit {
            return Err(Error::ObjectCorrupt {
                object: oid.as_ref().to_string(),
                reason: format!("expected commit, found {kind}"),
            });
        }
        Commit::deserialize(Cursor::new(payload))
    }

    /// Apply the trust policy to a fetched tip commit.
    ///
    /// # Returns
    ///
    /// Whether the commit should be flagged as conditionally trusted.
    fn gate_trust(&self, commit: &Commit) -> Result<bool> {
        let Some(key_id) = &commit.metadata().signing_key_id else {
            return Ok(false); // unsigned commits are not gated
        };

        match self.trust.effective_level(key_id)? {
            TrustLevel::Full => Ok(false),
            TrustLevel::Conditional => Ok(true),
            TrustLevel::Untrusted => Err(Error::UntrustedKey {
                key_id: key_id.clone(),
            }),
        }
    }
}

/// Split canonical bytes into kind + payload, verifying the hash.
fn parse_canonical(expected: &ObjectId, canonical: &[u8]) -> Result<(ObjectType, Bytes)> {
    let mut reader = Cursor::new(canonical);
    let kind = ObjectType::parse_object_type(&mut reader)?;
    let payload = Bytes::copy_from_slice(&canonical[reader.position() as usize..]);

    let actual = hash_payload(kind, &payload);
    if &actual != expected {
        return Err(Error::HashMismatch {
            object: expected.as_ref().to_string(),
        });
    }
    Ok((kind, payload))
}
