//! End-to-end integrity checking
//!
//! `fsck` verifies, in order:
//!
//! 1. every loose and packed object rehashes to its name
//! 2. every commit's tree exists and every tree's blobs exist
//! 3. every ref resolves to an existing commit
//! 4. the audit chain verifies
//! 5. commits carrying a `merkle_root` recompute to the same root
//! 6. commits carrying a `signature` verify against a known public key
//!
//! Failures are collected, not short-circuited: each issue carries its
//! stable error kind and context (object hash, ref name, audit sequence).
//! The object-hash phase fans out across worker threads; cancellation is
//! checked between object boundaries and yields a partial report tagged
//! `cancelled`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::audit::AuditLog;
use crate::artifacts::crypto::merkle::merkle_root;
use crate::artifacts::crypto::signing::{KeyStore, verify_root_signature};
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};

/// One verification failure with its context.
#[derive(Debug)]
pub struct FsckIssue {
    pub error: Error,
    pub context: String,
}

/// Collected verification results.
#[derive(Debug, Default)]
pub struct FsckReport {
    pub issues: Vec<FsckIssue>,
    pub checked_objects: usize,
    pub checked_commits: usize,
    /// Set when the scan stopped early on a cancellation signal
    pub cancelled: bool,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && !self.cancelled
    }

    fn push(&mut self, error: Error, context: impl Into<String>) {
        self.issues.push(FsckIssue {
            error,
            context: context.into(),
        });
    }
}

/// Run the full integrity check.
pub fn fsck(
    database: &Database,
    refs: &Refs,
    audit: &AuditLog,
    keystore: &KeyStore,
    cancel: &Arc<AtomicBool>,
) -> Result<FsckReport> {
    let mut report = FsckReport::default();

    // (a) object hashes, fanned out over worker threads
    let mut objects = database.iter_loose()?;
    objects.extend(database.packed_object_ids()?);
    objects.sort();
    objects.dedup();
    report.checked_objects = objects.len();

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let chunk_size = objects.len().div_ceil(workers).max(1);

    let issue_lists: Vec<Vec<FsckIssue>> = std::thread::scope(|scope| {
        let handles: Vec<_> = objects
            .chunks(chunk_size)
            .map(|chunk| {
                let cancel = Arc::clone(cancel);
                scope.spawn(move || {
                    let mut issues = Vec::new();
                    for oid in chunk {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(error) = database.verify_object(oid) {
                            issues.push(FsckIssue {
                                error,
                                context: format!("object {oid}"),
                            });
                        }
                    }
                    issues
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_default())
            .collect()
    });
    for issues in issue_lists {
        report.issues.extend(issues);
    }

    if cancel.load(Ordering::Relaxed) {
        report.cancelled = true;
        return Ok(report);
    }

    // (c) every ref resolves; collect tips for the graph walk
    let mut tips = Vec::new();
    for (name, oid) in refs.all_refs()? {
        if !database.exists(&oid) {
            report.push(
                Error::not_found(format!("commit {oid}")),
                format!("ref {name}"),
            );
        } else {
            tips.push(oid);
        }
    }
    if let Some(head) = refs.read_head()? {
        if !database.exists(&head) {
            report.push(Error::not_found(format!("commit {head}")), "ref HEAD");
        } else {
            tips.push(head);
        }
    }

    // (b), (e), (f) walk every commit reachable from any tip
    let mut visited: HashSet<ObjectId> = HashSet::new();
    for tip in tips {
        for step in RevList::new(database, tip) {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                return Ok(report);
            }

            let (commit_oid, commit) = match step {
                Ok(found) => found,
                Err(error) => {
                    report.push(error, "commit walk");
                    break;
                }
            };
            if !visited.insert(commit_oid.clone()) {
                continue;
            }
            report.checked_commits += 1;

            // (b) tree closure exists
            let flat = match database.flatten_tree(commit.tree_oid()) {
                Ok(flat) => flat,
                Err(error) => {
                    report.push(error, format!("tree of commit {commit_oid}"));
                    continue;
                }
            };
            for (path, (blob_oid, _)) in &flat {
                if !database.exists(blob_oid) {
                    report.push(
                        Error::not_found(format!("blob {blob_oid}")),
                        format!("{path} in commit {commit_oid}"),
                    );
                }
            }

            // (e) merkle root recomputes
            if let Some(recorded_root) = &commit.metadata().merkle_root {
                let leaves: Vec<(String, ObjectId)> = flat
                    .iter()
                    .map(|(path, (oid, _))| (path.clone(), oid.clone()))
                    .collect();
                let recomputed = merkle_root(&leaves);
                if &recomputed != recorded_root {
                    report.push(
                        Error::MerkleMismatch {
                            commit: commit_oid.as_ref().to_string(),
                        },
                        format!("commit {commit_oid}"),
                    );
                }
            }

            // (f) signature verifies against a known key
            if let (Some(signature), Some(root)) = (
                &commit.metadata().signature,
                &commit.metadata().merkle_root,
            ) {
                let Some(key_id) = &commit.metadata().signing_key_id else {
                    report.push(
                        Error::SignatureInvalid {
                            commit: commit_oid.as_ref().to_string(),
                        },
                        format!("commit {commit_oid} lacks a signing key id"),
                    );
                    continue;
                };
                match keystore.verifying_key(key_id)? {
                    Some(key) => {
                        if let Err(error) =
                            verify_root_signature(&key, root, signature, commit_oid.as_ref())
                        {
                            report.push(error, format!("commit {commit_oid}"));
                        }
                    }
                    None => report.push(
                        Error::UntrustedKey {
                            key_id: key_id.clone(),
                        },
                        format!("commit {commit_oid} signed by unknown key"),
                    ),
                }
            }
        }
    }

    // (d) audit chain
    if let Err(error) = audit.verify() {
        let context = match &error {
            Error::AuditCorrupt { seq } => format!("audit entry {seq}"),
            _ => "audit log".to_string(),
        };
        report.push(error, context);
    }

    info!(
        objects = report.checked_objects,
        commits = report.checked_commits,
        issues = report.issues.len(),
        "fsck complete"
    );
    Ok(report)
}
