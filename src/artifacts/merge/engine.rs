//! Memory-type-aware merge engine
//!
//! Three-way merge with the lowest common ancestor as base. Two identical
//! tips are a no-op; an ancestor tip fast-forwards. Otherwise every path
//! that differs on either side is merged with the strategy of its memory
//! class:
//!
//! - **EPISODIC** — chronological append: both contributions are kept, the
//!   appended lines of each side are merged in timestamp order (ISO-8601
//!   line prefix, commit timestamp as fallback). Never conflicts.
//! - **SEMANTIC** — line-level three-way merge; overlapping edits emit
//!   conflict regions with the literal `<<<<<<< ours` markers.
//! - **PROCEDURAL** — prefer the side whose commit timestamp is newer and
//!   flag the path for manual review in the commit metadata. Ties break by
//!   committer id, then by commit hash.
//! - **OTHER** — treated as SEMANTIC.
//!
//! Histories without a shared ancestor are reported as diverged but still
//! merged against the empty tree.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::areas::database::{CommitCache, Database};
use crate::artifacts::config::Config;
use crate::artifacts::memory::MemoryClass;
use crate::artifacts::merge::diff3;
use crate::artifacts::merge::lca_finder::LcaFinder;
use crate::artifacts::merge::state::ConflictRecord;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::log::rev_list::RevList;
use crate::errors::Result;

/// ISO-8601 timestamp at the start of an episodic line.
const LINE_TIMESTAMP_REGEX: &str =
    r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?)";

/// What a merge of two tips amounts to.
#[derive(Debug)]
pub enum MergeAnalysis {
    /// Tips are equal, or theirs is already contained in ours
    AlreadyUpToDate,
    /// Ours is an ancestor of theirs: advance the pointer, no new commit
    FastForward(ObjectId),
    /// Real three-way merge
    ThreeWay(MergePlan),
}

/// A computed three-way merge, ready to be materialized.
#[derive(Debug)]
pub struct MergePlan {
    /// Merge base; `None` means the histories diverged and the empty tree
    /// was used
    pub base: Option<ObjectId>,
    /// Resulting working-tree content, conflict markers included
    pub merged_files: BTreeMap<String, Bytes>,
    pub conflicts: Vec<ConflictRecord>,
    /// Paths the procedural strategy flagged for manual review
    pub review_paths: Vec<String>,
}

/// Per-side inputs to a single-path merge.
struct SideContext<'c> {
    commit: &'c Commit,
    oid: Option<ObjectId>,
}

/// Merge engine over the object store and repo config.
pub struct MergeEngine<'db> {
    database: &'db Database,
    config: &'db Config,
}

impl<'db> MergeEngine<'db> {
    pub fn new(database: &'db Database, config: &'db Config) -> Self {
        MergeEngine { database, config }
    }

    /// Analyze a merge of `theirs` into `ours`.
    pub fn analyze(&self, ours: &ObjectId, theirs: &ObjectId) -> Result<MergeAnalysis> {
        if ours == theirs {
            return Ok(MergeAnalysis::AlreadyUpToDate);
        }
        if RevList::is_ancestor(self.database, theirs, ours)? {
            return Ok(MergeAnalysis::AlreadyUpToDate);
        }
        if RevList::is_ancestor(self.database, ours, theirs)? {
            return Ok(MergeAnalysis::FastForward(theirs.clone()));
        }

        let mut cache = CommitCache::new();
        let base = {
            let mut finder = LcaFinder::new(|oid: &ObjectId| cache.get_or_load(self.database, oid));
            finder.find(ours, theirs)?
        };
        if base.is_none() {
            info!(%ours, %theirs, "histories diverged, merging against the empty tree");
        }

        let plan = self.plan(ours, theirs, base)?;
        Ok(MergeAnalysis::ThreeWay(plan))
    }

    fn plan(
        &self,
        ours_tip: &ObjectId,
        theirs_tip: &ObjectId,
        base: Option<ObjectId>,
    ) -> Result<MergePlan> {
        let ours_commit = self.database.require_commit(ours_tip)?;
        let theirs_commit = self.database.require_commit(theirs_tip)?;

        let base_flat = match &base {
            Some(base_oid) => {
                let base_commit = self.database.require_commit(base_oid)?;
                self.database.flatten_tree(base_commit.tree_oid())?
            }
            None => BTreeMap::new(),
        };
        let ours_flat = self.database.flatten_tree(ours_commit.tree_oid())?;
        let theirs_flat = self.database.flatten_tree(theirs_commit.tree_oid())?;

        let mut paths: BTreeSet<&String> = BTreeSet::new();
        paths.extend(base_flat.keys());
        paths.extend(ours_flat.keys());
        paths.extend(theirs_flat.keys());

        let mut merged_files = BTreeMap::new();
        let mut conflicts = Vec::new();
        let mut review_paths = Vec::new();

        for path in paths {
            let base_oid = base_flat.get(path).map(|(oid, _)| oid.clone());
            let ours_oid = ours_flat.get(path).map(|(oid, _)| oid.clone());
            let theirs_oid = theirs_flat.get(path).map(|(oid, _)| oid.clone());

            // trivial cases need no strategy
            let trivially_resolved = if ours_oid == theirs_oid {
                ours_oid.clone()
            } else if theirs_oid == base_oid {
                ours_oid.clone()
            } else if ours_oid == base_oid {
                theirs_oid.clone()
            } else {
                // both sides changed the path; dispatch on memory class
                let outcome = self.merge_path(
                    path,
                    base_oid.as_ref(),
                    SideContext {
                        commit: &ours_commit,
                        oid: ours_oid.clone(),
                    },
                    SideContext {
                        commit: &theirs_commit,
                        oid: theirs_oid.clone(),
                    },
                    ours_tip,
                    theirs_tip,
                )?;

                if let Some(conflict) = outcome.conflict {
                    conflicts.push(conflict);
                }
                if outcome.needs_review {
                    review_paths.push(path.clone());
                }
                if let Some(content) = outcome.content {
                    merged_files.insert(path.clone(), content);
                }
                continue;
            };

            if let Some(oid) = trivially_resolved {
                let blob = self.read_blob(&oid)?;
                merged_files.insert(path.clone(), blob);
            }
        }

        debug!(
            files = merged_files.len(),
            conflicts = conflicts.len(),
            review = review_paths.len(),
            "three-way merge planned"
        );

        Ok(MergePlan {
            base,
            merged_files,
            conflicts,
            review_paths,
        })
    }

    fn read_blob(&self, oid: &ObjectId) -> Result<Bytes> {
        Ok(self
            .database
            .parse_object_as_blob(oid)?
            .map(|blob| blob.content().clone())
            .unwrap_or_default())
    }

    fn read_side(&self, oid: Option<&ObjectId>) -> Result<String> {
        match oid {
            Some(oid) => {
                let blob = self.read_blob(oid)?;
                Ok(String::from_utf8_lossy(&blob).into_owned())
            }
            None => Ok(String::new()),
        }
    }

    fn merge_path(
        &self,
        path: &str,
        base_oid: Option<&ObjectId>,
        ours: SideContext<'_>,
        theirs: SideContext<'_>,
        ours_tip: &ObjectId,
        theirs_tip: &ObjectId,
    ) -> Result<PathOutcome> {
        let class = MemoryClass::from_path(path);
        let strategy = self.config.merge_strategy_for(class);

        let base_text = self.read_side(base_oid)?;
        let ours_text = self.read_side(ours.oid.as_ref())?;
        let theirs_text = self.read_side(theirs.oid.as_ref())?;

        match strategy {
            "episodic" => Ok(PathOutcome::clean(merge_episodic(
                &base_text,
                &ours_text,
                ours.commit.timestamp(),
                &theirs_text,
                theirs.commit.timestamp(),
            ))),
            "procedural" => {
                // prefer the newer commit; ties break by committer id, then
                // by commit hash
                let ours_key = (
                    ours.commit.timestamp(),
                    ours.commit.committer().email().to_string(),
                    ours_tip.clone(),
                );
                let theirs_key = (
                    theirs.commit.timestamp(),
                    theirs.commit.committer().email().to_string(),
                    theirs_tip.clone(),
                );

                let winner = if ours_key >= theirs_key {
                    &ours_text
                } else {
                    &theirs_text
                };
                let winner_present = if ours_key >= theirs_key {
                    ours.oid.is_some()
                } else {
                    theirs.oid.is_some()
                };

                Ok(PathOutcome {
                    content: winner_present.then(|| Bytes::from(winner.clone())),
                    conflict: None,
                    needs_review: true,
                })
            }
            // "semantic", which OTHER also maps to
            _ => {
                let result = diff3::merge(&base_text, &ours_text, &theirs_text);
                let conflict = result.had_conflicts.then(|| ConflictRecord {
                    path: path.to_string(),
                    ours: ours.oid.as_ref().map(|oid| oid.as_ref().to_string()),
                    theirs: theirs.oid.as_ref().map(|oid| oid.as_ref().to_string()),
                    base: base_oid.map(|oid| oid.as_ref().to_string()),
                    strategy: strategy.to_string(),
                    resolution: None,
                });

                Ok(PathOutcome {
                    content: Some(Bytes::from(result.content)),
                    conflict,
                    needs_review: false,
                })
            }
        }
    }
}

struct PathOutcome {
    content: Option<Bytes>,
    conflict: Option<ConflictRecord>,
    needs_review: bool,
}

impl PathOutcome {
    fn clean(content: String) -> Self {
        PathOutcome {
            content: Some(Bytes::from(content)),
            conflict: None,
            needs_review: false,
        }
    }
}

/// Chronological append merge for episodic logs.
///
/// Both branches contributed new lines; the merged file is the common
/// prefix followed by the union of both sides' appended lines in timestamp
/// order. Lines without a leading ISO-8601 timestamp sort by their side's
/// commit timestamp. Never raises a conflict.
pub fn merge_episodic(
    base: &str,
    ours: &str,
    ours_fallback: DateTime<Utc>,
    theirs: &str,
    theirs_fallback: DateTime<Utc>,
) -> String {
    let base_lines: Vec<&str> = base.lines().collect();
    let ours_lines: Vec<&str> = ours.lines().collect();
    let theirs_lines: Vec<&str> = theirs.lines().collect();

    // the base is the natural prefix when both sides only appended;
    // otherwise fall back to the literal common prefix of the two sides
    let prefix_len = if starts_with(&ours_lines, &base_lines)
        && starts_with(&theirs_lines, &base_lines)
    {
        base_lines.len()
    } else {
        common_prefix_len(&ours_lines, &theirs_lines)
    };

    let timestamp_regex = Regex::new(LINE_TIMESTAMP_REGEX).ok();
    let key_of = |line: &str, fallback: DateTime<Utc>| -> DateTime<Utc> {
        timestamp_regex
            .as_ref()
            .and_then(|regex| regex.captures(line))
            .and_then(|captures| captures.get(1))
            .and_then(|ts| DateTime::parse_from_rfc3339(ts.as_str()).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or(fallback)
    };

    let mut appended: Vec<(DateTime<Utc>, &str)> = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for line in &ours_lines[prefix_len.min(ours_lines.len())..] {
        if seen.insert(line) {
            appended.push((key_of(line, ours_fallback), line));
        }
    }
    for line in &theirs_lines[prefix_len.min(theirs_lines.len())..] {
        if seen.insert(line) {
            appended.push((key_of(line, theirs_fallback), line));
        }
    }
    appended.sort_by_key(|(timestamp, _)| *timestamp);

    let mut out: Vec<&str> = ours_lines[..prefix_len.min(ours_lines.len())].to_vec();
    out.extend(appended.iter().map(|(_, line)| *line));

    let mut content = out.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    content
}

fn starts_with(lines: &[&str], prefix: &[&str]) -> bool {
    lines.len() >= prefix.len() && &lines[..prefix.len()] == prefix
}

fn common_prefix_len(a: &[&str], b: &[&str]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
