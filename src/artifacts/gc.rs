//! Garbage collection and reachability
//!
//! Mark-and-sweep over loose objects. The mark phase walks everything
//! reachable from HEAD, all branch tips, all tag targets, and every reflog
//! entry newer than `gc.prune_days`. The sweep phase deletes unmarked loose
//! objects; it aborts before the first delete when cancellation is
//! requested. An optional repack feeds all reachable loose objects through
//! the pack codec, seeding delta candidates from the similarity matcher.
//!
//! Safe under concurrent readers: loose objects are immutable and only
//! unreachable ones are removed; writers are excluded by the repository
//! write lock held by the caller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::config::Config;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::writer::{PackInput, PackWriter};
use crate::artifacts::similarity::SimilarityMatcher;
use crate::errors::{Error, Result};

/// Outcome of a GC run.
#[derive(Debug, Default)]
pub struct GcReport {
    pub marked: usize,
    pub swept: usize,
    pub packed: usize,
    pub pack_deltas: usize,
}

/// Run mark-and-sweep, optionally repacking reachable loose objects.
///
/// # Arguments
///
/// * `repack` - also write reachable loose objects into a pack
/// * `cancel` - checked between object boundaries; the sweep is aborted
///   before any delete happens
pub fn run_gc(
    database: &Database,
    refs: &Refs,
    config: &Config,
    repack: bool,
    cancel: &Arc<AtomicBool>,
) -> Result<GcReport> {
    let marked = mark(database, refs, config, cancel)?;
    let mut report = GcReport {
        marked: marked.len(),
        ..GcReport::default()
    };

    // sweep: abort before any delete on cancellation
    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }
    let loose = database.iter_loose()?;
    for oid in &loose {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        if !marked.contains(oid) {
            database.remove_loose(oid)?;
            report.swept += 1;
        }
    }

    if repack {
        let (packed, deltas) = repack_reachable(database, config, &marked, cancel)?;
        report.packed = packed;
        report.pack_deltas = deltas;
    }

    info!(
        marked = report.marked,
        swept = report.swept,
        packed = report.packed,
        "gc complete"
    );
    Ok(report)
}

/// Mark phase: everything reachable from refs, HEAD, and the recent reflog.
fn mark(
    database: &Database,
    refs: &Refs,
    config: &Config,
    cancel: &Arc<AtomicBool>,
) -> Result<HashSet<ObjectId>> {
    let mut roots: HashSet<ObjectId> = HashSet::new();

    if let Some(head) = refs.read_head()? {
        roots.insert(head);
    }
    for branch in refs.list_branches()? {
        if let Some(tip) = refs.read_branch(&branch)? {
            roots.insert(tip);
        }
    }
    for tag in refs.list_tags()? {
        if let Some(target) = refs.read_tag(&tag)? {
            roots.insert(target);
        }
    }

    // reflog entries within the prune window are roots too
    let cutoff = Utc::now() - Duration::days(config.gc.prune_days as i64);
    for entry in refs.reflog_entries()? {
        if entry.timestamp >= cutoff
            && let Ok(oid) = ObjectId::try_parse(entry.new.clone())
        {
            roots.insert(oid);
        }
    }

    let mut marked: HashSet<ObjectId> = HashSet::new();
    for root in roots {
        // roots recorded before a history rewrite may already be gone
        if !database.exists(&root) {
            continue;
        }
        for step in RevList::new(database, root) {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            let (commit_oid, _) = step?;
            if marked.contains(&commit_oid) {
                continue;
            }
            marked.extend(database.collect_commit_objects(&commit_oid)?);
        }
    }

    debug!(marked = marked.len(), "mark phase complete");
    Ok(marked)
}

/// Repack all reachable loose objects into a single new pack.
fn repack_reachable(
    database: &Database,
    config: &Config,
    marked: &HashSet<ObjectId>,
    cancel: &Arc<AtomicBool>,
) -> Result<(usize, usize)> {
    let loose: Vec<ObjectId> = database
        .iter_loose()?
        .into_iter()
        .filter(|oid| marked.contains(oid))
        .collect();
    if loose.is_empty() {
        return Ok((0, 0));
    }

    let mut inputs = Vec::with_capacity(loose.len());
    let mut payloads = HashMap::new();
    for oid in &loose {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        let (kind, payload) = database.get(oid)?;
        payloads.insert(oid.clone(), payload.clone());
        inputs.push(PackInput {
            oid: oid.clone(),
            kind,
            payload,
        });
    }

    // similarity groups seed the delta candidates
    let delta_bases = if config.pack.delta.enabled {
        let matcher = SimilarityMatcher::new(config.similarity.clone());
        let pairs = matcher.find_similar_pairs(&payloads, cancel)?;
        matcher.select_delta_bases(&payloads, &pairs)
    } else {
        HashMap::new()
    };

    let writer = PackWriter::new(config.pack.delta.enabled, config.pack.delta.max_chain);
    let written = writer.write(&database.pack_path(), &inputs, &delta_bases)?;
    database.refresh_packs();

    // packed loose objects are now redundant
    for oid in &loose {
        if cancel.load(Ordering::Relaxed) {
            // pack is complete and registered; stopping mid-cleanup is safe
            return Err(Error::Cancelled);
        }
        database.remove_loose(oid)?;
    }

    Ok((inputs.len(), written.delta_count))
}
