//! Lowest common ancestor finder
//!
//! Runs a parallel breadth-first search over the parent DAG from both
//! commit tips, marking every commit with the side(s) that reached it. The
//! first commits reached from both sides are the shared-ancestor
//! candidates; on ties (criss-cross histories produce several) the deepest
//! — most recent by timestamp — candidate wins, with the larger hash as
//! the final tie-break.
//!
//! Traversal is iterative with explicit frontiers, so arbitrarily deep
//! histories cannot overflow the stack. The loader is generic over how
//! slim commits are produced, which keeps the finder testable against an
//! in-memory graph.

use std::collections::{HashMap, VecDeque};

use bitflags::bitflags;

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct VisitState: u8 {
        const FROM_OURS = 0b01;
        const FROM_THEIRS = 0b10;
        const FROM_BOTH = Self::FROM_OURS.bits() | Self::FROM_THEIRS.bits();
    }
}

/// Lowest common ancestor finder.
///
/// # Type Parameters
///
/// * `Loader` - produces a [`SlimCommit`] for any commit id; typically a
///   closure over a [`crate::areas::database::CommitCache`]
pub struct LcaFinder<Loader>
where
    Loader: FnMut(&ObjectId) -> Result<SlimCommit>,
{
    loader: Loader,
}

impl<Loader> LcaFinder<Loader>
where
    Loader: FnMut(&ObjectId) -> Result<SlimCommit>,
{
    pub fn new(loader: Loader) -> Self {
        LcaFinder { loader }
    }

    /// Find the lowest common ancestor of two commits.
    ///
    /// # Returns
    ///
    /// - `Some(oid)` - the deepest shared ancestor
    /// - `None` - the histories share no commit (diverged roots)
    pub fn find(&mut self, ours: &ObjectId, theirs: &ObjectId) -> Result<Option<ObjectId>> {
        if ours == theirs {
            return Ok(Some(ours.clone()));
        }

        let mut states: HashMap<ObjectId, VisitState> = HashMap::new();
        let mut ours_frontier = VecDeque::from([ours.clone()]);
        let mut theirs_frontier = VecDeque::from([theirs.clone()]);
        states.insert(ours.clone(), VisitState::FROM_OURS);
        states.insert(theirs.clone(), VisitState::FROM_THEIRS);

        let mut candidates: Vec<SlimCommit> = Vec::new();

        // advance both BFS frontiers one level per round until a shared
        // commit appears (or both sides are exhausted)
        while !ours_frontier.is_empty() || !theirs_frontier.is_empty() {
            self.expand_level(&mut ours_frontier, VisitState::FROM_OURS, &mut states, &mut candidates)?;
            self.expand_level(
                &mut theirs_frontier,
                VisitState::FROM_THEIRS,
                &mut states,
                &mut candidates,
            )?;

            if !candidates.is_empty() {
                break;
            }
        }

        // deepest = most recent timestamp; ObjectId orders the final tie
        candidates.sort();
        Ok(candidates.pop().map(|slim| slim.oid))
    }

    fn expand_level(
        &mut self,
        frontier: &mut VecDeque<ObjectId>,
        side: VisitState,
        states: &mut HashMap<ObjectId, VisitState>,
        candidates: &mut Vec<SlimCommit>,
    ) -> Result<()> {
        for _ in 0..frontier.len() {
            let Some(oid) = frontier.pop_front() else {
                break;
            };

            let slim = (self.loader)(&oid)?;
            let state = states.get(&oid).copied().unwrap_or(side);
            if state.contains(VisitState::FROM_BOTH) && !candidates.iter().any(|c| c.oid == oid) {
                candidates.push(slim.clone());
                continue; // no need to walk past a shared commit
            }

            for parent in &slim.parents {
                let parent_state = states.entry(parent.clone()).or_insert(VisitState::empty());
                if parent_state.contains(side) {
                    continue; // already reached from this side
                }
                *parent_state |= side;
                if parent_state.contains(VisitState::FROM_BOTH) {
                    let parent_slim = (self.loader)(parent)?;
                    if !candidates.iter().any(|c| &c.oid == parent) {
                        candidates.push(parent_slim);
                    }
                } else {
                    frontier.push_back(parent.clone());
                }
            }
        }
        Ok(())
    }
}
