//! Commit walker
//!
//! Yields commits in parent-chain order starting from a tip. Multi-parent
//! exploration is depth-first with the first parent preferred, guarded by a
//! visited set keyed by commit hash. Iterative with an explicit worklist so
//! deep histories cannot overflow the stack.

use std::collections::HashSet;

use crate::areas::database::Database;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;

/// Iterator over a commit's ancestry.
#[derive(Debug)]
pub struct RevList<'db> {
    database: &'db Database,
    stack: Vec<ObjectId>,
    visited: HashSet<ObjectId>,
}

impl<'db> RevList<'db> {
    /// Start a walk from `tip`.
    pub fn new(database: &'db Database, tip: ObjectId) -> Self {
        RevList {
            database,
            stack: vec![tip],
            visited: HashSet::new(),
        }
    }

    /// Collect every commit id reachable from `tip` (ancestry closure).
    pub fn reachable_commits(database: &Database, tip: &ObjectId) -> Result<HashSet<ObjectId>> {
        let mut reachable = HashSet::new();
        for step in RevList::new(database, tip.clone()) {
            let (oid, _) = step?;
            reachable.insert(oid);
        }
        Ok(reachable)
    }

    /// Whether `ancestor` is reachable from `descendant` (inclusive).
    pub fn is_ancestor(
        database: &Database,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> Result<bool> {
        for step in RevList::new(database, descendant.clone()) {
            let (oid, _) = step?;
            if &oid == ancestor {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Iterator for RevList<'_> {
    type Item = Result<(ObjectId, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let oid = self.stack.pop()?;
            if !self.visited.insert(oid.clone()) {
                continue;
            }

            match self.database.require_commit(&oid) {
                Ok(commit) => {
                    // push in reverse so the first parent is explored first
                    for parent in commit.parents().iter().rev() {
                        if !self.visited.contains(parent) {
                            self.stack.push(parent.clone());
                        }
                    }
                    return Some(Ok((oid, commit)));
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
