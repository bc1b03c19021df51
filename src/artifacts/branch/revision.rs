//! Revision expressions
//!
//! A revision identifies a commit. Supported forms:
//!
//! - `HEAD` (or the alias `@`)
//! - Branch or tag names: `main`, `feature/x`, `v1`
//! - `<revision>~<n>`: the nth first-parent ancestor (`HEAD~2`)
//! - `<revision>^`: the first parent (`main^`)
//! - Full 64-character object ids
//! - Abbreviated ids, at least 4 hex characters; an ambiguous prefix fails
//!   with `AmbiguousRef`
//!
//! Names win over ids when a string could be both, matching the usual VCS
//! behavior of preferring refs.

use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::branch::HEAD_ALIAS;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::{MIN_PREFIX_LENGTH, OBJECT_ID_LENGTH};
use crate::errors::{Error, Result};

/// A parsed revision expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// A name: HEAD, branch, tag, or something hash-shaped
    Ref(String),
    /// The nth first-parent ancestor of a revision
    Ancestor(Box<Revision>, usize),
}

impl Revision {
    /// Parse a revision expression.
    pub fn parse(expr: &str) -> Result<Revision> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(Error::invalid_argument("empty revision"));
        }

        if let Some(base) = expr.strip_suffix('^') {
            return Ok(Revision::Ancestor(Box::new(Self::parse(base)?), 1));
        }

        if let Some(tilde) = expr.rfind('~') {
            let (base, count) = expr.split_at(tilde);
            let count: usize = count[1..]
                .parse()
                .map_err(|_| Error::invalid_argument(format!("invalid ancestor count in '{expr}'")))?;
            return Ok(Revision::Ancestor(Box::new(Self::parse(base)?), count));
        }

        Ok(Revision::Ref(expr.to_string()))
    }

    /// Resolve to a commit id.
    pub fn resolve(&self, refs: &Refs, database: &Database) -> Result<ObjectId> {
        match self {
            Revision::Ref(name) => Self::resolve_name(name, refs, database),
            Revision::Ancestor(base, generations) => {
                let mut oid = base.resolve(refs, database)?;
                for _ in 0..*generations {
                    let commit = database.require_commit(&oid)?;
                    // merge commits follow the first parent
                    oid = commit
                        .parent()
                        .cloned()
                        .ok_or_else(|| Error::not_found(format!("ancestor of root commit {oid}")))?;
                }
                Ok(oid)
            }
        }
    }

    fn resolve_name(name: &str, refs: &Refs, database: &Database) -> Result<ObjectId> {
        if name == HEAD_ALIAS || name == crate::areas::refs::HEAD_REF_NAME {
            return refs
                .read_head()?
                .ok_or_else(|| Error::not_found("HEAD (no commits yet)"));
        }

        if let Ok(ref_name) = RefName::try_parse(name) {
            if let Some(oid) = refs.read_branch(&ref_name)? {
                return Ok(oid);
            }
            if let Some(oid) = refs.read_tag(&ref_name)? {
                return Ok(oid);
            }
            // remote-tracking refs resolve through their full path
            if let Some((remote, branch)) = name.split_once('/')
                && let Ok(branch) = RefName::try_parse(branch)
                && let Some(oid) = refs.read_remote_branch(remote, &branch)?
            {
                return Ok(oid);
            }
        }

        Self::resolve_oid(name, database)
    }

    fn resolve_oid(candidate: &str, database: &Database) -> Result<ObjectId> {
        let hash_shaped = candidate.len() >= MIN_PREFIX_LENGTH
            && candidate.len() <= OBJECT_ID_LENGTH
            && candidate.chars().all(|c| c.is_ascii_hexdigit());
        if !hash_shaped {
            return Err(Error::not_found(format!("revision '{candidate}'")));
        }

        if candidate.len() == OBJECT_ID_LENGTH {
            let oid = ObjectId::try_parse(candidate.to_string())?;
            if database.exists(&oid) {
                return Ok(oid);
            }
            return Err(Error::not_found(format!("object {candidate}")));
        }

        let matches = database.find_objects_by_prefix(candidate)?;
        match matches.len() {
            0 => Err(Error::not_found(format!("revision '{candidate}'"))),
            1 => Ok(matches.into_iter().next().unwrap_or_default()),
            n => Err(Error::AmbiguousRef {
                name: candidate.to_string(),
                candidates: n,
            }),
        }
    }
}
