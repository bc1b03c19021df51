//! Merge-in-progress state
//!
//! While conflicts are outstanding the repository is in MERGING state:
//! commits are refused except the merge-completion commit produced by
//! `resolve`. The record lives at `.mem/merge/state` and lists, per
//! conflicted path, the blob hashes of both sides and the base plus the
//! strategy that raised the conflict.

use std::path::{Path, PathBuf};

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Per-path resolution choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Keep our side's content
    Ours,
    /// Keep their side's content
    Theirs,
    /// Keep both sides' content, markers removed
    Both,
}

/// One conflicted path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub path: String,
    pub ours: Option<String>,
    pub theirs: Option<String>,
    pub base: Option<String>,
    /// Strategy that produced the conflict (`semantic` in practice)
    pub strategy: String,
    /// Resolution applied so far, if any
    pub resolution: Option<Resolution>,
}

/// Persisted merge state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeState {
    /// Tip of the branch being merged into (ours)
    pub ours_tip: String,
    /// Tip being merged (theirs)
    pub theirs_tip: String,
    /// LCA used as merge base, absent when histories diverged
    pub base: Option<String>,
    /// Label of the branch being merged, for the completion message
    pub theirs_label: String,
    pub conflicts: Vec<ConflictRecord>,
    /// Paths flagged for review by the procedural strategy
    pub review_paths: Vec<String>,
}

impl MergeState {
    /// Paths still lacking a resolution.
    pub fn unresolved(&self) -> Vec<&ConflictRecord> {
        self.conflicts
            .iter()
            .filter(|conflict| conflict.resolution.is_none())
            .collect()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved().is_empty()
    }
}

/// Store for the merge-state record.
#[derive(Debug, new)]
pub struct MergeStateStore {
    /// Path to the merge directory (typically `.mem/merge`)
    path: Box<Path>,
}

impl MergeStateStore {
    fn state_path(&self) -> PathBuf {
        self.path.join("state")
    }

    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    pub fn load(&self) -> Result<Option<MergeState>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Load, failing when no merge is in progress.
    pub fn require(&self) -> Result<MergeState> {
        self.load()?
            .ok_or_else(|| Error::not_found("merge in progress"))
    }

    pub fn save(&self, state: &MergeState) -> Result<()> {
        std::fs::create_dir_all(&self.path)?;
        let raw = serde_json::to_string_pretty(state)?;
        let temp = self.path.join(format!(".tmp-merge-{}", rand::random::<u32>()));
        std::fs::write(&temp, raw)?;
        std::fs::rename(&temp, self.state_path())?;
        Ok(())
    }

    /// Clear the record once the merge commit lands (or is aborted).
    pub fn clear(&self) -> Result<()> {
        let path = self.state_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
