//! Multi-agent trust store
//!
//! Maps Ed25519 public-key fingerprints to trust levels. Consulted on pull
//! and merge:
//!
//! - **Full**: commits signed by this key are accepted silently
//! - **Conditional**: accepted but flagged in commit metadata for review
//! - **Untrusted** (or unknown): fetched objects stay quarantined and no
//!   ref advances; merges refuse the commits
//!
//! Keys learned from a remote during clone are staged and begin untrusted;
//! promotion is an explicit operation.

use std::path::{Path, PathBuf};

use derive_new::new;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{Error, Result};

/// Trust level assigned to a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Full,
    Conditional,
    Untrusted,
}

impl TrustLevel {
    pub fn parse(level: &str) -> Result<TrustLevel> {
        match level {
            "full" => Ok(TrustLevel::Full),
            "conditional" => Ok(TrustLevel::Conditional),
            "untrusted" => Ok(TrustLevel::Untrusted),
            other => Err(Error::invalid_argument(format!(
                "unknown trust level '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrustLevel::Full => "full",
            TrustLevel::Conditional => "conditional",
            TrustLevel::Untrusted => "untrusted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrustEntry {
    key_id: String,
    level: TrustLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrustFile {
    entries: Vec<TrustEntry>,
}

/// On-disk trust store at `.mem/trust/store`.
#[derive(Debug, new)]
pub struct TrustStore {
    /// Path to the trust directory (typically `.mem/trust`)
    path: Box<Path>,
}

impl TrustStore {
    fn store_path(&self) -> PathBuf {
        self.path.join("store")
    }

    fn load(&self) -> Result<TrustFile> {
        let path = self.store_path();
        if !path.exists() {
            return Ok(TrustFile::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, file: &TrustFile) -> Result<()> {
        std::fs::create_dir_all(&self.path)?;
        let raw = serde_json::to_string_pretty(file)?;
        let temp = self.path.join(format!(".tmp-trust-{}", rand::random::<u32>()));
        std::fs::write(&temp, raw)?;
        std::fs::rename(&temp, self.store_path())?;
        Ok(())
    }

    /// Trust level for a key, `None` when the key is unknown.
    pub fn level(&self, key_id: &str) -> Result<Option<TrustLevel>> {
        Ok(self
            .load()?
            .entries
            .iter()
            .find(|entry| entry.key_id == key_id)
            .map(|entry| entry.level))
    }

    /// Effective level: unknown keys count as untrusted.
    pub fn effective_level(&self, key_id: &str) -> Result<TrustLevel> {
        Ok(self.level(key_id)?.unwrap_or(TrustLevel::Untrusted))
    }

    /// Set (or replace) a key's trust level.
    pub fn set(&self, key_id: &str, level: TrustLevel) -> Result<()> {
        if key_id.is_empty() || !key_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_argument(format!(
                "invalid key id '{key_id}'"
            )));
        }

        let mut file = self.load()?;
        file.entries.retain(|entry| entry.key_id != key_id);
        file.entries.push(TrustEntry {
            key_id: key_id.to_string(),
            level,
        });
        file.entries.sort_by(|a, b| a.key_id.cmp(&b.key_id));
        info!(key = key_id, level = level.as_str(), "trust level updated");
        self.save(&file)
    }

    /// All known keys with their levels.
    pub fn list(&self) -> Result<Vec<(String, TrustLevel)>> {
        Ok(self
            .load()?
            .entries
            .into_iter()
            .map(|entry| (entry.key_id, entry.level))
            .collect())
    }

    /// Register a newly learned key at the configured default level,
    /// leaving an existing assignment untouched.
    pub fn learn(&self, key_id: &str, default_level: TrustLevel) -> Result<TrustLevel> {
        if let Some(existing) = self.level(key_id)? {
            return Ok(existing);
        }
        self.set(key_id, default_level)?;
        Ok(default_level)
    }
}
