//! Tamper-evident audit log
//!
//! Append-only, hash-chained journal of every operation that changes
//! repository state. Each entry records
//! `(seq, op, fields, prev_entry_hash, entry_hash)` where
//! `entry_hash = SHA-256(seq ‖ op ‖ fields ‖ prev_entry_hash)`; editing any
//! entry invalidates its own hash and every later one.
//!
//! ## File format
//!
//! One entry per line in `.mem/audit/log`:
//! ```text
//! <seq>\t<entry_hash>\t<payload_json>
//! ```
//! The payload carries the operation, its fields, the previous hash, and a
//! UTC timestamp. Writes are flushed and fsynced before returning.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};

/// Operations recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOp {
    Init,
    Stage,
    Commit,
    Checkout,
    Merge,
    Reset,
    Push,
    Pull,
    Config,
    Tag,
    Branch,
    Resolve,
    Gc,
}

impl AuditOp {
    pub fn as_str(&self) -> &str {
        match self {
            AuditOp::Init => "init",
            AuditOp::Stage => "stage",
            AuditOp::Commit => "commit",
            AuditOp::Checkout => "checkout",
            AuditOp::Merge => "merge",
            AuditOp::Reset => "reset",
            AuditOp::Push => "push",
            AuditOp::Pull => "pull",
            AuditOp::Config => "config",
            AuditOp::Tag => "tag",
            AuditOp::Branch => "branch",
            AuditOp::Resolve => "resolve",
            AuditOp::Gc => "gc",
        }
    }
}

/// Payload serialized into each audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPayload {
    pub op: AuditOp,
    /// Op-specific identifiers: hashes, refs, paths
    pub fields: serde_json::Value,
    pub prev_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// A parsed audit entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub seq: u64,
    pub entry_hash: String,
    pub payload: AuditPayload,
}

/// Append-only audit log rooted at `.mem/audit`.
#[derive(Debug, new)]
pub struct AuditLog {
    /// Path to the audit directory (typically `.mem/audit`)
    path: Box<Path>,
}

impl AuditLog {
    fn log_path(&self) -> PathBuf {
        self.path.join("log")
    }

    /// Append one entry; flushed and fsynced before returning.
    ///
    /// # Arguments
    ///
    /// * `op` - the operation being recorded
    /// * `fields` - op-specific identifiers (hashes, refs, paths)
    pub fn append(&self, op: AuditOp, fields: serde_json::Value) -> Result<()> {
        std::fs::create_dir_all(&self.path)?;

        let (seq, prev_hash) = match self.last_entry()? {
            Some(last) => (last.seq + 1, last.entry_hash),
            None => (0, String::new()),
        };

        let payload = AuditPayload {
            op,
            fields,
            prev_hash: prev_hash.clone(),
            timestamp: Utc::now(),
        };
        let entry_hash = Self::entry_hash(seq, &payload)?;
        let line = format!("{seq}\t{entry_hash}\t{}\n", serde_json::to_string(&payload)?);

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Convenience: record an op with a single object id field.
    pub fn append_object(&self, op: AuditOp, key: &str, oid: &ObjectId) -> Result<()> {
        self.append(op, serde_json::json!({ key: oid.as_ref() }))
    }

    /// All entries, oldest first. Lines are parsed but not re-verified.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            entries.push(Self::parse_line(line, line_no as u64)?);
        }
        Ok(entries)
    }

    /// Newest entries first, capped at `max_entries`.
    pub fn read_recent(&self, max_entries: usize) -> Result<Vec<AuditEntry>> {
        let mut entries = self.entries()?;
        entries.reverse();
        entries.truncate(max_entries);
        Ok(entries)
    }

    /// Verify the whole chain.
    ///
    /// Recomputes every entry hash and checks the previous-hash links; the
    /// first mismatch fails with `AuditCorrupt` at that sequence number.
    ///
    /// # Returns
    ///
    /// The number of verified entries.
    pub fn verify(&self) -> Result<u64> {
        let entries = self.entries()?;
        let mut prev_hash = String::new();

        for (position, entry) in entries.iter().enumerate() {
            let corrupt = || Error::AuditCorrupt { seq: entry.seq };

            if entry.seq != position as u64 || entry.payload.prev_hash != prev_hash {
                return Err(corrupt());
            }
            let expected = Self::entry_hash(entry.seq, &entry.payload)?;
            if expected != entry.entry_hash {
                return Err(corrupt());
            }
            prev_hash = entry.entry_hash.clone();
        }

        Ok(entries.len() as u64)
    }

    fn last_entry(&self) -> Result<Option<AuditEntry>> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let Some(line) = raw.lines().rev().find(|line| !line.trim().is_empty()) else {
            return Ok(None);
        };
        Ok(Some(Self::parse_line(line.trim(), 0)?))
    }

    fn parse_line(line: &str, line_no: u64) -> Result<AuditEntry> {
        let corrupt = || Error::AuditCorrupt { seq: line_no };

        let mut parts = line.splitn(3, '\t');
        let seq: u64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(corrupt)?;
        let entry_hash = parts.next().ok_or_else(corrupt)?.to_string();
        let payload: AuditPayload =
            serde_json::from_str(parts.next().ok_or_else(corrupt)?).map_err(|_| corrupt())?;

        Ok(AuditEntry {
            seq,
            entry_hash,
            payload,
        })
    }

    /// `entry_hash = SHA-256(seq ‖ op ‖ fields ‖ prev_entry_hash)`
    fn entry_hash(seq: u64, payload: &AuditPayload) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(seq.to_be_bytes());
        hasher.update(payload.op.as_str().as_bytes());
        hasher.update(serde_json::to_string(&payload.fields)?.as_bytes());
        hasher.update(payload.prev_hash.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        Ok(ObjectId::from_raw(&digest).as_ref().to_string())
    }
}
