//! Commit object
//!
//! Commits snapshot the repository at a point in time. They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s): zero = root, one = linear, two = merge
//! - Author and committer information with UTC sub-second timestamps
//! - Commit message
//! - Integrity metadata: Merkle root, Ed25519 signature, signing key id,
//!   review notes from procedural merges, trust flags
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <rfc3339-utc>
//! committer <name> <email> <rfc3339-utc>
//! merkle-root <hex>
//! signing-key <fingerprint>
//! signature <hex>
//! review <path>
//! trust conditional
//!
//! <commit message>
//! ```
//!
//! Timestamps along a parent chain are monotonically non-decreasing; the
//! commit builder clamps new timestamps to max(now, parents).

use std::io::BufRead;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::artifacts::objects::object::{Object, Packable, Unpackable, canonical_bytes};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};

/// Author or committer identity with timestamp.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: DateTime<Utc>,
}

impl Author {
    /// Create a new author with the current timestamp
    pub fn new(name: String, email: String) -> Self {
        Author {
            name,
            email,
            timestamp: Utc::now(),
        }
    }

    /// Create a new author with a specific timestamp
    pub fn new_with_timestamp(name: String, email: String, timestamp: DateTime<Utc>) -> Self {
        Author {
            name,
            email,
            timestamp,
        }
    }

    /// Format author name and email for display
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Format complete author info including timestamp
    ///
    /// # Returns
    ///
    /// String in format "Name <email> 2026-01-01T10:00:00.000000000Z"
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {}",
            self.name,
            self.email,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Replace the timestamp, used by the commit builder to enforce
    /// monotonicity along parent chains.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl TryFrom<&str> for Author {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        // Format: "name <email> rfc3339-timestamp"
        let (name_email_part, timestamp_str) =
            value.rsplit_once(' ').ok_or_else(|| Error::ObjectCorrupt {
                object: String::new(),
                reason: format!("invalid author line '{value}'"),
            })?;

        let email_start = name_email_part.find('<').ok_or_else(|| Error::ObjectCorrupt {
            object: String::new(),
            reason: "author line missing '<'".to_string(),
        })?;
        let email_end = name_email_part.find('>').ok_or_else(|| Error::ObjectCorrupt {
            object: String::new(),
            reason: "author line missing '>'".to_string(),
        })?;

        let name = name_email_part[..email_start].trim().to_string();
        let email = name_email_part[email_start + 1..email_end].to_string();

        let timestamp = DateTime::parse_from_rfc3339(timestamp_str)
            .map_err(|_| Error::ObjectCorrupt {
                object: String::new(),
                reason: format!("invalid author timestamp '{timestamp_str}'"),
            })?
            .with_timezone(&Utc);

        Ok(Author {
            name,
            email,
            timestamp,
        })
    }
}

/// Integrity metadata attached to a commit.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CommitMetadata {
    /// Merkle root over the commit's `(path, blob_hash)` leaves
    pub merkle_root: Option<String>,
    /// Ed25519 signature over the Merkle root, hex encoded
    pub signature: Option<String>,
    /// Fingerprint of the signing public key
    pub signing_key_id: Option<String>,
    /// Paths flagged for manual review by the procedural merge strategy
    pub review_paths: Vec<String>,
    /// Set when the commit was accepted from a conditionally trusted key
    pub conditional_trust: bool,
}

impl CommitMetadata {
    pub fn is_empty(&self) -> bool {
        self.merkle_root.is_none()
            && self.signature.is_none()
            && self.signing_key_id.is_none()
            && self.review_paths.is_empty()
            && !self.conditional_trust
    }
}

/// Lightweight commit view for graph traversal (merge base finding,
/// reachability walks). Owns its data.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SlimCommit {
    pub oid: ObjectId,
    pub parents: Vec<ObjectId>,
    pub timestamp: DateTime<Utc>,
}

impl PartialOrd for SlimCommit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlimCommit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.oid.cmp(&other.oid))
    }
}

/// Commit object
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Parent commit IDs (empty for root, two for merge commits)
    parents: Vec<ObjectId>,
    /// Tree object ID representing the directory snapshot
    tree_oid: ObjectId,
    /// Author who wrote the changes
    author: Author,
    /// Committer who recorded the commit
    committer: Author,
    /// Commit message
    message: String,
    /// Integrity metadata
    metadata: CommitMetadata,
}

impl Commit {
    pub fn new(parents: Vec<ObjectId>, tree_oid: ObjectId, author: Author, message: String) -> Self {
        Commit {
            parents,
            tree_oid,
            author: author.clone(),
            committer: author,
            message,
            metadata: CommitMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: CommitMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get the first line of the commit message
    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    /// First parent, the one followed by `HEAD~n` walks.
    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.committer.timestamp()
    }

    pub fn metadata(&self) -> &CommitMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut CommitMetadata {
        &mut self.metadata
    }

    /// Reduce to the traversal view.
    pub fn slim(&self) -> Result<SlimCommit> {
        Ok(SlimCommit {
            oid: self.object_id()?,
            parents: self.parents.clone(),
            timestamp: self.timestamp(),
        })
    }

    fn header_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("tree {}", self.tree_oid.as_ref())];

        for parent in &self.parents {
            lines.push(format!("parent {}", parent.as_ref()));
        }
        lines.push(format!("author {}", self.author.display()));
        lines.push(format!("committer {}", self.committer.display()));

        if let Some(root) = &self.metadata.merkle_root {
            lines.push(format!("merkle-root {root}"));
        }
        if let Some(key_id) = &self.metadata.signing_key_id {
            lines.push(format!("signing-key {key_id}"));
        }
        if let Some(signature) = &self.metadata.signature {
            lines.push(format!("signature {signature}"));
        }
        for path in &self.metadata.review_paths {
            lines.push(format!("review {path}"));
        }
        if self.metadata.conditional_trust {
            lines.push("trust conditional".to_string());
        }

        lines
    }
}

impl Packable for Commit {
    fn serialize(&self) -> Result<Bytes> {
        let mut lines = self.header_lines();
        lines.push(String::new());
        lines.push(self.message.to_string());

        Ok(canonical_bytes(
            self.object_type(),
            lines.join("\n").as_bytes(),
        ))
    }
}

impl Unpackable for Commit {
    fn deserialize(reader: impl BufRead) -> Result<Self> {
        let content = reader
            .bytes()
            .collect::<std::result::Result<Vec<u8>, std::io::Error>>()?;
        let content = String::from_utf8(content).map_err(|_| Error::ObjectCorrupt {
            object: String::new(),
            reason: "non-utf8 commit".to_string(),
        })?;

        let corrupt = |reason: &str| Error::ObjectCorrupt {
            object: String::new(),
            reason: reason.to_string(),
        };

        let mut lines = content.lines();

        let tree_line = lines.next().ok_or_else(|| corrupt("missing tree line"))?;
        let tree_oid = tree_line
            .strip_prefix("tree ")
            .ok_or_else(|| corrupt("invalid tree line"))?;
        let tree_oid = ObjectId::try_parse(tree_oid.to_string())?;

        // parent lines: 0, 1, or 2
        let mut parents = Vec::new();
        let mut next_line = lines.next().ok_or_else(|| corrupt("missing author line"))?;
        while let Some(parent_oid) = next_line.strip_prefix("parent ") {
            parents.push(ObjectId::try_parse(parent_oid.to_string())?);
            next_line = lines.next().ok_or_else(|| corrupt("missing author line"))?;
        }

        let author = next_line
            .strip_prefix("author ")
            .ok_or_else(|| corrupt("invalid author line"))?;
        let author = Author::try_from(author)?;

        let committer_line = lines.next().ok_or_else(|| corrupt("missing committer line"))?;
        let committer = committer_line
            .strip_prefix("committer ")
            .ok_or_else(|| corrupt("invalid committer line"))?;
        let committer = Author::try_from(committer)?;

        // optional metadata headers until the blank separator line
        let mut metadata = CommitMetadata::default();
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            if let Some(root) = line.strip_prefix("merkle-root ") {
                metadata.merkle_root = Some(root.to_string());
            } else if let Some(key_id) = line.strip_prefix("signing-key ") {
                metadata.signing_key_id = Some(key_id.to_string());
            } else if let Some(signature) = line.strip_prefix("signature ") {
                metadata.signature = Some(signature.to_string());
            } else if let Some(path) = line.strip_prefix("review ") {
                metadata.review_paths.push(path.to_string());
            } else if line == "trust conditional" {
                metadata.conditional_trust = true;
            } else {
                return Err(corrupt(&format!("unknown commit header '{line}'")));
            }
        }

        let message = lines.collect::<Vec<&str>>().join("\n");

        Ok(Commit {
            parents,
            tree_oid,
            author,
            committer,
            message,
            metadata,
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        let mut lines = self.header_lines();
        lines.push(String::new());
        lines.push(self.message.to_string());
        lines.join("\n")
    }
}
