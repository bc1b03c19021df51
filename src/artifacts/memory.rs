//! Memory-type classification
//!
//! A path's memory class is derived from its top-level directory under the
//! working root: `episodic/`, `semantic/`, `procedural/`, anything else is
//! OTHER. The merge engine dispatches its strategy on this class.

use serde::{Deserialize, Serialize};

/// Semantic class of a memory artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryClass {
    /// Time-stamped events, merged by chronological append
    Episodic,
    /// Facts, merged line-level with conflict markers
    Semantic,
    /// Workflows, merged by preferring the newer side
    Procedural,
    /// Everything else, treated as semantic
    Other,
}

impl MemoryClass {
    /// Classify a repo-relative path by its top-level directory.
    pub fn from_path(path: &str) -> MemoryClass {
        match path.split('/').next() {
            Some("episodic") => MemoryClass::Episodic,
            Some("semantic") => MemoryClass::Semantic,
            Some("procedural") => MemoryClass::Procedural,
            _ => MemoryClass::Other,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MemoryClass::Episodic => "episodic",
            MemoryClass::Semantic => "semantic",
            MemoryClass::Procedural => "procedural",
            MemoryClass::Other => "other",
        }
    }
}

impl std::fmt::Display for MemoryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_top_level_directory() {
        assert_eq!(
            MemoryClass::from_path("episodic/2026/log.md"),
            MemoryClass::Episodic
        );
        assert_eq!(
            MemoryClass::from_path("semantic/pref.md"),
            MemoryClass::Semantic
        );
        assert_eq!(
            MemoryClass::from_path("procedural/deploy.md"),
            MemoryClass::Procedural
        );
    }

    #[test]
    fn test_unknown_paths_are_other() {
        assert_eq!(MemoryClass::from_path("notes.md"), MemoryClass::Other);
        assert_eq!(
            MemoryClass::from_path("episodic.md"),
            MemoryClass::Other
        );
    }
}
