//! Repository configuration
//!
//! Stored as structured text at `.mem/config`. Every key is enumerated;
//! unknown keys are rejected with `InvalidConfig` instead of being carried
//! along silently.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifacts::memory::MemoryClass;
use crate::errors::{Error, Result};

/// Maximum delta chain depth the pack codec accepts.
pub const MAX_DELTA_CHAIN: u32 = 16;

/// Minimum Argon2id memory cost in KiB (64 MiB).
pub const MIN_KDF_MEMORY_KIB: u32 = 64 * 1024;

/// Minimum Argon2id passes.
pub const MIN_KDF_PASSES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorConfig {
    pub name: String,
    pub email: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        AuthorConfig {
            name: "agent".to_string(),
            email: "agent@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub default_branch: String,
    pub compression: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            default_branch: "main".to_string(),
            compression: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GcConfig {
    /// Reflog entries older than this many days stop acting as
    /// reachability roots.
    pub prune_days: u32,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig { prune_days: 90 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SigningConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct KdfConfig {
    /// Memory cost in KiB
    pub memory: u32,
    /// Number of passes
    pub passes: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        KdfConfig {
            memory: MIN_KDF_MEMORY_KIB,
            passes: MIN_KDF_PASSES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EncryptionConfig {
    pub enabled: bool,
    pub kdf: KdfConfig,
    /// Hex-encoded KDF salt, written when encryption is enabled
    pub salt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Per-class strategy overrides, e.g. `{"episodic": "semantic"}`
    pub strategy_override: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeltaConfig {
    pub enabled: bool,
    pub max_chain: u32,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        DeltaConfig {
            enabled: true,
            max_chain: MAX_DELTA_CHAIN,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PackConfig {
    pub delta: DeltaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SimilarityConfig {
    /// Length-ratio cutoff
    pub tau1: f64,
    /// SimHash Hamming-distance cutoff
    pub tau2: u32,
    /// Normalized edit-similarity floor
    pub tau3: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        SimilarityConfig {
            tau1: 0.5,
            tau2: 15,
            tau3: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrustConfig {
    /// Level applied to newly learned keys: full | conditional | untrusted
    pub default_level: String,
}

impl Default for TrustConfig {
    fn default() -> Self {
        TrustConfig {
            default_level: "untrusted".to_string(),
        }
    }
}

/// Repo-level configuration, the only process-wide state the core reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub author: AuthorConfig,
    pub core: CoreConfig,
    pub gc: GcConfig,
    pub signing: SigningConfig,
    pub encryption: EncryptionConfig,
    pub merge: MergeConfig,
    pub pack: PackConfig,
    pub similarity: SimilarityConfig,
    pub trust: TrustConfig,
}

impl Config {
    /// Load from `.mem/config`, or defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw).map_err(|err| Error::InvalidConfig {
            key: String::new(),
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Persist to `.mem/config` via temp file + atomic rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let raw = serde_json::to_string_pretty(self)?;
        let temp = path.with_extension("tmp");
        std::fs::write(&temp, raw)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    /// Check value constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.pack.delta.max_chain > MAX_DELTA_CHAIN {
            return Err(Error::InvalidConfig {
                key: "pack.delta.max_chain".to_string(),
                reason: format!("must be <= {MAX_DELTA_CHAIN}"),
            });
        }
        if self.encryption.enabled {
            if self.encryption.kdf.memory < MIN_KDF_MEMORY_KIB {
                return Err(Error::InvalidConfig {
                    key: "encryption.kdf.memory".to_string(),
                    reason: format!("must be >= {MIN_KDF_MEMORY_KIB} KiB"),
                });
            }
            if self.encryption.kdf.passes < MIN_KDF_PASSES {
                return Err(Error::InvalidConfig {
                    key: "encryption.kdf.passes".to_string(),
                    reason: format!("must be >= {MIN_KDF_PASSES}"),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.similarity.tau1) {
            return Err(Error::InvalidConfig {
                key: "similarity.tau1".to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }
        if self.similarity.tau2 > 64 {
            return Err(Error::InvalidConfig {
                key: "similarity.tau2".to_string(),
                reason: "must be within [0, 64]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.similarity.tau3) {
            return Err(Error::InvalidConfig {
                key: "similarity.tau3".to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }
        match self.trust.default_level.as_str() {
            "full" | "conditional" | "untrusted" => {}
            other => {
                return Err(Error::InvalidConfig {
                    key: "trust.default_level".to_string(),
                    reason: format!("unknown trust level '{other}'"),
                });
            }
        }
        for (class, strategy) in &self.merge.strategy_override {
            match class.as_str() {
                "episodic" | "semantic" | "procedural" | "other" => {}
                _ => {
                    return Err(Error::InvalidConfig {
                        key: format!("merge.strategy_override.{class}"),
                        reason: "unknown memory class".to_string(),
                    });
                }
            }
            match strategy.as_str() {
                "episodic" | "semantic" | "procedural" => {}
                _ => {
                    return Err(Error::InvalidConfig {
                        key: format!("merge.strategy_override.{class}"),
                        reason: format!("unknown strategy '{strategy}'"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Effective merge strategy name for a class, honoring overrides.
    pub fn merge_strategy_for(&self, class: MemoryClass) -> &str {
        self.merge
            .strategy_override
            .get(class.as_str())
            .map(String::as_str)
            .unwrap_or(match class {
                MemoryClass::Episodic => "episodic",
                MemoryClass::Semantic | MemoryClass::Other => "semantic",
                MemoryClass::Procedural => "procedural",
            })
    }

    /// Set a single key by its dotted name, as the `config` operation does.
    ///
    /// # Arguments
    ///
    /// * `key` - dotted key from the enumerated set, e.g. `author.name`
    /// * `value` - string form of the new value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidConfig {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        let parse_bool = |value: &str| -> Result<bool> {
            value.parse().map_err(|_| invalid("expected true or false"))
        };

        match key {
            "author.name" => self.author.name = value.to_string(),
            "author.email" => self.author.email = value.to_string(),
            "core.default_branch" => self.core.default_branch = value.to_string(),
            "core.compression" => self.core.compression = parse_bool(value)?,
            "gc.prune_days" => {
                self.gc.prune_days = value.parse().map_err(|_| invalid("expected an integer"))?
            }
            "signing.enabled" => self.signing.enabled = parse_bool(value)?,
            "encryption.enabled" => self.encryption.enabled = parse_bool(value)?,
            "encryption.kdf.memory" => {
                self.encryption.kdf.memory =
                    value.parse().map_err(|_| invalid("expected an integer"))?
            }
            "encryption.kdf.passes" => {
                self.encryption.kdf.passes =
                    value.parse().map_err(|_| invalid("expected an integer"))?
            }
            "pack.delta.enabled" => self.pack.delta.enabled = parse_bool(value)?,
            "pack.delta.max_chain" => {
                self.pack.delta.max_chain =
                    value.parse().map_err(|_| invalid("expected an integer"))?
            }
            "similarity.tau1" => {
                self.similarity.tau1 = value.parse().map_err(|_| invalid("expected a float"))?
            }
            "similarity.tau2" => {
                self.similarity.tau2 = value.parse().map_err(|_| invalid("expected an integer"))?
            }
            "similarity.tau3" => {
                self.similarity.tau3 = value.parse().map_err(|_| invalid("expected a float"))?
            }
            "trust.default_level" => self.trust.default_level = value.to_string(),
            _ => {
                if let Some(class) = key.strip_prefix("merge.strategy_override.") {
                    self.merge
                        .strategy_override
                        .insert(class.to_string(), value.to_string());
                } else {
                    return Err(invalid("unknown configuration key"));
                }
            }
        }

        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_set_known_key() {
        let mut config = Config::default();
        config.set("core.default_branch", "trunk").unwrap();
        assert_eq!(config.core.default_branch, "trunk");
    }

    #[test]
    fn test_set_unknown_key_fails() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("core.unknown", "x"),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_weak_kdf() {
        let mut config = Config::default();
        config.encryption.enabled = true;
        config.encryption.kdf.memory = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_deep_delta_chain() {
        let mut config = Config::default();
        assert!(config.set("pack.delta.max_chain", "32").is_err());
    }

    #[test]
    fn test_strategy_override_dispatch() {
        let mut config = Config::default();
        config
            .set("merge.strategy_override.episodic", "semantic")
            .unwrap();
        assert_eq!(
            config.merge_strategy_for(MemoryClass::Episodic),
            "semantic"
        );
        assert_eq!(
            config.merge_strategy_for(MemoryClass::Procedural),
            "procedural"
        );
    }
}
