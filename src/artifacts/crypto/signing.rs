//! Ed25519 commit signing
//!
//! When a private key is configured, the commit builder signs the Merkle
//! root and records the signature plus the signing key's fingerprint in the
//! commit metadata. Keys live under `.mem/keys/`:
//!
//! ```text
//! keys/private.key            raw 32-byte signing key (optional)
//! keys/public/<fp>.pub        raw 32-byte verifying keys, own + learned
//! keys/staged/<fp>.pub        keys copied from a remote on clone,
//!                             untrusted until promoted
//! ```
//!
//! A fingerprint is the first 16 hex characters of the SHA-256 of the raw
//! public key bytes.

use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::errors::{Error, Result};

/// Length of a key fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 16;

/// Fingerprint of a raw Ed25519 public key.
pub fn fingerprint(public_key: &VerifyingKey) -> String {
    let digest = Sha256::digest(public_key.as_bytes());
    digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
        .split_at(FINGERPRINT_LEN)
        .0
        .to_string()
}

/// On-disk Ed25519 key store.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: Box<Path>,
}

impl KeyStore {
    pub fn new(path: Box<Path>) -> Self {
        KeyStore { path }
    }

    fn private_key_path(&self) -> PathBuf {
        self.path.join("private.key")
    }

    fn public_dir(&self) -> PathBuf {
        self.path.join("public")
    }

    fn staged_dir(&self) -> PathBuf {
        self.path.join("staged")
    }

    /// Generate a fresh signing key and store both halves.
    ///
    /// # Returns
    ///
    /// The fingerprint of the new public key.
    pub fn generate(&self) -> Result<String> {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let signing_key = SigningKey::from_bytes(&secret);

        std::fs::create_dir_all(self.public_dir())?;
        std::fs::write(self.private_key_path(), signing_key.to_bytes())?;

        let verifying_key = signing_key.verifying_key();
        let fp = fingerprint(&verifying_key);
        std::fs::write(
            self.public_dir().join(format!("{fp}.pub")),
            verifying_key.to_bytes(),
        )?;

        Ok(fp)
    }

    /// Load the private signing key, if one is configured.
    pub fn signing_key(&self) -> Result<Option<SigningKey>> {
        let path = self.private_key_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path)?;
        let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            Error::invalid_argument(format!("malformed private key at {}", path.display()))
        })?;
        Ok(Some(SigningKey::from_bytes(&bytes)))
    }

    /// Look up a verifying key by fingerprint among the known public keys.
    pub fn verifying_key(&self, fp: &str) -> Result<Option<VerifyingKey>> {
        let path = self.public_dir().join(format!("{fp}.pub"));
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path)?;
        let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            Error::invalid_argument(format!("malformed public key at {}", path.display()))
        })?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| Error::invalid_argument(format!("invalid public key {fp}")))?;
        Ok(Some(key))
    }

    /// List fingerprints of all known (non-staged) public keys.
    pub fn list_public(&self) -> Result<Vec<String>> {
        Self::list_dir(&self.public_dir())
    }

    /// List fingerprints parked in the clone staging area.
    pub fn list_staged(&self) -> Result<Vec<String>> {
        Self::list_dir(&self.staged_dir())
    }

    fn list_dir(dir: &Path) -> Result<Vec<String>> {
        let mut fingerprints = Vec::new();
        if !dir.exists() {
            return Ok(fingerprints);
        }
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("pub")
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                fingerprints.push(stem.to_string());
            }
        }
        fingerprints.sort();
        Ok(fingerprints)
    }

    /// Park a remote's published key in the staging area (clone path).
    pub fn stage_remote_key(&self, fp: &str, raw: &[u8]) -> Result<()> {
        if raw.len() != 32 {
            return Err(Error::invalid_argument(format!(
                "remote key {fp} has invalid length {}",
                raw.len()
            )));
        }
        std::fs::create_dir_all(self.staged_dir())?;
        std::fs::write(self.staged_dir().join(format!("{fp}.pub")), raw)?;
        Ok(())
    }

    /// Promote a staged key into the known public keys.
    pub fn promote_staged(&self, fp: &str) -> Result<()> {
        let staged = self.staged_dir().join(format!("{fp}.pub"));
        if !staged.exists() {
            return Err(Error::not_found(format!("staged key {fp}")));
        }
        std::fs::create_dir_all(self.public_dir())?;
        std::fs::rename(&staged, self.public_dir().join(format!("{fp}.pub")))?;
        Ok(())
    }

    /// Raw bytes of a known public key, for publication to clones.
    pub fn public_key_bytes(&self, fp: &str) -> Result<Vec<u8>> {
        let path = self.public_dir().join(format!("{fp}.pub"));
        Ok(std::fs::read(path)?)
    }
}

/// Sign a Merkle root with the given key.
///
/// # Returns
///
/// `(signature_hex, fingerprint)` of the signing key.
pub fn sign_root(signing_key: &SigningKey, merkle_root: &str) -> (String, String) {
    let signature = signing_key.sign(merkle_root.as_bytes());
    let signature_hex = signature
        .to_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    (signature_hex, fingerprint(&signing_key.verifying_key()))
}

/// Verify a Merkle-root signature.
///
/// # Arguments
///
/// * `commit` - hex id of the commit, used only for error context
pub fn verify_root_signature(
    verifying_key: &VerifyingKey,
    merkle_root: &str,
    signature_hex: &str,
    commit: &str,
) -> Result<()> {
    let invalid = || Error::SignatureInvalid {
        commit: commit.to_string(),
    };

    if signature_hex.len() != 128 {
        return Err(invalid());
    }
    let mut raw = [0u8; 64];
    for (i, byte) in raw.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&signature_hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| invalid())?;
    }

    let signature = Signature::from_bytes(&raw);
    verifying_key
        .verify(merkle_root.as_bytes(), &signature)
        .map_err(|_| invalid())
}
