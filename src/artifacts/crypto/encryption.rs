//! Encryption at rest for the object store
//!
//! AES-256-GCM over compressed object payloads, applied *after* hashing
//! (hash-then-encrypt) so deduplication by plaintext hash is preserved.
//! The key is derived from a passphrase with Argon2id; hardness parameters
//! come from the repo config (memory cost at least 64 MiB, 3 passes). The
//! salt is stored in the repo encryption config.
//!
//! Ciphertext layout: `nonce (12B) || ciphertext+tag`. A GCM tag mismatch
//! surfaces as `DecryptionFailed` and aborts the enclosing operation.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use bytes::Bytes;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::artifacts::config::KdfConfig;
use crate::errors::{Error, Result};

/// GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Derived key length in bytes (AES-256).
const KEY_LEN: usize = 32;

/// Generate a fresh random KDF salt.
pub fn generate_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive an AES-256 key from a passphrase with Argon2id.
///
/// # Arguments
///
/// * `passphrase` - user-supplied secret
/// * `salt` - per-repo salt from the encryption config
/// * `kdf` - hardness parameters (memory in KiB, passes)
pub fn derive_key(passphrase: &[u8], salt: &[u8], kdf: &KdfConfig) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(kdf.memory, kdf.passes, 4, Some(KEY_LEN)).map_err(|err| {
        Error::InvalidConfig {
            key: "encryption.kdf".to_string(),
            reason: err.to_string(),
        }
    })?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|err| Error::InvalidConfig {
            key: "encryption.kdf".to_string(),
            reason: err.to_string(),
        })?;
    Ok(key)
}

/// Stateful encryptor attached to the object store when encryption at rest
/// is enabled.
#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor").finish_non_exhaustive()
    }
}

impl Encryptor {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Encryptor {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Build from a passphrase plus the repo's stored KDF parameters.
    pub fn from_passphrase(passphrase: &[u8], salt: &[u8], kdf: &KdfConfig) -> Result<Self> {
        Ok(Self::new(&derive_key(passphrase, salt, kdf)?))
    }

    /// Encrypt a payload; output carries its own random nonce.
    pub fn encrypt(&self, payload: &[u8]) -> Result<Bytes> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|_| Error::DecryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(Bytes::from(out))
    }

    /// Decrypt a payload produced by [`Encryptor::encrypt`].
    pub fn decrypt(&self, payload: &[u8]) -> Result<Bytes> {
        if payload.len() < NONCE_LEN {
            return Err(Error::DecryptionFailed);
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::DecryptionFailed)?;
        Ok(Bytes::from(plaintext))
    }
}
