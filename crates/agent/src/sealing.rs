// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token sealing for at-rest storage.
//!
//! The key is derived with PBKDF2-HMAC-SHA-256 (480 000 iterations) from a
//! machine identifier concatenated with a persisted random salt, then used
//! with AES-256-GCM. Ciphertexts carry the `tomo1:` prefix so the state
//! loader can tell sealed tokens from legacy plaintext.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix marking a sealed token.
pub const SEALED_PREFIX: &str = "tomo1:";

/// PBKDF2 iteration count (OWASP recommendation for SHA-256).
const KEY_ITERATIONS: u32 = 480_000;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Machine-id sources, tried in order.
const MACHINE_ID_SOURCES: &[&str] =
    &["/etc/machine-id", "/var/lib/dbus/machine-id", "/host/etc/machine-id"];

#[derive(Debug, Error)]
pub enum SealError {
    #[error("salt file I/O error: {0}")]
    Salt(#[from] std::io::Error),

    #[error("ciphertext is malformed")]
    Malformed,

    #[error("decryption failed")]
    Decrypt,
}

/// Seals and unseals tokens with a machine-derived key.
pub struct TokenSealer {
    cipher: Aes256Gcm,
}

impl TokenSealer {
    /// Build a sealer whose salt lives at `salt_path` (created 0600 on
    /// first use) and whose machine id comes from the standard sources.
    pub fn open(salt_path: &Path) -> Result<Self, SealError> {
        let machine_id = machine_id();
        let salt = load_or_create_salt(salt_path)?;
        Ok(Self::from_parts(&machine_id, &salt))
    }

    /// Deterministic construction from raw parts (exposed for tests).
    pub fn from_parts(machine_id: &[u8], salt: &[u8]) -> Self {
        let mut key_bytes = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<sha2::Sha256>(machine_id, salt, KEY_ITERATIONS, &mut key_bytes);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self { cipher: Aes256Gcm::new(key) }
    }

    /// Seal a token: `tomo1:` + base64(nonce || ciphertext).
    pub fn seal(&self, plaintext: &str) -> Result<String, SealError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| SealError::Decrypt)?;
        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(format!("{SEALED_PREFIX}{}", URL_SAFE_NO_PAD.encode(combined)))
    }

    /// Unseal a `tomo1:`-prefixed ciphertext back to the token.
    pub fn unseal(&self, sealed: &str) -> Result<String, SealError> {
        let encoded = sealed.strip_prefix(SEALED_PREFIX).ok_or(SealError::Malformed)?;
        let combined = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| SealError::Malformed)?;
        if combined.len() <= NONCE_LEN {
            return Err(SealError::Malformed);
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| SealError::Malformed)
    }
}

/// Whether a stored token value is sealed (vs legacy plaintext).
pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_PREFIX)
}

/// Stable machine identifier for key derivation.
///
/// Falls back to hostname + `$HOSTNAME` when no machine-id file is
/// readable (e.g. minimal containers).
fn machine_id() -> Vec<u8> {
    for source in MACHINE_ID_SOURCES {
        if let Ok(content) = std::fs::read_to_string(source) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return trimmed.as_bytes().to_vec();
            }
        }
    }

    let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
    let container_id = std::env::var(crate::env::HOSTNAME).unwrap_or_else(|_| "unknown".to_string());
    format!("{hostname}{container_id}").into_bytes()
}

fn load_or_create_salt(path: &Path) -> std::io::Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(salt) if salt.len() == SALT_LEN => Ok(salt),
        Ok(_) => Err(std::io::Error::new(ErrorKind::InvalidData, "salt file has wrong length")),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let mut salt = vec![0u8; SALT_LEN];
            rand::Rng::fill(&mut rand::thread_rng(), &mut salt[..]);
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(path, &salt)?;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
            Ok(salt)
        }
        Err(e) => Err(e),
    }
}

/// Default salt file path under the agent data directory.
pub fn salt_path(data_dir: &Path) -> PathBuf {
    data_dir.join(".token_salt")
}

#[cfg(test)]
#[path = "sealing_tests.rs"]
mod tests;
