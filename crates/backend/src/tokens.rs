// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token and registration-code material.
//!
//! Only SHA-256 hex hashes are ever stored; generation happens here and
//! the plaintext goes straight to the agent.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 hex of arbitrary secret material.
pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(digest)
}

/// Constant-time equality for hash strings.
pub fn hashes_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Generate an agent token: 32 random bytes, URL-safe base64.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a registration code: `XXXX-XXXX-XXXX-XXXX` (64 bits of
/// entropy, hex, dashed for readability).
pub fn generate_registration_code() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill(&mut bytes[..]);
    let raw = hex::encode_upper(bytes);
    format!("{}-{}-{}-{}", &raw[..4], &raw[4..8], &raw[8..12], &raw[12..])
}

/// Normalize a registration code before hashing: dashes stripped,
/// upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.replace('-', "").to_uppercase()
}

/// Hash of a normalized registration code.
pub fn hash_code(code: &str) -> String {
    hash_secret(&normalize_code(code))
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tests;
