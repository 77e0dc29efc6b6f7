// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn hash_is_hex_sha256() {
    let hash = hash_secret("token");
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn hash_is_deterministic_and_input_sensitive() {
    assert_eq!(hash_secret("a"), hash_secret("a"));
    assert_ne!(hash_secret("a"), hash_secret("b"));
}

#[test]
fn generated_tokens_are_long_and_unique() {
    let token = generate_token();
    assert!(token.len() > 20);
    assert_ne!(token, generate_token());
}

#[test]
fn registration_codes_have_dashed_format() {
    let code = generate_registration_code();
    let groups: Vec<&str> = code.split('-').collect();
    assert_eq!(groups.len(), 4);
    for group in groups {
        assert_eq!(group.len(), 4);
        assert!(group.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}

#[yare::parameterized(
    dashed = { "AB12-CD34-EF56-7890" },
    plain = { "AB12CD34EF567890" },
    lowercase = { "ab12-cd34-ef56-7890" },
)]
fn code_hash_ignores_formatting(variant: &str) {
    assert_eq!(hash_code(variant), hash_code("AB12-CD34-EF56-7890"));
}

#[test]
fn constant_time_compare_agrees_with_eq() {
    let a = hash_secret("x");
    let b = hash_secret("x");
    let c = hash_secret("y");
    assert!(hashes_equal(&a, &b));
    assert!(!hashes_equal(&a, &c));
    assert!(!hashes_equal(&a, "short"));
}
