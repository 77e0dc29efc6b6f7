// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_ids_carry_type_prefix() {
    assert!(AgentId::new().as_str().starts_with("agt-"));
    assert!(ServerId::new().as_str().starts_with("srv-"));
    assert!(InstallId::new().as_str().starts_with("ins-"));
    assert!(CodeId::new().as_str().starts_with("cod-"));
}

#[test]
fn new_ids_are_unique() {
    let a = AgentId::new();
    let b = AgentId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_roundtrips_display() {
    let id = AgentId::from_string("agt-fixed");
    assert_eq!(id.to_string(), "agt-fixed");
    assert_eq!(id, "agt-fixed");
}

#[test]
fn serde_is_transparent() {
    let id = ServerId::from_string("srv-1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"srv-1\"");
    let back: ServerId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn borrow_str_enables_map_lookup() {
    use std::collections::HashMap;
    let mut map: HashMap<AgentId, u32> = HashMap::new();
    map.insert(AgentId::from_string("agt-x"), 7);
    assert_eq!(map.get("agt-x"), Some(&7));
}
