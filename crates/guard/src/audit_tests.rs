// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn recording_sink_captures_events_in_order() {
    let sink = RecordingSink::new();
    sink.record(AuditEvent::AuthAttempt { auth_type: "token".into() });
    sink.record(AuditEvent::AuthSuccess { agent_id: "agt-1".into() });
    assert_eq!(sink.actions(), vec!["auth_attempt", "auth_success"]);
}

#[test]
fn container_blocked_serializes_with_context() {
    let event = AuditEvent::ContainerBlocked {
        image: "nginx:1.27".into(),
        name: "web".into(),
        reason: "Privileged mode is not allowed".into(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["action"], "container_blocked");
    assert_eq!(value["image"], "nginx:1.27");
    assert_eq!(value["name"], "web");
    assert!(value["reason"].as_str().unwrap().contains("Privileged"));
}

#[test]
fn action_labels_are_snake_case() {
    let event = AuditEvent::AgentTokenRotated { agent_id: "agt-1".into() };
    assert_eq!(event.action(), "agent_token_rotated");
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["action"], "agent_token_rotated");
}

#[test]
fn sink_trait_objects_are_usable() {
    let sink = RecordingSink::new();
    let dynamic: &dyn AuditSink = &sink;
    dynamic.record(AuditEvent::RateLimited { method: "system.exec".into(), reason: "30/min".into() });
    assert_eq!(sink.events().len(), 1);
}
