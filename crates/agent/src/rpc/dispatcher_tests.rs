// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use tomo_guard::RecordingSink;

fn dispatcher(allowed: &[PermissionTier]) -> (Dispatcher, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let mut dispatcher = Dispatcher::new(allowed.iter().copied(), sink.clone());
    dispatcher.register("agent.ping", |_params| async { Ok(json!({"status": "ok"})) });
    dispatcher.register("system.exec", |_params| async { Ok(json!({"exit_code": 0})) });
    dispatcher.register("boom.known", |_params| async {
        Err::<Value, _>(RpcError::internal())
    });
    (dispatcher, sink)
}

fn all_tiers() -> Vec<PermissionTier> {
    vec![PermissionTier::Read, PermissionTier::Execute, PermissionTier::Admin]
}

#[tokio::test]
async fn known_method_returns_result() {
    let (dispatcher, _) = dispatcher(&all_tiers());
    let response = dispatcher.handle(Request::new("agent.ping", json!({}), 1)).await.unwrap();
    assert!(response.is_success());
    assert_eq!(response.result.unwrap()["status"], "ok");
    assert_eq!(response.id, Some(json!(1)));
}

#[tokio::test]
async fn unknown_method_is_32601() {
    let (dispatcher, _) = dispatcher(&all_tiers());
    let response = dispatcher.handle(Request::new("no.such.method", json!({}), 2)).await.unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn empty_method_is_invalid_request() {
    let (dispatcher, _) = dispatcher(&all_tiers());
    let response = dispatcher.handle(Request::new("", json!({}), 3)).await.unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::INVALID_REQUEST);
}

#[tokio::test]
async fn insufficient_tier_is_32001_and_handler_not_run() {
    let (dispatcher, _) = dispatcher(&[PermissionTier::Read]);
    let response = dispatcher
        .handle(Request::new("system.exec", json!({"command": "docker ps"}), 4))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, tomo_wire::PERMISSION_DENIED);
    assert!(error.message.contains("admin"), "{}", error.message);
}

#[tokio::test]
async fn read_tier_still_reaches_read_methods() {
    let (dispatcher, _) = dispatcher(&[PermissionTier::Read]);
    let response = dispatcher.handle(Request::new("agent.ping", json!({}), 5)).await.unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn notification_success_is_suppressed() {
    let (dispatcher, _) = dispatcher(&all_tiers());
    let response = dispatcher.handle(Request::notification("agent.ping", json!({}))).await;
    assert!(response.is_none());
}

#[tokio::test]
async fn notification_error_is_suppressed_but_audited() {
    let (dispatcher, sink) = dispatcher(&all_tiers());
    let response = dispatcher.handle(Request::notification("no.such.method", json!({}))).await;
    assert!(response.is_none());
    assert_eq!(sink.actions(), vec!["rpc_error"]);
}

#[tokio::test]
async fn handler_errors_are_audited_with_code() {
    let (dispatcher, sink) = dispatcher(&all_tiers());
    let response = dispatcher.handle(Request::new("boom.known", json!({}), 6)).await.unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::INTERNAL_ERROR);
    match &sink.events()[0] {
        tomo_guard::AuditEvent::RpcError { method, code, .. } => {
            assert_eq!(method, "boom.known");
            assert_eq!(*code, tomo_wire::INTERNAL_ERROR);
        }
        other => panic!("unexpected audit event: {other:?}"),
    }
}

#[tokio::test]
async fn method_names_are_sorted() {
    let (dispatcher, _) = dispatcher(&all_tiers());
    assert_eq!(dispatcher.method_names(), vec!["agent.ping", "boom.known", "system.exec"]);
}
