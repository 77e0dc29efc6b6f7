// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::FakeRuntime;
use crate::state::{PersistedState, StateStore};
use tomo_core::{AgentConfig, AgentId};
use tomo_guard::{PermissionTier, RecordingSink};
use tomo_wire::Request;

struct Harness {
    dispatcher: Dispatcher,
    ctx: Arc<AgentContext>,
    store: Arc<StateStore>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::open(dir.path()).unwrap());
    let sink = Arc::new(RecordingSink::new());
    let ctx = Arc::new(AgentContext::new(
        AgentConfig::default(),
        store.clone(),
        Arc::new(FakeRuntime::new()),
        sink.clone(),
    ));
    let mut dispatcher = Dispatcher::new(
        [PermissionTier::Read, PermissionTier::Execute, PermissionTier::Admin],
        sink,
    );
    register(&mut dispatcher, ctx.clone());
    Harness { dispatcher, ctx, store, _dir: dir }
}

#[tokio::test]
async fn ping_reports_version_and_id() {
    let h = harness();
    h.ctx.set_agent_id(AgentId::from_string("agt-1"));
    let response = h.dispatcher.handle(Request::new("agent.ping", json!({}), 1)).await.unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["status"], "ok");
    assert_eq!(result["agent_id"], "agt-1");
    assert_eq!(result["version"], crate::AGENT_VERSION);
}

#[tokio::test]
async fn rotate_token_rewrites_state() {
    let h = harness();
    h.store
        .save(&PersistedState {
            agent_id: "agt-1".into(),
            token: "old-token".into(),
            server_url: "wss://control.example/ws".into(),
            registered_at: Utc::now(),
        })
        .unwrap();

    let response = h
        .dispatcher
        .handle(Request::new(
            "agent.rotate_token",
            json!({"new_token": "new-token", "grace_period_seconds": 120}),
            1,
        ))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["status"], "ok");
    assert!(result["rotated_at"].is_string());

    let state = h.store.load().unwrap().unwrap();
    assert_eq!(state.token, "new-token");
    assert_eq!(state.agent_id, "agt-1");
}

#[tokio::test]
async fn rotate_token_without_state_reports_error_status() {
    let h = harness();
    let response = h
        .dispatcher
        .handle(Request::new("agent.rotate_token", json!({"new_token": "t"}), 1))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["status"], "error");
}

#[tokio::test]
async fn config_update_merges_and_audits() {
    let h = harness();
    let response = h
        .dispatcher
        .handle(Request::new("config.update", json!({"metrics_interval": 5}), 1))
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["status"], "ok");
    assert_eq!(h.ctx.current_config().metrics_interval, 5);
    assert_eq!(h.ctx.current_config().health_interval, 60);
}

#[tokio::test]
async fn agent_update_pull_failure_reports_error() {
    let h = harness();
    let runtime = FakeRuntime::new();
    runtime.fail_op(
        "images.pull",
        crate::runtime::RuntimeError::failed("images.pull", "registry down"),
    );
    // Rebuild a harness around the failing runtime
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let ctx = Arc::new(AgentContext::new(
        AgentConfig::default(),
        Arc::new(StateStore::open(dir.path()).unwrap()),
        Arc::new(runtime),
        sink.clone(),
    ));
    let mut dispatcher = Dispatcher::new([PermissionTier::Admin], sink);
    register(&mut dispatcher, ctx);

    let response = dispatcher
        .handle(Request::new("agent.update", json!({"version": "1.2.0"}), 1))
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["status"], "error");
}

#[tokio::test]
async fn metrics_get_includes_identity() {
    let h = harness();
    h.ctx.set_agent_id(AgentId::from_string("agt-9"));
    let response = h.dispatcher.handle(Request::new("metrics.get", json!({}), 1)).await.unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["agent_id"], "agt-9");
    assert_eq!(result["status"], "connected");
    assert!(result["timestamp"].as_f64().unwrap() > 0.0);
}
