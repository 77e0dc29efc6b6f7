// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::context::AgentContext;
use crate::rpc::Dispatcher;
use crate::runtime::{FakeRuntime, RuntimeError};
use crate::state::StateStore;
use serde_json::json;
use std::sync::Arc;
use tomo_core::AgentConfig;
use tomo_guard::{PermissionTier, RecordingSink};
use tomo_wire::Request;

fn harness() -> (Dispatcher, Arc<FakeRuntime>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let sink = Arc::new(RecordingSink::new());
    let ctx = Arc::new(AgentContext::new(
        AgentConfig::default(),
        Arc::new(StateStore::open(dir.path()).unwrap()),
        runtime.clone(),
        sink.clone(),
    ));
    let mut dispatcher =
        Dispatcher::new([PermissionTier::Read, PermissionTier::Execute], sink);
    super::register(&mut dispatcher, ctx);
    (dispatcher, runtime, dir)
}

#[tokio::test]
async fn create_defaults_driver_to_bridge() {
    let (dispatcher, _, _dir) = harness();
    let response = dispatcher
        .handle(Request::new("docker.networks.create", json!({"name": "apps"}), 1))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["name"], "apps");
    assert_eq!(result["driver"], "bridge");
}

#[tokio::test]
async fn create_honors_explicit_driver() {
    let (dispatcher, _, _dir) = harness();
    let response = dispatcher
        .handle(Request::new(
            "docker.networks.create",
            json!({"name": "overlay-net", "driver": "overlay"}),
            1,
        ))
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["driver"], "overlay");
}

#[tokio::test]
async fn list_reports_created_networks() {
    let (dispatcher, _, _dir) = harness();
    dispatcher
        .handle(Request::new("docker.networks.create", json!({"name": "apps"}), 1))
        .await
        .unwrap();

    let response =
        dispatcher.handle(Request::new("docker.networks.list", json!({}), 2)).await.unwrap();
    let networks = response.result.unwrap();
    assert_eq!(networks.as_array().unwrap().len(), 1);
    assert_eq!(networks[0]["name"], "apps");
}

#[tokio::test]
async fn remove_deletes_network() {
    let (dispatcher, _, _dir) = harness();
    dispatcher
        .handle(Request::new("docker.networks.create", json!({"name": "apps"}), 1))
        .await
        .unwrap();

    let response = dispatcher
        .handle(Request::new("docker.networks.remove", json!({"name": "apps"}), 2))
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["status"], "removed");

    let response =
        dispatcher.handle(Request::new("docker.networks.list", json!({}), 3)).await.unwrap();
    assert!(response.result.unwrap().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn runtime_failure_maps_to_runtime_code() {
    let (dispatcher, runtime, _dir) = harness();
    runtime.fail_op(
        "networks.remove",
        RuntimeError::failed("networks.remove", "network has active endpoints"),
    );
    let response = dispatcher
        .handle(Request::new("docker.networks.remove", json!({"name": "busy"}), 1))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::CONTAINER_RUNTIME);
}

#[tokio::test]
async fn missing_name_is_invalid_params() {
    let (dispatcher, _, _dir) = harness();
    let response =
        dispatcher.handle(Request::new("docker.networks.create", json!({}), 1)).await.unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::INVALID_PARAMS);
}
