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
async fn create_defaults_driver_to_local() {
    let (dispatcher, _, _dir) = harness();
    let response = dispatcher
        .handle(Request::new("docker.volumes.create", json!({"name": "appdata"}), 1))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["name"], "appdata");
    assert_eq!(result["driver"], "local");
}

#[tokio::test]
async fn list_reports_created_volumes() {
    let (dispatcher, _, _dir) = harness();
    dispatcher
        .handle(Request::new("docker.volumes.create", json!({"name": "appdata"}), 1))
        .await
        .unwrap();

    let response =
        dispatcher.handle(Request::new("docker.volumes.list", json!({}), 2)).await.unwrap();
    let volumes = response.result.unwrap();
    assert_eq!(volumes.as_array().unwrap().len(), 1);
    assert_eq!(volumes[0]["name"], "appdata");
}

#[tokio::test]
async fn remove_deletes_volume() {
    let (dispatcher, _, _dir) = harness();
    dispatcher
        .handle(Request::new("docker.volumes.create", json!({"name": "appdata"}), 1))
        .await
        .unwrap();

    let response = dispatcher
        .handle(Request::new("docker.volumes.remove", json!({"name": "appdata"}), 2))
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["status"], "removed");

    let response =
        dispatcher.handle(Request::new("docker.volumes.list", json!({}), 3)).await.unwrap();
    assert!(response.result.unwrap().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn prune_passes_filter_through() {
    let (dispatcher, runtime, _dir) = harness();
    let response = dispatcher
        .handle(Request::new(
            "docker.volumes.prune",
            json!({"filter": "label=container=app-x-ab12"}),
            1,
        ))
        .await
        .unwrap();
    assert!(response.is_success());

    let prune = runtime
        .calls()
        .into_iter()
        .find(|call| call.op == "volumes.prune")
        .expect("prune call recorded");
    assert_eq!(prune.arg, "label=container=app-x-ab12");
}

#[tokio::test]
async fn prune_without_filter_is_allowed() {
    let (dispatcher, runtime, _dir) = harness();
    let response =
        dispatcher.handle(Request::new("docker.volumes.prune", json!({}), 1)).await.unwrap();
    assert!(response.is_success());

    let prune = runtime
        .calls()
        .into_iter()
        .find(|call| call.op == "volumes.prune")
        .expect("prune call recorded");
    assert_eq!(prune.arg, "");
}

#[tokio::test]
async fn runtime_failure_maps_to_runtime_code() {
    let (dispatcher, runtime, _dir) = harness();
    runtime.fail_op("volumes.remove", RuntimeError::failed("volumes.remove", "volume in use"));
    let response = dispatcher
        .handle(Request::new("docker.volumes.remove", json!({"name": "busy"}), 1))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::CONTAINER_RUNTIME);
}

#[tokio::test]
async fn missing_name_is_invalid_params() {
    let (dispatcher, _, _dir) = harness();
    let response = dispatcher
        .handle(Request::new("docker.volumes.create", json!({"driver": "local"}), 1))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::INVALID_PARAMS);
}
