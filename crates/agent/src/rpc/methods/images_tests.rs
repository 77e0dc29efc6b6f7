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
async fn pull_defaults_tag_to_latest() {
    let (dispatcher, runtime, _dir) = harness();
    let response = dispatcher
        .handle(Request::new("docker.images.pull", json!({"image": "nginx"}), 1))
        .await
        .unwrap();
    assert!(response.is_success());
    assert!(runtime.has_image("nginx:latest"));
}

#[tokio::test]
async fn pull_failure_maps_to_runtime_code() {
    let (dispatcher, runtime, _dir) = harness();
    runtime.fail_op("images.pull", RuntimeError::failed("images.pull", "registry unreachable"));
    let response = dispatcher
        .handle(Request::new("docker.images.pull", json!({"image": "nginx", "tag": "1.27"}), 1))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::CONTAINER_RUNTIME);
}

#[tokio::test]
async fn list_and_remove() {
    let (dispatcher, runtime, _dir) = harness();
    dispatcher
        .handle(Request::new("docker.images.pull", json!({"image": "nginx", "tag": "1.27"}), 1))
        .await
        .unwrap();

    let response =
        dispatcher.handle(Request::new("docker.images.list", json!({}), 2)).await.unwrap();
    assert_eq!(response.result.unwrap().as_array().unwrap().len(), 1);

    dispatcher
        .handle(Request::new("docker.images.remove", json!({"image": "nginx"}), 3))
        .await
        .unwrap();
    assert!(!runtime.has_image("nginx:1.27"));
}
