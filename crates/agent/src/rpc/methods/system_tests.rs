// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::{FakeRuntime, RuntimeError};
use crate::state::StateStore;
use tomo_core::AgentConfig;
use tomo_guard::{PermissionTier, RecordingSink};
use tomo_wire::Request;

fn harness() -> (Dispatcher, Arc<FakeRuntime>, Arc<RecordingSink>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let sink = Arc::new(RecordingSink::new());
    let ctx = Arc::new(AgentContext::new(
        AgentConfig::default(),
        Arc::new(StateStore::open(dir.path()).unwrap()),
        runtime.clone(),
        sink.clone(),
    ));
    let mut dispatcher = Dispatcher::new(
        [PermissionTier::Read, PermissionTier::Execute, PermissionTier::Admin],
        sink.clone(),
    );
    register(&mut dispatcher, ctx);
    (dispatcher, runtime, sink, dir)
}

#[yare::parameterized(
    simple = { "hostname", vec!["hostname"], false },
    with_args = { "docker ps -a", vec!["docker", "ps", "-a"], false },
    pipes = { "df -h | head", vec!["sh", "-c", "df -h | head"], true },
    redirect = { "docker image inspect x > /dev/null 2>&1", vec!["sh", "-c", "docker image inspect x > /dev/null 2>&1"], true },
)]
fn command_preparation(command: &str, expected: Vec<&str>, shell: bool) {
    let (argv, used_shell) = prepare_command(command);
    assert_eq!(argv, expected);
    assert_eq!(used_shell, shell);
}

#[tokio::test]
async fn exec_runs_allowlisted_command() {
    let (dispatcher, _, sink, _dir) = harness();
    let response = dispatcher
        .handle(Request::new("system.exec", json!({"command": "hostname"}), 1))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["exit_code"], 0);
    assert!(!result["stdout"].as_str().unwrap().is_empty());
    assert!(sink.actions().contains(&"command_exec"));
}

#[tokio::test]
async fn exec_blocks_non_allowlisted_with_32005() {
    let (dispatcher, _, sink, _dir) = harness();
    let response = dispatcher
        .handle(Request::new("system.exec", json!({"command": "rm -rf /"}), 1))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::COMMAND_BLOCKED);
    assert!(sink.actions().contains(&"command_blocked"));
}

#[tokio::test]
async fn exec_timeout_above_entry_cap_is_blocked() {
    let (dispatcher, _, _, _dir) = harness();
    let response = dispatcher
        .handle(Request::new("system.exec", json!({"command": "docker ps", "timeout": 301}), 1))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, tomo_wire::COMMAND_BLOCKED);
}

#[tokio::test]
async fn preflight_reports_runtime_and_resources() {
    let (dispatcher, _, _, _dir) = harness();
    let response = dispatcher
        .handle(Request::new("system.preflight_check", json!({}), 1))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["docker"]["ok"], true);
    assert_eq!(result["docker"]["version"], "24.0.0-fake");
    assert!(result["memory"]["total_mb"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn preflight_fails_when_runtime_down() {
    let (dispatcher, runtime, _, _dir) = harness();
    runtime.fail_op("ping", RuntimeError::Unavailable("socket gone".into()));
    let response = dispatcher
        .handle(Request::new("system.preflight_check", json!({}), 1))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["success"], false);
    assert!(result["errors"][0].as_str().unwrap().contains("not responding"));
}

#[tokio::test]
async fn preflight_impossible_memory_requirement_fails() {
    let (dispatcher, _, _, _dir) = harness();
    // No host has this much free memory
    let response = dispatcher
        .handle(
            Request::new("system.preflight_check", json!({"min_memory_mb": u64::MAX / (1 << 21)}), 1),
        )
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["success"], false);
    assert!(result["errors"].as_array().unwrap().iter().any(|e| {
        e.as_str().unwrap().contains("MB free, need")
    }));
}

#[tokio::test]
async fn prepare_volumes_skips_disallowed_paths() {
    let (dispatcher, _, _, _dir) = harness();
    let response = dispatcher
        .handle(Request::new(
            "system.prepare_volumes",
            json!({"volumes": [
                {"host": "/etc/passwd-dir"},
                {"host": "named-volume"},
            ]}),
            1,
        ))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["success"], true);
    let results = result["results"].as_array().unwrap();
    assert_eq!(results[0]["status"], "skipped");
    assert!(results[0]["reason"].as_str().unwrap().contains("not in allowed paths"));
    assert_eq!(results[1]["status"], "skipped");
    assert_eq!(results[1]["reason"], "named volume");
}

#[tokio::test]
async fn system_info_reports_host_and_runtime() {
    let (dispatcher, _, _, _dir) = harness();
    let response = dispatcher.handle(Request::new("system.info", json!({}), 1)).await.unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["docker_version"], "24.0.0-fake");
    assert!(!result["hostname"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn get_metrics_has_wire_shape() {
    let (dispatcher, runtime, _, _dir) = harness();
    runtime.add_container("web", "running");
    let response =
        dispatcher.handle(Request::new("system.get_metrics", json!({}), 1)).await.unwrap();
    let result = response.result.unwrap();
    assert!(result["cpu"].is_number());
    assert!(result["memory"]["total"].as_u64().unwrap() > 0);
    assert_eq!(result["containers"]["running"], 1);
}
