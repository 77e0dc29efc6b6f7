// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agents::AgentService;
use crate::router::ShellTransport;
use crate::testing::{fake_agent, FakeAgent, LoopbackCaller, ScriptedCaller, ScriptedShell};
use tomo_agent::runtime::{InspectReport, StatusReport};
use tomo_agent::ContainerRuntime;
use tomo_core::{AgentId, PortSpec, SystemClock, VolumeSpec};
use tomo_guard::RecordingSink;

fn nginx_app() -> AppSpec {
    AppSpec {
        id: "app-x".into(),
        name: "App X".into(),
        version: Some("1.27".into()),
        docker: tomo_core::DockerSpec {
            image: "nginx:1.27".into(),
            ports: vec![PortSpec { container: 80, host: 8080, protocol: "tcp".into() }],
            volumes: vec![VolumeSpec {
                host_path: "/srv".into(),
                container_path: "/usr/share/nginx/html".into(),
                readonly: true,
            }],
            restart_policy: "unless-stopped".into(),
            network_mode: None,
            privileged: false,
            capabilities: vec![],
        },
    }
}

fn fast_limits() -> DeployLimits {
    DeployLimits {
        health_timeout: Duration::from_millis(200),
        health_poll_interval: Duration::from_millis(5),
        ..DeployLimits::default()
    }
}

struct Harness {
    deploy: DeploymentService<SystemClock>,
    store: Store,
    agent: FakeAgent,
    server: ServerId,
    agent_id: AgentId,
    catalog: Arc<StaticCatalog>,
}

/// Full loopback stack: registered server, connected fake agent,
/// router, orchestrator.
fn harness() -> Harness {
    let store = Store::in_memory();
    let service =
        AgentService::new(store.clone(), Arc::new(RecordingSink::new()), SystemClock);
    let server = ServerId::from_string("srv-1");
    let (record, _code) = service.create_agent(server.clone());

    let caller = LoopbackCaller::new();
    let agent = fake_agent();
    caller.connect(record.id.clone(), agent.dispatcher.clone());

    let shell: Arc<dyn ShellTransport> = Arc::new(ScriptedShell::new());
    let router = Arc::new(crate::router::CommandRouter::new(
        service.clone(),
        caller,
        shell,
        SystemClock,
    ));

    let catalog = Arc::new(StaticCatalog::new());
    catalog.insert(nginx_app());

    let deploy = DeploymentService::new(store.clone(), catalog.clone(), router, SystemClock)
        .with_limits(fast_limits());
    Harness { deploy, store, agent, server, agent_id: record.id, catalog }
}

fn scripted_harness(caller: Arc<ScriptedCaller>) -> (DeploymentService<SystemClock>, Store, ServerId) {
    let store = Store::in_memory();
    let service =
        AgentService::new(store.clone(), Arc::new(RecordingSink::new()), SystemClock);
    let server = ServerId::from_string("srv-1");
    service.create_agent(server.clone());

    let shell: Arc<dyn ShellTransport> = Arc::new(ScriptedShell::new());
    let router = Arc::new(crate::router::CommandRouter::new(service, caller, shell, SystemClock));
    let catalog = Arc::new(StaticCatalog::new());
    catalog.insert(nginx_app());
    let deploy = DeploymentService::new(store.clone(), catalog, router, SystemClock)
        .with_limits(fast_limits());
    (deploy, store, server)
}

#[tokio::test]
async fn install_happy_path_walks_the_state_machine() {
    let h = harness();

    let record = h
        .deploy
        .install(&h.server, "app-x", serde_json::from_value(json!({"ports": {"80": 8080}})).unwrap())
        .await
        .unwrap();

    assert_eq!(record.status, InstallationStatus::Running);
    assert_eq!(record.progress, 100);
    assert!(record.started_at.is_some());
    assert!(record.container_id.is_some());

    // Step durations recorded for every non-terminal step
    assert!(record.step_durations.contains_key("pulling"));
    assert!(record.step_durations.contains_key("creating"));
    assert!(record.step_durations.contains_key("starting"));

    // The real restart policy landed after the health gate
    assert_eq!(
        h.agent.runtime.restart_policy_of(&record.container_name).as_deref(),
        Some("unless-stopped")
    );

    // Inspect details persisted
    assert_eq!(record.networks, vec!["bridge"]);
    assert_eq!(record.bind_mounts.len(), 1);
    assert_eq!(record.bind_mounts[0].source, "/DATA/AppData/app-x/srv");
    assert_eq!(record.bind_mounts[0].destination, "/usr/share/nginx/html");
    assert_eq!(record.bind_mounts[0].mode, "ro");

    // The image was pulled split at the last colon
    assert!(h.agent.runtime.has_image("nginx:1.27"));
}

#[tokio::test]
async fn install_is_unique_per_server_app_and_reinstall_succeeds() {
    let h = harness();
    let first = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();

    assert!(h.deploy.uninstall(&h.server, "app-x", false).await.unwrap());
    assert!(h.store.get_installation(&h.server, "app-x").is_none());

    let second = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.status, InstallationStatus::Running);
    assert_eq!(second.server_id, h.server);
    assert_eq!(second.app_id, "app-x");
}

#[tokio::test]
async fn preflight_memory_failure_stops_before_any_side_effect() {
    let caller = ScriptedCaller::new();
    caller.script(
        "system.preflight_check",
        json!({"success": false, "errors": ["Only 128MB free, need 256MB"]}),
    );
    let (deploy, store, server) = scripted_harness(caller.clone());

    let error = deploy.install(&server, "app-x", UserConfig::default()).await.unwrap_err();
    assert!(error.to_string().contains("256MB"), "{error}");

    // No image pull happened
    assert!(caller.calls_to("docker.images.pull").is_empty());

    // Record preserved in error with the message
    let record = store.get_installation(&server, "app-x").unwrap();
    assert_eq!(record.status, InstallationStatus::Error);
    assert!(record.error_message.unwrap().contains("256MB"));
}

#[tokio::test]
async fn pull_failure_is_terminal_error() {
    let h = harness();
    h.agent.runtime.fail_op(
        "images.pull",
        tomo_agent::RuntimeError::failed("images.pull", "registry unreachable"),
    );

    let error = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap_err();
    assert!(matches!(error, DeployError::Pull(_)));

    let record = h.store.get_installation(&h.server, "app-x").unwrap();
    assert_eq!(record.status, InstallationStatus::Error);
    assert!(record.error_message.unwrap().starts_with("Failed to pull image"));
}

#[tokio::test]
async fn crash_loop_is_caught_and_cleaned_up() {
    let caller = ScriptedCaller::new();
    caller.script("system.preflight_check", json!({"success": true, "errors": []}));
    caller.script("docker.containers.run", json!({"container_id": "c0ffee", "id": "c0ffee"}));
    // First poll looks fine, second reports a runtime restart
    caller.script(
        "docker.containers.status",
        json!({"status": "running", "health": "starting", "restart_count": 0, "logs": ""}),
    );
    caller.script(
        "docker.containers.status",
        json!({"status": "running", "health": "starting", "restart_count": 1, "logs": "segfault"}),
    );
    let (deploy, store, server) = scripted_harness(caller.clone());

    let error = deploy.install(&server, "app-x", UserConfig::default()).await.unwrap_err();
    assert!(error.to_string().starts_with("Container crashed"), "{error}");
    assert!(error.to_string().contains("segfault"));

    let record = store.get_installation(&server, "app-x").unwrap();
    assert_eq!(record.status, InstallationStatus::Error);

    // Cleanup stopped and force-removed the container
    assert!(!caller.calls_to("docker.containers.stop").is_empty());
    let removes = caller.calls_to("docker.containers.remove");
    assert!(removes.iter().any(|params| params["force"] == true));
}

#[tokio::test]
async fn unhealthy_container_fails_the_gate() {
    let caller = ScriptedCaller::new();
    caller.script("system.preflight_check", json!({"success": true, "errors": []}));
    caller.script("docker.containers.run", json!({"container_id": "c1"}));
    caller.script(
        "docker.containers.status",
        json!({"status": "running", "health": "unhealthy", "restart_count": 0, "logs": "bad"}),
    );
    let (deploy, store, server) = scripted_harness(caller);

    let error = deploy.install(&server, "app-x", UserConfig::default()).await.unwrap_err();
    assert!(error.to_string().starts_with("Container unhealthy"), "{error}");
    assert_eq!(store.get_installation(&server, "app-x").unwrap().status, InstallationStatus::Error);
}

#[tokio::test]
async fn exited_container_fails_the_gate() {
    let caller = ScriptedCaller::new();
    caller.script("system.preflight_check", json!({"success": true, "errors": []}));
    caller.script("docker.containers.run", json!({"container_id": "c1"}));
    caller.script(
        "docker.containers.status",
        json!({"status": "exited", "health": "none", "restart_count": 0, "logs": "oom"}),
    );
    let (deploy, _store, server) = scripted_harness(caller);

    let error = deploy.install(&server, "app-x", UserConfig::default()).await.unwrap_err();
    assert!(error.to_string().starts_with("Container failed (exited)"), "{error}");
}

#[tokio::test]
async fn health_gate_times_out_eventually() {
    let caller = ScriptedCaller::new();
    caller.script("system.preflight_check", json!({"success": true, "errors": []}));
    caller.script("docker.containers.run", json!({"container_id": "c1"}));
    for _ in 0..200 {
        caller.script(
            "docker.containers.status",
            json!({"status": "created", "health": "none", "restart_count": 0}),
        );
    }
    let (deploy, store, server) = scripted_harness(caller);

    let error = deploy.install(&server, "app-x", UserConfig::default()).await.unwrap_err();
    assert!(error.to_string().contains("failed to become ready"), "{error}");
    assert_eq!(store.get_installation(&server, "app-x").unwrap().status, InstallationStatus::Error);
}

#[tokio::test]
async fn health_gate_waits_through_starting_phase() {
    let caller = ScriptedCaller::new();
    caller.script("system.preflight_check", json!({"success": true, "errors": []}));
    caller.script("docker.containers.run", json!({"container_id": "c1"}));
    for _ in 0..3 {
        caller.script(
            "docker.containers.status",
            json!({"status": "running", "health": "starting", "restart_count": 0}),
        );
    }
    caller.script(
        "docker.containers.status",
        json!({"status": "running", "health": "healthy", "restart_count": 0}),
    );
    let (deploy, _store, server) = scripted_harness(caller);

    let record = deploy.install(&server, "app-x", UserConfig::default()).await.unwrap();
    assert_eq!(record.status, InstallationStatus::Running);
}

#[tokio::test]
async fn blocked_privileged_app_fails_with_container_blocked() {
    let h = harness();
    let mut app = nginx_app();
    app.id = "app-priv".into();
    app.docker.privileged = true;
    h.catalog.insert(app);

    let error = h.deploy.install(&h.server, "app-priv", UserConfig::default()).await.unwrap_err();
    assert!(error.to_string().contains("-32004"), "{error}");

    // Blocked before the runtime saw a run call
    assert!(h.agent.runtime.ops().iter().all(|op| *op != "containers.run"));

    // The agent audited the block with context
    let blocked = h.agent.audit.events().into_iter().find_map(|event| match event {
        tomo_guard::AuditEvent::ContainerBlocked { image, name, reason } => {
            Some((image, name, reason))
        }
        _ => None,
    });
    let (image, name, reason) = blocked.expect("container_blocked audit event");
    assert_eq!(image, "nginx:1.27");
    assert!(name.starts_with("app-priv-"));
    assert!(reason.contains("Privileged"));
}

#[tokio::test]
async fn uninstall_removes_container_volumes_and_record() {
    let h = harness();
    let record = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();
    let container = record.container_name.clone();

    assert!(h.deploy.uninstall(&h.server, "app-x", true).await.unwrap());
    assert!(!h.agent.runtime.has_container(&container));
    assert!(h.store.get_installation(&h.server, "app-x").is_none());

    // Data volumes pruned by container label
    let prune = h
        .agent
        .runtime
        .calls()
        .into_iter()
        .find(|call| call.op == "volumes.prune")
        .expect("volumes pruned");
    assert_eq!(prune.arg, format!("label=container={container}"));
}

#[tokio::test]
async fn uninstall_missing_app_is_false() {
    let h = harness();
    assert!(!h.deploy.uninstall(&h.server, "ghost", true).await.unwrap());
}

#[tokio::test]
async fn stop_and_start_flip_status() {
    let h = harness();
    h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();

    assert!(h.deploy.stop_app(&h.server, "app-x").await.unwrap());
    assert_eq!(
        h.store.get_installation(&h.server, "app-x").unwrap().status,
        InstallationStatus::Stopped
    );

    assert!(h.deploy.start_app(&h.server, "app-x").await.unwrap());
    assert_eq!(
        h.store.get_installation(&h.server, "app-x").unwrap().status,
        InstallationStatus::Running
    );
}

#[tokio::test]
async fn refresh_translates_docker_status() {
    let h = harness();
    let record = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();

    // Container exited behind our back
    h.agent.runtime.set_inspect(
        &record.container_name,
        InspectReport { status: "exited".into(), networks: vec!["bridge".into()], ..Default::default() },
    );
    let refreshed = h.deploy.refresh(&record.id).await.unwrap();
    assert_eq!(refreshed.status, InstallationStatus::Stopped);

    // Restarting maps to error
    h.agent.runtime.set_inspect(
        &record.container_name,
        InspectReport { status: "restarting".into(), ..Default::default() },
    );
    let refreshed = h.deploy.refresh(&record.id).await.unwrap();
    assert_eq!(refreshed.status, InstallationStatus::Error);
}

#[tokio::test]
async fn refresh_of_vanished_container_marks_stopped() {
    let h = harness();
    let record = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();
    h.agent
        .runtime
        .remove_container(&record.container_name, true)
        .await
        .unwrap();

    let refreshed = h.deploy.refresh(&record.id).await.unwrap();
    assert_eq!(refreshed.status, InstallationStatus::Stopped);
}

#[tokio::test]
async fn update_reinstalls_with_version_override() {
    let h = harness();
    let first = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();

    let updated = h.deploy.update(&h.server, "app-x", Some("1.28")).await.unwrap();
    assert_ne!(first.id, updated.id);
    assert_eq!(updated.status, InstallationStatus::Running);
    assert!(h.agent.runtime.has_image("nginx:1.28"));
}

#[tokio::test]
async fn cleanup_failed_purges_record_and_container() {
    let caller = ScriptedCaller::new();
    caller.script("system.preflight_check", json!({"success": true, "errors": []}));
    caller.script("docker.containers.run", json!({"container_id": "c1"}));
    caller.script(
        "docker.containers.status",
        json!({"status": "exited", "health": "none", "restart_count": 0}),
    );
    let (deploy, store, server) = scripted_harness(caller.clone());

    deploy.install(&server, "app-x", UserConfig::default()).await.unwrap_err();
    let record = store.get_installation(&server, "app-x").unwrap();
    assert_eq!(record.status, InstallationStatus::Error);

    assert!(deploy.cleanup_failed(&server, &record.id).await.unwrap());
    assert!(store.get_installation(&server, "app-x").is_none());
}

#[tokio::test]
async fn health_summary_reports_running_and_logs() {
    let h = harness();
    let record = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();

    let health = h.deploy.check_container_health(&h.server, &record.container_name).await;
    assert_eq!(health["container_running"], true);
    assert_eq!(health["healthy"], true);
    assert_eq!(health["restart_count"], 0);
}

#[tokio::test]
async fn container_logs_are_structured_lines() {
    let h = harness();
    let record = h.deploy.install(&h.server, "app-x", UserConfig::default()).await.unwrap();

    let logs = h.deploy.get_container_logs(&h.server, &record.container_name, 50).await;
    assert_eq!(logs["container_name"], record.container_name.as_str());
    assert!(logs["line_count"].as_u64().unwrap() >= 1);
    assert!(logs["logs"][0]["message"].is_string());
}

#[tokio::test]
async fn install_with_no_agent_fails_preflight() {
    let store = Store::in_memory();
    let service = AgentService::new(store.clone(), Arc::new(RecordingSink::new()), SystemClock);
    let server = ServerId::from_string("srv-1");
    service.create_agent(server.clone());

    // Nothing connected behind the caller
    let caller = LoopbackCaller::new();
    let shell: Arc<dyn ShellTransport> = Arc::new(ScriptedShell::new());
    let router = Arc::new(crate::router::CommandRouter::new(service, caller, shell, SystemClock));
    let catalog = Arc::new(StaticCatalog::new());
    catalog.insert(nginx_app());
    let deploy = DeploymentService::new(store.clone(), catalog, router, SystemClock);

    let error = deploy.install(&server, "app-x", UserConfig::default()).await.unwrap_err();
    assert!(matches!(error, DeployError::Preflight(_)));
    assert!(error.to_string().contains("not connected"));
}

#[tokio::test]
async fn unknown_app_is_rejected_without_record() {
    let h = harness();
    let error = h.deploy.install(&h.server, "ghost", UserConfig::default()).await.unwrap_err();
    assert!(matches!(error, DeployError::AppNotFound(_)));
    assert!(h.store.get_installation(&h.server, "ghost").is_none());
}

#[tokio::test]
async fn status_report_shape_matches_gate_expectations() {
    // The loopback agent's status payload must carry the fields the
    // gate reads
    let h = harness();
    h.agent.runtime.add_container("probe", "running");
    h.agent.runtime.script_status(
        "probe",
        vec![StatusReport {
            status: "running".into(),
            health: "starting".into(),
            restart_count: 0,
            running: true,
            ..Default::default()
        }],
    );
    let value = h
        .deploy
        .check_container_health(&h.server, "probe")
        .await;
    assert_eq!(value["container_status"], "running");
}
