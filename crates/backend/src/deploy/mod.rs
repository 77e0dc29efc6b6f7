// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment orchestrator: install/uninstall/update/refresh one app on
//! one host through the command router.
//!
//! The install path is a strict state machine
//! (`pending → pulling → creating → starting → running`), with
//! best-effort cleanup and a preserved error record on any failure.

mod params;

pub use params::{build_container_params, normalize_host_path, resolve_volumes, ALLOWED_DATA_ROOTS};

use crate::hub::CallError;
use crate::router::CommandRouter;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tomo_core::{
    AppSpec, Clock, InstallId, InstallationRecord, InstallationStatus, ServerId, UserConfig,
};
use tomo_store::{Store, StoreError, UpdateMap};

/// Source of app specifications (catalog ingestion is out of scope).
pub trait AppCatalog: Send + Sync {
    fn get_app(&self, app_id: &str) -> Option<AppSpec>;
}

/// Fixed in-memory catalog.
#[derive(Default)]
pub struct StaticCatalog {
    apps: Mutex<HashMap<String, AppSpec>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, app: AppSpec) {
        self.apps.lock().insert(app.id.clone(), app);
    }
}

impl AppCatalog for StaticCatalog {
    fn get_app(&self, app_id: &str) -> Option<AppSpec> {
        self.apps.lock().get(app_id).cloned()
    }
}

/// Deployment failures. The installation record keeps the message.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("app '{0}' not found in catalog")]
    AppNotFound(String),

    #[error("Pre-flight check failed: {0}")]
    Preflight(String),

    #[error("Failed to pull image: {0}")]
    Pull(String),

    #[error("Failed to create container: {0}")]
    Create(String),

    #[error("{0}")]
    Startup(String),

    #[error("installation not found")]
    NotInstalled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Timeouts and thresholds of the install pipeline.
#[derive(Debug, Clone)]
pub struct DeployLimits {
    pub min_disk_gb: u64,
    pub min_memory_mb: u64,
    pub pull_timeout: Duration,
    pub run_timeout: Duration,
    pub rpc_timeout: Duration,
    pub health_timeout: Duration,
    pub health_poll_interval: Duration,
}

impl Default for DeployLimits {
    fn default() -> Self {
        Self {
            min_disk_gb: 3,
            min_memory_mb: 256,
            pull_timeout: Duration::from_secs(600),
            run_timeout: Duration::from_secs(120),
            rpc_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(60),
            health_poll_interval: Duration::from_secs(3),
        }
    }
}

/// The deployment orchestrator.
pub struct DeploymentService<C: Clock> {
    store: Store,
    catalog: Arc<dyn AppCatalog>,
    router: Arc<CommandRouter<C>>,
    clock: C,
    limits: DeployLimits,
}

impl<C: Clock> DeploymentService<C> {
    pub fn new(
        store: Store,
        catalog: Arc<dyn AppCatalog>,
        router: Arc<CommandRouter<C>>,
        clock: C,
    ) -> Self {
        Self { store, catalog, router, clock, limits: DeployLimits::default() }
    }

    pub fn with_limits(mut self, limits: DeployLimits) -> Self {
        self.limits = limits;
        self
    }

    async fn call(
        &self,
        server_id: &ServerId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        self.router.dispatch(server_id, method, params, timeout).await
    }

    fn record_update(&self, id: &InstallId, updates: UpdateMap) {
        if let Err(error) = self.store.update_installation(id, updates) {
            tracing::error!(install_id = %id, %error, "installation update failed");
        }
    }

    fn set_step(&self, id: &InstallId, status: InstallationStatus, durations: &BTreeMap<String, u64>) {
        let mut updates = Map::new();
        updates.insert("status".into(), json!(status));
        updates.insert("progress".into(), json!(0));
        updates.insert("step_started_at".into(), json!(self.clock.utc_now()));
        updates.insert("step_durations".into(), json!(durations));
        self.record_update(id, updates);
    }

    fn set_progress(&self, id: &InstallId, progress: u8) {
        let mut updates = Map::new();
        updates.insert("progress".into(), json!(progress));
        self.record_update(id, updates);
    }

    fn fail_install(&self, id: &InstallId, message: &str) {
        let mut updates = Map::new();
        updates.insert("status".into(), json!(InstallationStatus::Error));
        updates.insert("error_message".into(), json!(message));
        self.record_update(id, updates);
    }

    /// Install one app on one host.
    ///
    /// On failure the container (and freshly pulled image) are cleaned up
    /// best-effort and the record stays in `error` for inspection.
    pub async fn install(
        &self,
        server_id: &ServerId,
        app_id: &str,
        config: UserConfig,
    ) -> Result<InstallationRecord, DeployError> {
        let app = self.catalog.get_app(app_id).ok_or_else(|| DeployError::AppNotFound(app_id.into()))?;
        self.install_spec(server_id, &app, config).await
    }

    async fn install_spec(
        &self,
        server_id: &ServerId,
        app: &AppSpec,
        config: UserConfig,
    ) -> Result<InstallationRecord, DeployError> {
        let app_id = app.id.as_str();

        // Replace any previous installation of this app
        if let Some(existing) = self.store.get_installation(server_id, app_id) {
            tracing::info!(install_id = %existing.id, container = %existing.container_name, "cleaning up existing installation");
            self.cleanup_container(server_id, &existing.container_name, None).await;
            self.store.delete_installation(server_id, app_id);
        }

        let container_name = format!("{app_id}-{}", nanoid::nanoid!(4));
        let record = self.store.create_installation(
            server_id.clone(),
            app_id,
            &container_name,
            config.clone(),
            self.clock.utc_now(),
        );
        let install_id = record.id.clone();

        match self.run_install(server_id, app, &install_id, &container_name, &config).await {
            Ok(record) => {
                tracing::info!(%app_id, %server_id, "app installed");
                Ok(record)
            }
            Err(error) => {
                tracing::error!(%app_id, %server_id, %error, "install failed");
                Err(error)
            }
        }
    }

    async fn run_install(
        &self,
        server_id: &ServerId,
        app: &AppSpec,
        install_id: &InstallId,
        container_name: &str,
        config: &UserConfig,
    ) -> Result<InstallationRecord, DeployError> {
        let mut durations: BTreeMap<String, u64> = BTreeMap::new();

        // Pre-flight gate: no side effects before it passes
        let preflight = self
            .call(
                server_id,
                "system.preflight_check",
                json!({"min_disk_gb": self.limits.min_disk_gb, "min_memory_mb": self.limits.min_memory_mb}),
                self.limits.rpc_timeout,
            )
            .await
            .map_err(|e| {
                let error = DeployError::Preflight(e.to_string());
                self.fail_install(install_id, &error.to_string());
                error
            })?;
        if !preflight.get("success").and_then(Value::as_bool).unwrap_or(false) {
            let detail = preflight
                .get("errors")
                .and_then(Value::as_array)
                .map(|errors| {
                    errors.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("; ")
                })
                .unwrap_or_else(|| "Unknown error".to_string());
            let error = DeployError::Preflight(detail);
            self.fail_install(install_id, &error.to_string());
            return Err(error);
        }

        // pending → pulling
        let pulling_started = self.clock.now();
        self.set_step(install_id, InstallationStatus::Pulling, &durations);

        let (image, tag) = split_image_tag(&app.docker.image);
        tracing::info!(image = %app.docker.image, "pulling image");
        if let Err(error) = self
            .call(server_id, "docker.images.pull", json!({"image": image, "tag": tag}), self.limits.pull_timeout)
            .await
        {
            let error = DeployError::Pull(error.to_string());
            self.fail_install(install_id, &error.to_string());
            return Err(error);
        }
        self.set_progress(install_id, 100);

        // Volume preparation is best-effort; the run surfaces real errors
        let volumes = resolve_volumes(&app.docker, config, &app.id);
        let bind_volumes: Vec<Value> = volumes
            .iter()
            .filter(|volume| volume.host.starts_with('/'))
            .map(|volume| json!({"host": volume.host, "uid": 1000, "gid": 1000}))
            .collect();
        if !bind_volumes.is_empty() {
            let prepared = self
                .call(
                    server_id,
                    "system.prepare_volumes",
                    json!({"volumes": bind_volumes, "default_uid": 1000, "default_gid": 1000}),
                    Duration::from_secs(60),
                )
                .await;
            match prepared {
                Ok(result) if result.get("success").and_then(Value::as_bool) == Some(true) => {
                    tracing::info!("volume directories prepared");
                }
                Ok(result) => {
                    tracing::warn!(?result, "volume preparation failed, continuing anyway")
                }
                Err(error) => {
                    tracing::warn!(%error, "volume preparation failed, continuing anyway")
                }
            }
        }

        // pulling → creating
        durations.insert("pulling".into(), elapsed_secs(&self.clock, pulling_started));
        let creating_started = self.clock.now();
        self.set_step(install_id, InstallationStatus::Creating, &durations);

        // Restart policy "no" until the health gate passes, so a broken
        // app cannot crash-loop behind our back
        let run_params =
            build_container_params(&app.docker, container_name, config, &app.id, "no");
        tracing::info!(container = container_name, "creating container");
        let created = match self
            .call(server_id, "docker.containers.run", run_params, self.limits.run_timeout)
            .await
        {
            Ok(created) => created,
            Err(error) => {
                let error = DeployError::Create(error.to_string());
                self.fail_install(install_id, &error.to_string());
                self.cleanup_container(server_id, container_name, Some(&app.docker.image)).await;
                return Err(error);
            }
        };
        let container_id = created
            .get("container_id")
            .or_else(|| created.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(container_name)
            .to_string();

        // creating → starting
        durations.insert("creating".into(), elapsed_secs(&self.clock, creating_started));
        let starting_started = self.clock.now();
        self.set_step(install_id, InstallationStatus::Starting, &durations);
        let mut updates = Map::new();
        updates.insert("container_id".into(), json!(container_id));
        self.record_update(install_id, updates);

        // starting → running happens only through the health gate
        if let Err(message) = self
            .health_gate(server_id, &container_id, install_id)
            .await
        {
            self.fail_install(install_id, &message);
            self.cleanup_container(server_id, container_name, Some(&app.docker.image)).await;
            return Err(DeployError::Startup(message));
        }

        // Now the real restart policy; failure here is logged, not fatal
        if app.docker.restart_policy != "no" {
            let update = self
                .call(
                    server_id,
                    "docker.containers.update",
                    json!({"container": container_name, "restart_policy": app.docker.restart_policy}),
                    self.limits.rpc_timeout,
                )
                .await;
            match update {
                Ok(_) => tracing::info!(policy = %app.docker.restart_policy, "restart policy enabled"),
                Err(error) => tracing::warn!(%error, "failed to update restart policy"),
            }
        }

        durations.insert("starting".into(), elapsed_secs(&self.clock, starting_started));

        // Persist what actually got created
        let details = self
            .call(
                server_id,
                "docker.containers.inspect",
                json!({"container": container_name}),
                self.limits.rpc_timeout,
            )
            .await
            .ok();

        let mut updates = Map::new();
        updates.insert("status".into(), json!(InstallationStatus::Running));
        updates.insert("started_at".into(), json!(self.clock.utc_now()));
        updates.insert("progress".into(), json!(100));
        updates.insert("step_durations".into(), json!(durations));
        if let Some(details) = details {
            updates.insert("networks".into(), details.get("networks").cloned().unwrap_or(json!([])));
            updates.insert(
                "named_volumes".into(),
                details.get("named_volumes").cloned().unwrap_or(json!([])),
            );
            updates
                .insert("bind_mounts".into(), details.get("bind_mounts").cloned().unwrap_or(json!([])));
        }
        self.record_update(install_id, updates);

        self.store.get_installation_by_id(install_id).ok_or(DeployError::NotInstalled)
    }

    /// Poll container status until running-and-healthy, crashed, or
    /// timed out. Returns the failure message on error.
    async fn health_gate(
        &self,
        server_id: &ServerId,
        container_id: &str,
        install_id: &InstallId,
    ) -> Result<(), String> {
        let started = self.clock.now();
        let max_wait = self.limits.health_timeout;

        loop {
            let elapsed = self.clock.now().duration_since(started);
            if elapsed >= max_wait {
                return Err(format!(
                    "Container failed to become ready within {}s",
                    max_wait.as_secs()
                ));
            }
            let fraction = elapsed.as_secs_f64() / max_wait.as_secs_f64();

            let status = self
                .call(
                    server_id,
                    "docker.containers.status",
                    json!({"container": container_id, "include_logs": true}),
                    self.limits.rpc_timeout,
                )
                .await;

            let (state, health, restart_count, logs) = match &status {
                Ok(value) => (
                    value.get("status").and_then(Value::as_str).unwrap_or("").to_lowercase(),
                    value.get("health").and_then(Value::as_str).unwrap_or("none").to_lowercase(),
                    value.get("restart_count").and_then(Value::as_u64).unwrap_or(0),
                    value
                        .get("logs")
                        .and_then(Value::as_str)
                        .map(truncate_logs)
                        .unwrap_or_default(),
                ),
                Err(error) => {
                    tracing::warn!(%error, "status poll failed");
                    (String::new(), "none".to_string(), 0, String::new())
                }
            };

            // A restart before the gate passes means startup is broken;
            // the runtime-side policy is "no", so any restart is a crash
            if restart_count > 0 {
                return Err(format!("Container crashed (restarted {restart_count}x): {logs}"));
            }

            match state.as_str() {
                "running" => match health.as_str() {
                    "healthy" | "none" | "" => {
                        self.set_progress(install_id, 100);
                        return Ok(());
                    }
                    "starting" => {
                        self.set_progress(install_id, (90.0_f64.min(fraction * 100.0)) as u8);
                    }
                    "unhealthy" => return Err(format!("Container unhealthy: {logs}")),
                    _ => {
                        self.set_progress(install_id, (80.0_f64.min(fraction * 100.0)) as u8);
                    }
                },
                "exited" | "dead" | "restarting" => {
                    return Err(format!("Container failed ({state}): {logs}"));
                }
                _ => {
                    self.set_progress(install_id, (80.0_f64.min(fraction * 100.0)) as u8);
                }
            }

            tokio::time::sleep(self.limits.health_poll_interval).await;
        }
    }

    /// Best-effort teardown of a container and (optionally) its image.
    async fn cleanup_container(&self, server_id: &ServerId, container: &str, image: Option<&str>) {
        tracing::info!(%container, "cleaning up container");
        let _ = self
            .call(server_id, "docker.containers.stop", json!({"container": container}), self.limits.rpc_timeout)
            .await;
        let _ = self
            .call(
                server_id,
                "docker.containers.remove",
                json!({"container": container, "force": true}),
                self.limits.rpc_timeout,
            )
            .await;
        if let Some(image) = image {
            if let Err(error) = self
                .call(
                    server_id,
                    "docker.images.remove",
                    json!({"image": image, "force": true}),
                    self.limits.rpc_timeout,
                )
                .await
            {
                tracing::debug!(%image, %error, "image removal during cleanup failed");
            }
        }
    }

    /// Uninstall: stop, force-remove, optionally prune data volumes,
    /// delete the record.
    pub async fn uninstall(
        &self,
        server_id: &ServerId,
        app_id: &str,
        remove_data: bool,
    ) -> Result<bool, DeployError> {
        let Some(installation) = self.store.get_installation(server_id, app_id) else {
            tracing::error!(%server_id, %app_id, "installation not found");
            return Ok(false);
        };
        let container = installation.container_name.clone();
        tracing::info!(%container, "uninstalling app");

        let stopped = self
            .call(server_id, "docker.containers.stop", json!({"container": container}), self.limits.rpc_timeout)
            .await;
        tracing::info!(success = stopped.is_ok(), step = "stop", "uninstall step");

        let removed = self
            .call(
                server_id,
                "docker.containers.remove",
                json!({"container": container, "force": true}),
                self.limits.rpc_timeout,
            )
            .await;
        tracing::info!(success = removed.is_ok(), step = "remove", "uninstall step");

        if remove_data {
            let pruned = self
                .call(
                    server_id,
                    "docker.volumes.prune",
                    json!({"filter": format!("label=container={container}")}),
                    Duration::from_secs(60),
                )
                .await;
            tracing::info!(success = pruned.is_ok(), step = "volumes", "uninstall step");
        }

        self.store.delete_installation(server_id, app_id);
        tracing::info!(%app_id, %server_id, "app uninstalled");
        Ok(true)
    }

    /// Update = uninstall (keeping data) + install with the same config,
    /// optionally overriding the app version (and thus the image tag).
    pub async fn update(
        &self,
        server_id: &ServerId,
        app_id: &str,
        version: Option<&str>,
    ) -> Result<InstallationRecord, DeployError> {
        let config = self
            .store
            .get_installation(server_id, app_id)
            .map(|record| record.config)
            .ok_or(DeployError::NotInstalled)?;
        let mut app =
            self.catalog.get_app(app_id).ok_or_else(|| DeployError::AppNotFound(app_id.into()))?;
        if let Some(version) = version {
            let (image, _tag) = split_image_tag(&app.docker.image);
            app.docker.image = format!("{image}:{version}");
            app.version = Some(version.to_string());
        }

        self.uninstall(server_id, app_id, false).await?;
        self.install_spec(server_id, &app, config).await
    }

    /// Start a stopped installation.
    pub async fn start_app(&self, server_id: &ServerId, app_id: &str) -> Result<bool, DeployError> {
        let Some(installation) = self.store.get_installation(server_id, app_id) else {
            return Ok(false);
        };
        let result = self
            .call(
                server_id,
                "docker.containers.start",
                json!({"container": installation.container_name}),
                self.limits.rpc_timeout,
            )
            .await;
        if result.is_err() {
            return Ok(false);
        }
        let mut updates = Map::new();
        updates.insert("status".into(), json!(InstallationStatus::Running));
        updates.insert("started_at".into(), json!(self.clock.utc_now()));
        self.record_update(&installation.id, updates);
        Ok(true)
    }

    /// Stop a running installation.
    pub async fn stop_app(&self, server_id: &ServerId, app_id: &str) -> Result<bool, DeployError> {
        let Some(installation) = self.store.get_installation(server_id, app_id) else {
            return Ok(false);
        };
        let result = self
            .call(
                server_id,
                "docker.containers.stop",
                json!({"container": installation.container_name}),
                self.limits.rpc_timeout,
            )
            .await;
        if result.is_err() {
            return Ok(false);
        }
        let mut updates = Map::new();
        updates.insert("status".into(), json!(InstallationStatus::Stopped));
        self.record_update(&installation.id, updates);
        Ok(true)
    }

    /// Reconcile a record with the live container.
    pub async fn refresh(&self, install_id: &InstallId) -> Result<InstallationRecord, DeployError> {
        let installation =
            self.store.get_installation_by_id(install_id).ok_or(DeployError::NotInstalled)?;

        let inspect = self
            .call(
                &installation.server_id,
                "docker.containers.inspect",
                json!({"container": installation.container_name}),
                self.limits.rpc_timeout,
            )
            .await;

        let mut updates = Map::new();
        match inspect {
            Ok(details) => {
                let docker_status =
                    details.get("status").and_then(Value::as_str).unwrap_or("").to_lowercase();
                let status = translate_status(&docker_status);
                updates.insert("status".into(), json!(status));
                updates
                    .insert("networks".into(), details.get("networks").cloned().unwrap_or(json!([])));
                updates.insert(
                    "named_volumes".into(),
                    details.get("named_volumes").cloned().unwrap_or(json!([])),
                );
                updates.insert(
                    "bind_mounts".into(),
                    details.get("bind_mounts").cloned().unwrap_or(json!([])),
                );
            }
            Err(error) => {
                tracing::warn!(%error, "inspect failed, marking stopped");
                updates.insert("status".into(), json!(InstallationStatus::Stopped));
            }
        }

        Ok(self.store.update_installation(install_id, updates)?)
    }

    /// Purge a failed deployment: container, image, record.
    pub async fn cleanup_failed(
        &self,
        server_id: &ServerId,
        install_id: &InstallId,
    ) -> Result<bool, DeployError> {
        let Some(installation) = self.store.get_installation_by_id(install_id) else {
            return Ok(false);
        };
        let image = self.catalog.get_app(&installation.app_id).map(|app| app.docker.image);
        self.cleanup_container(server_id, &installation.container_name, image.as_deref()).await;
        self.store.delete_installation(server_id, &installation.app_id);
        tracing::info!(%install_id, "cleanup completed");
        Ok(true)
    }

    /// Point-in-time container health summary.
    pub async fn check_container_health(
        &self,
        server_id: &ServerId,
        container: &str,
    ) -> Value {
        let status = self
            .call(
                server_id,
                "docker.containers.status",
                json!({"container": container, "include_logs": true}),
                self.limits.rpc_timeout,
            )
            .await;

        let mut running = false;
        let mut restart_count = 0;
        let mut recent_logs: Vec<String> = Vec::new();
        let mut container_status = "unknown".to_string();
        if let Ok(value) = &status {
            running = value.get("running").and_then(Value::as_bool).unwrap_or(false);
            restart_count = value.get("restart_count").and_then(Value::as_u64).unwrap_or(0);
            container_status =
                value.get("status").and_then(Value::as_str).unwrap_or("unknown").to_string();
            if let Some(logs) = value.get("logs").and_then(Value::as_str) {
                recent_logs =
                    logs.lines().rev().take(20).map(String::from).collect::<Vec<_>>();
                recent_logs.reverse();
            }
        }

        let ports_listening = match self
            .call(
                server_id,
                "docker.containers.inspect",
                json!({"container": container}),
                self.limits.rpc_timeout,
            )
            .await
        {
            Ok(details) => details.get("ports").cloned().unwrap_or(json!([])),
            Err(_) => json!([]),
        };

        json!({
            "container_running": running,
            "container_status": container_status,
            "restart_count": restart_count,
            "recent_logs": recent_logs,
            "ports_listening": ports_listening,
            "healthy": running && restart_count < 3,
        })
    }

    /// Recent container logs as structured lines.
    pub async fn get_container_logs(
        &self,
        server_id: &ServerId,
        container: &str,
        tail: u64,
    ) -> Value {
        match self
            .call(
                server_id,
                "docker.containers.logs",
                json!({"container": container, "tail": tail}),
                self.limits.rpc_timeout,
            )
            .await
        {
            Ok(value) => {
                let lines: Vec<Value> = value
                    .get("logs")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(|line| json!({"timestamp": null, "message": line}))
                    .collect();
                json!({
                    "container_name": container,
                    "line_count": lines.len(),
                    "logs": lines,
                })
            }
            Err(error) => json!({"logs": [], "error": error.to_string()}),
        }
    }
}

/// Docker state → installation status.
fn translate_status(docker_status: &str) -> InstallationStatus {
    match docker_status {
        "running" => InstallationStatus::Running,
        "restarting" => InstallationStatus::Error,
        // exited, created, paused, unknown: the app is not serving
        _ => InstallationStatus::Stopped,
    }
}

/// Split `image[:tag]` at the last colon (registry ports excluded).
fn split_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

fn elapsed_secs<C: Clock>(clock: &C, since: std::time::Instant) -> u64 {
    clock.now().duration_since(since).as_secs()
}

fn truncate_logs(logs: &str) -> String {
    let mut end = logs.len().min(200);
    while !logs.is_char_boundary(end) {
        end -= 1;
    }
    logs[..end].to_string()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
