// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory runtime for tests.
//!
//! Records every call, supports per-operation failure injection, and can
//! play back a scripted sequence of status reports per container so the
//! health gate can be driven through its branches.

use super::{
    ContainerRuntime, ContainerSummary, CreatedContainer, ImageSummary, InspectReport,
    NetworkSummary, PruneReport, PulledImage, RunRequest, RuntimeError, StatsReport, StatusReport,
    VolumeSummary,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// One recorded call: operation name and primary argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub op: &'static str,
    pub arg: String,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    image: String,
    status: String,
    restart_policy: String,
    report: StatusReport,
    inspect: InspectReport,
}

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, FakeContainer>,
    images: Vec<String>,
    volumes: Vec<String>,
    networks: Vec<String>,
    status_scripts: HashMap<String, VecDeque<StatusReport>>,
    failures: HashMap<&'static str, RuntimeError>,
    calls: Vec<RuntimeCall>,
    next_id: u64,
}

/// In-memory [`ContainerRuntime`].
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail once with `error` (`containers.run`, `images.pull`, …).
    pub fn fail_op(&self, op: &'static str, error: RuntimeError) {
        self.state.lock().failures.insert(op, error);
    }

    /// Seed a container with a fixed status.
    pub fn add_container(&self, name: &str, status: &str) {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("fake{:08}", state.next_id);
        state.containers.insert(
            name.to_string(),
            FakeContainer {
                id: id.clone(),
                image: "fake:latest".into(),
                status: status.to_string(),
                restart_policy: "no".into(),
                report: StatusReport {
                    status: status.to_string(),
                    health: "none".into(),
                    running: status == "running",
                    ..Default::default()
                },
                inspect: InspectReport {
                    status: status.to_string(),
                    networks: vec!["bridge".into()],
                    ..Default::default()
                },
            },
        );
    }

    /// Script the sequence of reports `container_status` returns for a
    /// container; once drained, the live container state answers.
    pub fn script_status(&self, container: &str, reports: Vec<StatusReport>) {
        self.state.lock().status_scripts.insert(container.to_string(), reports.into());
    }

    /// Replace the inspect report for a container.
    pub fn set_inspect(&self, container: &str, inspect: InspectReport) {
        if let Some(entry) = self.state.lock().containers.get_mut(container) {
            entry.status = inspect.status.clone();
            entry.inspect = inspect;
        }
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.state.lock().calls.iter().map(|c| c.op).collect()
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state.lock().containers.contains_key(name)
    }

    pub fn restart_policy_of(&self, name: &str) -> Option<String> {
        self.state.lock().containers.get(name).map(|c| c.restart_policy.clone())
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.state.lock().images.iter().any(|i| i == reference)
    }

    fn record(&self, op: &'static str, arg: impl Into<String>) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall { op, arg: arg.into() });
        if let Some(error) = state.failures.remove(op) {
            return Err(error);
        }
        Ok(())
    }
}

/// Containers resolve by name or id, as the real runtime does.
fn resolve(state: &FakeState, key: &str) -> Option<String> {
    if state.containers.contains_key(key) {
        return Some(key.to_string());
    }
    state
        .containers
        .iter()
        .find(|(_, container)| container.id == key)
        .map(|(name, _)| name.clone())
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.record("ping", "")
    }

    async fn version(&self) -> Result<String, RuntimeError> {
        self.record("version", "")?;
        Ok("24.0.0-fake".to_string())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.record("containers.list", all.to_string())?;
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| all || c.status == "running")
            .map(|(name, c)| ContainerSummary {
                id: c.id.clone(),
                name: name.clone(),
                status: c.status.clone(),
                image: c.image.clone(),
            })
            .collect())
    }

    async fn run_container(&self, request: RunRequest) -> Result<CreatedContainer, RuntimeError> {
        let name = request.name.clone().unwrap_or_else(|| "unnamed".to_string());
        self.record("containers.run", name.clone())?;

        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("fake{:08}", state.next_id);
        let bind_mounts = request
            .volumes
            .iter()
            .map(|v| tomo_core::BindMount {
                source: v.host.clone(),
                destination: v.container.clone(),
                mode: v.mode.clone(),
            })
            .collect();
        state.containers.insert(
            name.clone(),
            FakeContainer {
                id: id.clone(),
                image: request.image.clone(),
                status: "running".into(),
                restart_policy: request.restart_policy.unwrap_or_else(|| "no".into()),
                report: StatusReport {
                    status: "running".into(),
                    health: "none".into(),
                    running: true,
                    ..Default::default()
                },
                inspect: InspectReport {
                    status: "running".into(),
                    networks: vec![request
                        .network_mode
                        .or(request.network)
                        .unwrap_or_else(|| "bridge".into())],
                    named_volumes: Vec::new(),
                    bind_mounts,
                    ports: request.ports.values().cloned().collect(),
                },
            },
        );
        Ok(CreatedContainer { id: id.clone(), name, container_id: id })
    }

    async fn start_container(&self, container: &str) -> Result<(), RuntimeError> {
        self.record("containers.start", container)?;
        let mut state = self.state.lock();
        let name = resolve(&state, container);
        match name.and_then(|name| state.containers.get_mut(&name)) {
            Some(entry) => {
                entry.status = "running".into();
                entry.report.status = "running".into();
                entry.report.running = true;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(container.to_string())),
        }
    }

    async fn stop_container(&self, container: &str, _timeout_secs: u64) -> Result<(), RuntimeError> {
        self.record("containers.stop", container)?;
        let mut state = self.state.lock();
        let name = resolve(&state, container);
        match name.and_then(|name| state.containers.get_mut(&name)) {
            Some(entry) => {
                entry.status = "exited".into();
                entry.report.status = "exited".into();
                entry.report.running = false;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(container.to_string())),
        }
    }

    async fn restart_container(&self, container: &str) -> Result<(), RuntimeError> {
        self.record("containers.restart", container)
    }

    async fn remove_container(&self, container: &str, force: bool) -> Result<(), RuntimeError> {
        self.record("containers.remove", format!("{container} force={force}"))?;
        let mut state = self.state.lock();
        let name = resolve(&state, container);
        match name {
            Some(name) => {
                state.containers.remove(&name);
                Ok(())
            }
            None if force => Ok(()),
            None => Err(RuntimeError::NotFound(container.to_string())),
        }
    }

    async fn container_logs(&self, container: &str, _tail: u64) -> Result<String, RuntimeError> {
        self.record("containers.logs", container)?;
        Ok(format!("logs for {container}\n"))
    }

    async fn inspect_container(&self, container: &str) -> Result<InspectReport, RuntimeError> {
        self.record("containers.inspect", container)?;
        let state = self.state.lock();
        resolve(&state, container)
            .and_then(|name| state.containers.get(&name))
            .map(|c| c.inspect.clone())
            .ok_or_else(|| RuntimeError::NotFound(container.to_string()))
    }

    async fn container_status(
        &self,
        container: &str,
        _include_logs: bool,
    ) -> Result<StatusReport, RuntimeError> {
        self.record("containers.status", container)?;
        let mut state = self.state.lock();
        let name = resolve(&state, container).unwrap_or_else(|| container.to_string());
        if let Some(queue) = state.status_scripts.get_mut(&name) {
            if let Some(report) = queue.pop_front() {
                return Ok(report);
            }
        }
        state
            .containers
            .get(&name)
            .map(|c| c.report.clone())
            .ok_or_else(|| RuntimeError::NotFound(container.to_string()))
    }

    async fn container_stats(&self, container: &str) -> Result<StatsReport, RuntimeError> {
        self.record("containers.stats", container)?;
        Ok(StatsReport { cpu_percent: 1.5, memory_usage: 64 << 20, memory_limit: 512 << 20 })
    }

    async fn update_restart_policy(
        &self,
        container: &str,
        policy: &str,
    ) -> Result<(), RuntimeError> {
        self.record("containers.update", format!("{container} restart={policy}"))?;
        let mut state = self.state.lock();
        let name = resolve(&state, container);
        match name.and_then(|name| state.containers.get_mut(&name)) {
            Some(entry) => {
                entry.restart_policy = policy.to_string();
                Ok(())
            }
            None => Err(RuntimeError::NotFound(container.to_string())),
        }
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, RuntimeError> {
        self.record("images.list", "")?;
        let state = self.state.lock();
        Ok(state
            .images
            .iter()
            .map(|tag| ImageSummary { id: "sha256:fake".into(), tags: vec![tag.clone()], size: 1 })
            .collect())
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<PulledImage, RuntimeError> {
        let reference = format!("{image}:{tag}");
        self.record("images.pull", reference.clone())?;
        let mut state = self.state.lock();
        if !state.images.contains(&reference) {
            state.images.push(reference.clone());
        }
        Ok(PulledImage { id: "sha256:fake".into(), tags: vec![reference] })
    }

    async fn remove_image(&self, image: &str, _force: bool) -> Result<(), RuntimeError> {
        self.record("images.remove", image)?;
        let mut state = self.state.lock();
        state.images.retain(|i| i != image && !i.starts_with(&format!("{image}:")));
        Ok(())
    }

    async fn prune_images(&self) -> Result<PruneReport, RuntimeError> {
        self.record("images.prune", "")?;
        Ok(PruneReport::default())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>, RuntimeError> {
        self.record("volumes.list", "")?;
        let state = self.state.lock();
        Ok(state
            .volumes
            .iter()
            .map(|name| VolumeSummary {
                name: name.clone(),
                driver: "local".into(),
                mountpoint: format!("/var/lib/docker/volumes/{name}"),
            })
            .collect())
    }

    async fn create_volume(&self, name: &str, driver: &str) -> Result<VolumeSummary, RuntimeError> {
        self.record("volumes.create", name)?;
        self.state.lock().volumes.push(name.to_string());
        Ok(VolumeSummary {
            name: name.to_string(),
            driver: driver.to_string(),
            mountpoint: format!("/var/lib/docker/volumes/{name}"),
        })
    }

    async fn remove_volume(&self, name: &str, _force: bool) -> Result<(), RuntimeError> {
        self.record("volumes.remove", name)?;
        self.state.lock().volumes.retain(|v| v != name);
        Ok(())
    }

    async fn prune_volumes(&self, filter: Option<&str>) -> Result<PruneReport, RuntimeError> {
        self.record("volumes.prune", filter.unwrap_or_default())?;
        Ok(PruneReport::default())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError> {
        self.record("networks.list", "")?;
        let state = self.state.lock();
        Ok(state
            .networks
            .iter()
            .map(|name| NetworkSummary { id: "fakenet".into(), name: name.clone(), driver: "bridge".into() })
            .collect())
    }

    async fn create_network(
        &self,
        name: &str,
        driver: &str,
    ) -> Result<NetworkSummary, RuntimeError> {
        self.record("networks.create", name)?;
        self.state.lock().networks.push(name.to_string());
        Ok(NetworkSummary { id: "fakenet".into(), name: name.to_string(), driver: driver.to_string() })
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("networks.remove", name)?;
        self.state.lock().networks.retain(|n| n != name);
        Ok(())
    }
}
