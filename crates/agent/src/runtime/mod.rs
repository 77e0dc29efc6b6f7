// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime abstraction.
//!
//! The agent wraps the runtime that already exists on the host. All
//! method handlers go through [`ContainerRuntime`] so tests substitute
//! [`FakeRuntime`]; production uses the bollard-backed singleton.

mod docker;
#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use docker::{shared_runtime, DockerRuntime};
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRuntime, RuntimeCall};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tomo_core::{BindMount, NamedVolume};

/// Runtime operation failures.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("container runtime unreachable: {0}")]
    Unavailable(String),

    #[error("no such container or image: {0}")]
    NotFound(String),

    #[error("{operation} failed: {message}")]
    Failed { operation: &'static str, message: String },
}

impl RuntimeError {
    pub fn failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Failed { operation, message: message.into() }
    }
}

/// One container in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub image: String,
}

/// A volume mount in a run request (`mode` is `ro` or `rw`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host: String,
    pub container: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "rw".to_string()
}

/// Parameters for `docker.containers.run`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// host port (as string) → "container_port/protocol"
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// `"unless-stopped"`, `"on-failure:3"`, `"no"`, …
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedContainer {
    pub id: String,
    pub name: String,
    pub container_id: String,
}

/// Point-in-time container status for the health gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
    /// `none` when the image defines no healthcheck
    pub health: String,
    pub restart_count: u64,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

/// Structured inspect output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectReport {
    pub status: String,
    pub networks: Vec<String>,
    pub named_volumes: Vec<NamedVolume>,
    pub bind_mounts: Vec<BindMount>,
    /// Exposed ports, `"80/tcp"` form
    #[serde(default)]
    pub ports: Vec<String>,
}

/// Container resource statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    pub tags: Vec<String>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulledImage {
    pub id: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    pub driver: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub space_reclaimed: u64,
}

/// The container runtime the agent drives.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<(), RuntimeError>;
    async fn version(&self) -> Result<String, RuntimeError>;

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError>;
    async fn run_container(&self, request: RunRequest) -> Result<CreatedContainer, RuntimeError>;
    async fn start_container(&self, container: &str) -> Result<(), RuntimeError>;
    async fn stop_container(&self, container: &str, timeout_secs: u64) -> Result<(), RuntimeError>;
    async fn restart_container(&self, container: &str) -> Result<(), RuntimeError>;
    async fn remove_container(&self, container: &str, force: bool) -> Result<(), RuntimeError>;
    async fn container_logs(&self, container: &str, tail: u64) -> Result<String, RuntimeError>;
    async fn inspect_container(&self, container: &str) -> Result<InspectReport, RuntimeError>;
    async fn container_status(
        &self,
        container: &str,
        include_logs: bool,
    ) -> Result<StatusReport, RuntimeError>;
    async fn container_stats(&self, container: &str) -> Result<StatsReport, RuntimeError>;
    async fn update_restart_policy(
        &self,
        container: &str,
        policy: &str,
    ) -> Result<(), RuntimeError>;

    async fn list_images(&self) -> Result<Vec<ImageSummary>, RuntimeError>;
    async fn pull_image(&self, image: &str, tag: &str) -> Result<PulledImage, RuntimeError>;
    async fn remove_image(&self, image: &str, force: bool) -> Result<(), RuntimeError>;
    async fn prune_images(&self) -> Result<PruneReport, RuntimeError>;

    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>, RuntimeError>;
    async fn create_volume(&self, name: &str, driver: &str) -> Result<VolumeSummary, RuntimeError>;
    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), RuntimeError>;
    async fn prune_volumes(&self, filter: Option<&str>) -> Result<PruneReport, RuntimeError>;

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError>;
    async fn create_network(&self, name: &str, driver: &str)
        -> Result<NetworkSummary, RuntimeError>;
    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Container counts for telemetry: `(running, stopped)`.
    async fn container_counts(&self) -> Result<(u64, u64), RuntimeError> {
        let containers = self.list_containers(true).await?;
        let running = containers.iter().filter(|c| c.status == "running").count() as u64;
        Ok((running, containers.len() as u64 - running))
    }
}

/// Split `image[:tag]` at the last colon; the default tag is `latest`.
///
/// A colon inside a registry port (`host:5000/img`) is not a tag split.
pub fn split_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
