// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App specification as provided by the catalog.
//!
//! The orchestrator consumes these; where they come from (marketplace
//! ingestion) is outside the core.

use serde::{Deserialize, Serialize};

/// One deployable application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSpec {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub docker: DockerSpec,
}

/// Container configuration for an app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSpec {
    /// Image reference, optionally with tag (`nginx:1.27`)
    pub image: String,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    /// Restart policy applied after the health gate passes
    #[serde(default = "default_restart_policy")]
    pub restart_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_restart_policy() -> String {
    "unless-stopped".to_string()
}

/// Port exposed by an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub container: u16,
    pub host: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Volume requested by an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub readonly: bool,
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
