// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Installation records and their status machine.
//!
//! One record per `(server, app)` pair, created when an install starts and
//! mutated only by the deployment orchestrator until it reaches a terminal
//! status.

use crate::id::{InstallId, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of one installation.
///
/// The install path is `pending → pulling → creating → starting → running`;
/// any step may drop to `error`. `stopped` is reached from `running` via
/// stop or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
    Pending,
    Pulling,
    Creating,
    Starting,
    Running,
    Stopped,
    Error,
}

crate::simple_display! {
    InstallationStatus {
        Pending => "pending",
        Pulling => "pulling",
        Creating => "creating",
        Starting => "starting",
        Running => "running",
        Stopped => "stopped",
        Error => "error",
    }
}

impl InstallationStatus {
    /// Whether a transition to `next` follows the install state machine.
    pub fn can_transition_to(self, next: Self) -> bool {
        use InstallationStatus::*;
        match (self, next) {
            // Any non-terminal step may fail
            (Pending | Pulling | Creating | Starting, Error) => true,
            (Pending, Pulling) => true,
            (Pulling, Creating) => true,
            (Creating, Starting) => true,
            (Starting, Running) => true,
            (Running, Stopped) | (Stopped, Running) => true,
            // Refresh may observe a crashed container
            (Running, Error) | (Error, Stopped) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Running | Self::Stopped | Self::Error)
    }
}

/// User-supplied overrides for an install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Container-port (as string) → host-port overrides
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Container-path → host-path overrides
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
}

/// A named volume attached to the container, from inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedVolume {
    pub name: String,
    pub destination: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

/// A bind mount attached to the container, from inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub source: String,
    pub destination: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "rw".to_string()
}

/// One app installation on one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub id: InstallId,
    pub server_id: ServerId,
    pub app_id: String,
    pub container_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub status: InstallationStatus,
    #[serde(default)]
    pub config: UserConfig,
    /// Percent progress of the current step
    #[serde(default)]
    pub progress: u8,
    /// When the current step began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_started_at: Option<DateTime<Utc>>,
    /// Elapsed seconds per completed step, in install order
    #[serde(default)]
    pub step_durations: BTreeMap<String, u64>,
    pub installed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub named_volumes: Vec<NamedVolume>,
    #[serde(default)]
    pub bind_mounts: Vec<BindMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl InstallationRecord {
    pub fn new(
        server_id: ServerId,
        app_id: impl Into<String>,
        container_name: impl Into<String>,
        config: UserConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InstallId::new(),
            server_id,
            app_id: app_id.into(),
            container_name: container_name.into(),
            container_id: None,
            status: InstallationStatus::Pending,
            config,
            progress: 0,
            step_started_at: None,
            step_durations: BTreeMap::new(),
            installed_at: now,
            started_at: None,
            networks: Vec::new(),
            named_volumes: Vec::new(),
            bind_mounts: Vec::new(),
            error_message: None,
        }
    }
}

/// Test builder for installation records.
#[cfg(any(test, feature = "test-support"))]
pub struct InstallationBuilder {
    server_id: ServerId,
    app_id: String,
    container_name: String,
    status: InstallationStatus,
    config: UserConfig,
}

#[cfg(any(test, feature = "test-support"))]
impl InstallationBuilder {
    pub fn new(server_id: impl Into<ServerId>, app_id: impl Into<String>) -> Self {
        let app_id = app_id.into();
        Self {
            server_id: server_id.into(),
            container_name: format!("{app_id}-test"),
            app_id,
            status: InstallationStatus::Pending,
            config: UserConfig::default(),
        }
    }

    pub fn container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    pub fn status(mut self, status: InstallationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn config(mut self, config: UserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self, now: DateTime<Utc>) -> InstallationRecord {
        let mut record =
            InstallationRecord::new(self.server_id, self.app_id, self.container_name, self.config, now);
        record.status = self.status;
        record
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
