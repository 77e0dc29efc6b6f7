// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runtime configuration.
//!
//! The backend pushes partial updates ([`AgentConfigUpdate`]) over the
//! channel; the agent merges them shallowly into the running config and the
//! telemetry loops re-read the intervals on every tick.

use serde::{Deserialize, Serialize};

pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RECONNECT_TIMEOUT_SECS: u64 = 30;

/// Agent runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub server_url: String,
    /// One-time registration code; only meaningful before first registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_code: Option<String>,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval: u64,
    #[serde(default = "default_health_interval")]
    pub health_interval: u64,
    #[serde(default = "default_reconnect_timeout")]
    pub reconnect_timeout: u64,
}

fn default_metrics_interval() -> u64 {
    DEFAULT_METRICS_INTERVAL_SECS
}

fn default_health_interval() -> u64 {
    DEFAULT_HEALTH_INTERVAL_SECS
}

fn default_reconnect_timeout() -> u64 {
    DEFAULT_RECONNECT_TIMEOUT_SECS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            register_code: None,
            metrics_interval: DEFAULT_METRICS_INTERVAL_SECS,
            health_interval: DEFAULT_HEALTH_INTERVAL_SECS,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    /// Apply a server-pushed partial update (shallow merge).
    pub fn merge(&mut self, update: AgentConfigUpdate) {
        if let Some(url) = update.server_url {
            self.server_url = url;
        }
        if let Some(interval) = update.metrics_interval {
            self.metrics_interval = interval;
        }
        if let Some(interval) = update.health_interval {
            self.health_interval = interval;
        }
        if let Some(timeout) = update.reconnect_timeout {
            self.reconnect_timeout = timeout;
        }
    }

    /// Copy with the update applied, for copy-on-write swaps.
    pub fn merged(&self, update: AgentConfigUpdate) -> Self {
        let mut next = self.clone();
        next.merge(update);
        next
    }
}

/// Partial config as pushed by the server (`config.update`, handshake replies).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_timeout: Option<u64>,
}

impl AgentConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
