// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry payloads pushed by agents.
//!
//! These are the `params` of the unsolicited `metrics.update` and
//! `health.status` notifications.

use serde::{Deserialize, Serialize};

/// Usage of one resource (memory or disk), in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub used: u64,
    pub total: u64,
    pub percent: f64,
}

impl ResourceUsage {
    pub fn new(used: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64) * 100.0
        };
        Self { used, total, percent }
    }
}

/// Container counts on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerCounts {
    pub running: u64,
    pub stopped: u64,
}

/// Payload of `metrics.update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// CPU usage percent across all cores
    pub cpu: f64,
    pub memory: ResourceUsage,
    pub disk: ResourceUsage,
    pub containers: ContainerCounts,
}

/// Payload of `health.status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// Seconds since agent start
    pub uptime: u64,
    pub version: String,
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
