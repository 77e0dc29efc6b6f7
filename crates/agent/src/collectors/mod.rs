// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry collectors.
//!
//! Two background tasks per connection push `metrics.update` and
//! `health.status` notifications at the intervals in the live config
//! (re-read every tick so server pushes take effect). Dropping a frame
//! on a closed channel just ends the task; telemetry is best-effort.

use crate::context::AgentContext;
use crate::rpc::methods::system::collect_metrics;
use crate::AGENT_VERSION;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tomo_core::HealthReport;
use tomo_wire::Request;

/// Handles for a connection's collector tasks.
pub struct Collectors {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Collectors {
    /// Spawn both collector loops, writing frames into `outgoing`.
    pub fn spawn(ctx: Arc<AgentContext>, outgoing: mpsc::Sender<String>) -> Self {
        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(metrics_loop(ctx.clone(), outgoing.clone(), cancel.clone())),
            tokio::spawn(health_loop(ctx, outgoing, cancel.clone())),
        ];
        Self { cancel, tasks }
    }

    /// Cancel both loops and wait for them to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::debug!("collectors stopped");
    }
}

async fn metrics_loop(
    ctx: Arc<AgentContext>,
    outgoing: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let interval = ctx.current_config().metrics_interval.max(1);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }

        let report = collect_metrics(&ctx).await;
        let note = Request::notification("metrics.update", json!(report));
        match note.encode() {
            Ok(frame) => {
                if outgoing.send(frame).await.is_err() {
                    return; // channel gone, connection is tearing down
                }
                tracing::debug!(cpu = report.cpu, "metrics pushed");
            }
            Err(error) => tracing::error!(%error, "metrics encoding failed"),
        }
    }
}

async fn health_loop(
    ctx: Arc<AgentContext>,
    outgoing: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let interval = ctx.current_config().health_interval.max(1);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }

        let report = HealthReport {
            status: "healthy".to_string(),
            uptime: ctx.uptime_secs(),
            version: AGENT_VERSION.to_string(),
        };
        let note = Request::notification("health.status", json!(report));
        match note.encode() {
            Ok(frame) => {
                if outgoing.send(frame).await.is_err() {
                    return;
                }
                tracing::debug!(uptime = report.uptime, "health reported");
            }
            Err(error) => tracing::error!(%error, "health encoding failed"),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
