// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token rotation scheduler.
//!
//! Periodically finds agents whose tokens expire within the rotation
//! window, issues a pending token to each over its channel, and sweeps
//! away rotations whose grace period elapsed without promotion.

use crate::agents::AgentService;
use crate::hub::AgentCaller;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tomo_core::{AgentId, Clock};

/// How many rotations run at once.
const ROTATION_PARALLELISM: usize = 4;
/// Time the agent gets to persist the new token.
const ROTATE_RPC_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(3600);

/// Periodic rotation driver.
pub struct RotationScheduler<C: Clock> {
    agents: AgentService<C>,
    caller: Arc<dyn AgentCaller>,
    scan_interval: Duration,
}

impl<C: Clock> RotationScheduler<C> {
    pub fn new(agents: AgentService<C>, caller: Arc<dyn AgentCaller>) -> Self {
        Self { agents, caller, scan_interval: DEFAULT_SCAN_INTERVAL }
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Run until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.scan_interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("rotation scheduler stopping");
                    return;
                }
            }
            self.tick().await;
        }
    }

    /// One scheduler pass: rotate candidates, then sweep dead pendings.
    pub async fn tick(&self) -> RotationPass {
        let candidates = self.agents.agents_needing_rotation();
        let mut pass = RotationPass::default();

        if !candidates.is_empty() {
            tracing::info!(count = candidates.len(), "token rotation candidates");
            let rotated: Vec<bool> = futures_util::stream::iter(
                candidates.into_iter().map(|record| self.rotate_one(record.id)),
            )
            .buffer_unordered(ROTATION_PARALLELISM)
            .collect()
            .await;
            pass.rotated = rotated.iter().filter(|ok| **ok).count();
            pass.failed = rotated.len() - pass.rotated;
        }

        for record in self.agents.rotations_past_grace() {
            tracing::warn!(agent_id = %record.id, "rotation grace elapsed, cancelling");
            if self.agents.cancel_rotation(&record.id) {
                pass.swept += 1;
            }
        }

        pass
    }

    /// Drive one rotation: pending hash first, then the RPC. A failed
    /// delivery cancels the pending so the agent is retried next pass.
    async fn rotate_one(&self, agent_id: AgentId) -> bool {
        if !self.caller.is_connected(&agent_id) {
            tracing::debug!(%agent_id, "skipping rotation, agent offline");
            return false;
        }
        let Some(token) = self.agents.initiate_rotation(&agent_id) else {
            return false;
        };

        let params = json!({
            "new_token": token,
            "grace_period_seconds": self.agents.rotation_grace_secs(),
        });
        match self.caller.send_command(&agent_id, "agent.rotate_token", params, ROTATE_RPC_TIMEOUT).await
        {
            Ok(result) if result.get("status").and_then(|s| s.as_str()) == Some("ok") => {
                tracing::info!(%agent_id, "agent acknowledged rotation");
                true
            }
            Ok(result) => {
                tracing::warn!(%agent_id, ?result, "agent rejected rotation");
                self.agents.cancel_rotation(&agent_id);
                false
            }
            Err(error) => {
                tracing::warn!(%agent_id, %error, "rotation delivery failed");
                self.agents.cancel_rotation(&agent_id);
                false
            }
        }
    }
}

/// Counters from one scheduler pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationPass {
    pub rotated: usize,
    pub failed: usize,
    pub swept: usize,
}

#[cfg(test)]
#[path = "rotation_tests.rs"]
mod tests;
