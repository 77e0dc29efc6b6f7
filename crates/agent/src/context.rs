// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared agent state handed to RPC handlers.

use crate::host::HostProbe;
use crate::runtime::ContainerRuntime;
use crate::state::StateStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tomo_core::{AgentConfig, AgentId, SystemClock};
use tomo_guard::{AuditSink, CommandRateLimiter, CommandValidator};

/// Copy-on-write config: readers clone the inner `Arc` at observation
/// time, writers swap it under the lock. The lock is never held across
/// I/O.
pub type SharedConfig = Arc<RwLock<Arc<AgentConfig>>>;

/// Everything a method handler may need.
pub struct AgentContext {
    config: SharedConfig,
    agent_id: RwLock<Option<AgentId>>,
    pub state_store: Arc<StateStore>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub host: Arc<HostProbe>,
    pub validator: CommandValidator,
    pub rate_limiter: CommandRateLimiter<SystemClock>,
    pub audit: Arc<dyn AuditSink>,
    /// Cancelled to shut the whole agent down
    pub shutdown: CancellationToken,
    started_at: Instant,
}

impl AgentContext {
    pub fn new(
        config: AgentConfig,
        state_store: Arc<StateStore>,
        runtime: Arc<dyn ContainerRuntime>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(Arc::new(config))),
            agent_id: RwLock::new(None),
            state_store,
            runtime,
            host: Arc::new(HostProbe::new()),
            validator: CommandValidator::new(),
            rate_limiter: CommandRateLimiter::new(SystemClock),
            audit,
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    /// Snapshot of the current config.
    pub fn current_config(&self) -> Arc<AgentConfig> {
        Arc::clone(&self.config.read())
    }

    /// Swap in a new config (clone-then-swap).
    pub fn set_config(&self, config: AgentConfig) {
        *self.config.write() = Arc::new(config);
    }

    pub fn agent_id(&self) -> Option<AgentId> {
        self.agent_id.read().clone()
    }

    pub fn set_agent_id(&self, id: AgentId) {
        *self.agent_id.write() = Some(id);
    }

    /// Seconds since agent start.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
