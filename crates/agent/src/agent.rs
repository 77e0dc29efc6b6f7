// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent run loop: connect, serve, reconnect with jittered backoff.

use crate::collectors::Collectors;
use crate::connection::{self, ConnectError};
use crate::context::AgentContext;
use crate::env::EnvConfig;
use crate::rpc::{methods, Dispatcher};
use crate::runtime::ContainerRuntime;
use crate::state::StateStore;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tomo_core::SystemClock;
use tomo_guard::{AuditSink, PermissionTier, ReplayGuard};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Jitter fraction added to each backoff sleep.
const JITTER_FACTOR: f64 = 0.2;

/// The agent process: one context, one dispatcher, one reconnect loop.
pub struct Agent {
    ctx: Arc<AgentContext>,
    dispatcher: Arc<Dispatcher>,
    guard: ReplayGuard<SystemClock>,
    dev_mode: bool,
}

impl Agent {
    pub fn new(
        env: EnvConfig,
        state_store: Arc<StateStore>,
        runtime: Arc<dyn ContainerRuntime>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let ctx = Arc::new(AgentContext::new(env.config, state_store, runtime, audit.clone()));

        // The local channel serves the backend, the sole deployment
        // actor, so every tier is granted here.
        let mut dispatcher = Dispatcher::new(
            [PermissionTier::Read, PermissionTier::Execute, PermissionTier::Admin],
            audit,
        );
        methods::register_all(&mut dispatcher, ctx.clone());

        Self {
            ctx,
            dispatcher: Arc::new(dispatcher),
            guard: ReplayGuard::new(SystemClock),
            dev_mode: env.dev_mode,
        }
    }

    /// Handle used by the signal handler to stop the agent.
    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.ctx.shutdown.clone()
    }

    /// Main run loop. Returns when shutdown is requested.
    pub async fn run(&self) {
        let mut backoff = INITIAL_BACKOFF;

        while !self.ctx.shutdown.is_cancelled() {
            match connection::establish(&self.ctx, self.dev_mode).await {
                Ok(established) => {
                    backoff = INITIAL_BACKOFF;
                    self.ctx.set_agent_id(established.agent_id.clone());
                    if let Some(update) = established.config_update {
                        self.ctx.set_config(self.ctx.current_config().merged(update));
                    }

                    let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(64);
                    let collectors = Collectors::spawn(self.ctx.clone(), outgoing_tx.clone());

                    connection::run_session(
                        established.ws,
                        self.dispatcher.clone(),
                        self.guard.clone(),
                        outgoing_rx,
                        outgoing_tx,
                        &self.ctx.shutdown,
                    )
                    .await;

                    collectors.stop().await;
                }
                Err(error @ (ConnectError::NoServerUrl | ConnectError::NoCredentials)) => {
                    // Not retryable without operator action
                    tracing::error!(%error, "cannot connect");
                    return;
                }
                Err(error) => {
                    tracing::error!(%error, "connection failed");
                }
            }

            if self.ctx.shutdown.is_cancelled() {
                break;
            }

            let delay = with_jitter(backoff);
            tracing::info!(delay_secs = format!("{:.1}", delay.as_secs_f64()), "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.ctx.shutdown.cancelled() => break,
            }
            backoff = next_backoff(backoff);
        }

        tracing::info!("agent stopped");
    }
}

/// Double up to the cap.
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// `backoff + U(0, 0.2·backoff)` to avoid thundering-herd reconnects.
fn with_jitter(backoff: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..JITTER_FACTOR);
    backoff.mul_f64(1.0 + jitter)
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
