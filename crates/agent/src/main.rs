// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tomo-agent entry point.

use std::sync::Arc;
use tomo_agent::runtime::shared_runtime;
use tomo_agent::{Agent, EnvConfig, StateStore, AGENT_VERSION};
use tomo_guard::TracingSink;
use tracing_subscriber::EnvFilter;

/// Agent data directory (state file + salt).
const DATA_DIR: &str = "/data";

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = AGENT_VERSION, "tomo agent starting");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to start async runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run());
    tracing::info!("agent stopped");
    code
}

async fn run() -> std::process::ExitCode {
    let env = EnvConfig::load();

    let state_store = match StateStore::open(DATA_DIR) {
        Ok(store) => Arc::new(store),
        Err(error) => {
            tracing::error!(%error, dir = DATA_DIR, "cannot open state directory");
            return std::process::ExitCode::FAILURE;
        }
    };

    let container_runtime = match shared_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "cannot reach container runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    let agent = Agent::new(env, state_store, container_runtime, Arc::new(TracingSink));

    let shutdown = agent.shutdown_token();
    tokio::spawn(async move {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(signal) => signal,
            Err(error) => {
                tracing::error!(%error, "cannot install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
        tracing::info!("shutting down");
        shutdown.cancel();
    });

    agent.run().await;
    std::process::ExitCode::SUCCESS
}
