// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tomod: backend daemon entry point.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tomo_backend::{AgentHub, AgentService, RotationScheduler};
use tomo_core::SystemClock;
use tomo_guard::TracingSink;
use tomo_store::Store;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "0.0.0.0:8765";
const DEFAULT_STATE_PATH: &str = "tomod-state.json";

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match std::env::var("TOMO_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tomod.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        Err(_) => {
            registry.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let _log_guard = init_tracing();

    let bind = std::env::var("TOMO_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let state_path =
        std::env::var("TOMO_STATE").unwrap_or_else(|_| DEFAULT_STATE_PATH.to_string());

    let store = match Store::open(&state_path) {
        Ok(store) => store,
        Err(error) => {
            tracing::error!(%error, path = %state_path, "cannot open state snapshot");
            return std::process::ExitCode::FAILURE;
        }
    };

    let agents = AgentService::new(store, Arc::new(TracingSink), SystemClock);

    // Nothing survives a restart as connected; clear stale statuses
    agents.reset_stale_agent_statuses();

    let hub = AgentHub::new(agents.clone(), SystemClock);
    let shutdown = CancellationToken::new();

    let listener = match TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, %bind, "cannot bind listener");
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!(%bind, "tomod listening for agents");

    let scheduler = RotationScheduler::new(agents, hub.clone());
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));
    let hub_task = tokio::spawn(hub.serve(listener, shutdown.clone()));

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "signal handler failed");
    }
    tracing::info!("shutting down");
    shutdown.cancel();

    let _ = hub_task.await;
    let _ = scheduler_task.await;
    tracing::info!("tomod stopped");
    std::process::ExitCode::SUCCESS
}
