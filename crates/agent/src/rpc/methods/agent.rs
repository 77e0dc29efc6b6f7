// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agent.*` and built-in (`config.update`, `metrics.get`) methods.

use crate::context::AgentContext;
use crate::rpc::{parse_params, Dispatcher};
use crate::AGENT_VERSION;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tomo_core::AgentConfigUpdate;
use tomo_guard::AuditEvent;
use tomo_wire::RpcError;

/// Image the agent updates itself from.
const UPDATE_IMAGE: &str = "ghcr.io/tomo/agent";

#[derive(Debug, Deserialize)]
struct UpdateParams {
    version: String,
}

#[derive(Debug, Deserialize)]
struct RotateParams {
    new_token: String,
    #[serde(default = "default_grace")]
    grace_period_seconds: u64,
}

fn default_grace() -> u64 {
    300
}

/// Cancel the shutdown token shortly after replying, so the response
/// still makes it out before the process exits.
fn schedule_shutdown(ctx: &Arc<AgentContext>) {
    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.cancel();
    });
}

pub fn register(dispatcher: &mut Dispatcher, ctx: Arc<AgentContext>) {
    let ping_ctx = ctx.clone();
    dispatcher.register("agent.ping", move |_params| {
        let ctx = ping_ctx.clone();
        async move {
            Ok(json!({
                "status": "ok",
                "version": AGENT_VERSION,
                "agent_id": ctx.agent_id(),
            }))
        }
    });

    let update_ctx = ctx.clone();
    dispatcher.register("agent.update", move |params| {
        let ctx = update_ctx.clone();
        async move {
            let params: UpdateParams = parse_params(params)?;
            tracing::info!(version = %params.version, "updating agent");

            match ctx.runtime.pull_image(UPDATE_IMAGE, &params.version).await {
                Ok(_) => {
                    tracing::info!("update pulled, initiating restart");
                    schedule_shutdown(&ctx);
                    Ok(json!({"status": "updating", "version": params.version}))
                }
                Err(error) => {
                    tracing::error!(%error, "update failed");
                    Ok(json!({"status": "error", "message": error.to_string()}))
                }
            }
        }
    });

    let restart_ctx = ctx.clone();
    dispatcher.register("agent.restart", move |_params| {
        let ctx = restart_ctx.clone();
        async move {
            tracing::info!("restart requested");
            schedule_shutdown(&ctx);
            Ok(json!({"status": "restarting"}))
        }
    });

    let rotate_ctx = ctx.clone();
    dispatcher.register("agent.rotate_token", move |params| {
        let ctx = rotate_ctx.clone();
        async move {
            let params: RotateParams = parse_params(params)?;
            let store = ctx.state_store.clone();
            let outcome =
                tokio::task::spawn_blocking(move || store.rotate_token(&params.new_token))
                    .await
                    .map_err(|_| RpcError::internal())?;

            match outcome {
                Ok(_) => {
                    tracing::info!(
                        grace_period_seconds = params.grace_period_seconds,
                        "token rotated"
                    );
                    Ok(json!({"status": "ok", "rotated_at": Utc::now()}))
                }
                Err(error) => {
                    tracing::error!(%error, "token rotation failed");
                    Ok(json!({"status": "error", "error": error.to_string()}))
                }
            }
        }
    });

    let config_ctx = ctx.clone();
    dispatcher.register("config.update", move |params| {
        let ctx = config_ctx.clone();
        async move {
            let update: AgentConfigUpdate = parse_params(params)?;
            let changed_keys = changed_keys(&update);

            let next = ctx.current_config().merged(update);
            ctx.set_config(next);

            tracing::info!(keys = ?changed_keys, "config updated");
            ctx.audit.record(AuditEvent::ConfigUpdate { changed_keys });
            Ok(json!({"status": "ok"}))
        }
    });

    let metrics_ctx = ctx;
    dispatcher.register("metrics.get", move |_params| {
        let ctx = metrics_ctx.clone();
        async move {
            let report = super::system::collect_metrics(&ctx).await;
            Ok(json!({
                "agent_id": ctx.agent_id(),
                "version": AGENT_VERSION,
                "status": "connected",
                "timestamp": Utc::now().timestamp() as f64,
                "cpu_percent": report.cpu,
                "memory": report.memory,
                "disk": report.disk,
            }))
        }
    });
}

fn changed_keys(update: &AgentConfigUpdate) -> Vec<String> {
    let mut keys = Vec::new();
    if update.server_url.is_some() {
        keys.push("server_url".to_string());
    }
    if update.metrics_interval.is_some() {
        keys.push("metrics_interval".to_string());
    }
    if update.health_interval.is_some() {
        keys.push("health_interval".to_string());
    }
    if update.reconnect_timeout.is_some() {
        keys.push("reconnect_timeout".to_string());
    }
    keys
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
