// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `docker.containers.*` methods.

use crate::context::AgentContext;
use crate::rpc::{parse_params, runtime_error, to_value, Dispatcher};
use crate::runtime::RunRequest;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tomo_guard::{
    validate_container_params, AuditEvent, ContainerPolicyInput, MountRequest,
};
use tomo_wire::RpcError;

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    all: bool,
}

#[derive(Debug, Deserialize)]
struct ContainerParams {
    container: String,
}

#[derive(Debug, Deserialize)]
struct StopParams {
    container: String,
    #[serde(default = "default_stop_timeout")]
    timeout: u64,
}

fn default_stop_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
struct RemoveParams {
    container: String,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct LogsParams {
    container: String,
    #[serde(default = "default_tail")]
    tail: u64,
}

fn default_tail() -> u64 {
    100
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    container: String,
    #[serde(default)]
    include_logs: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    container: String,
    #[serde(default)]
    restart_policy: Option<String>,
}

fn policy_input(request: &RunRequest) -> ContainerPolicyInput {
    ContainerPolicyInput {
        privileged: request.privileged,
        cap_add: request.capabilities.clone(),
        network_mode: request.network_mode.clone(),
        pid_mode: None,
        ipc_mode: None,
        userns_mode: None,
        mounts: request
            .volumes
            .iter()
            .map(|v| MountRequest { host_path: v.host.clone(), mode: v.mode.clone() })
            .collect(),
    }
}

pub fn register(dispatcher: &mut Dispatcher, ctx: Arc<AgentContext>) {
    let list_ctx = ctx.clone();
    dispatcher.register("docker.containers.list", move |params| {
        let ctx = list_ctx.clone();
        async move {
            let params: ListParams = parse_params(params)?;
            to_value(ctx.runtime.list_containers(params.all).await.map_err(runtime_error)?)
        }
    });

    let get_ctx = ctx.clone();
    dispatcher.register("docker.containers.get", move |params| {
        let ctx = get_ctx.clone();
        async move {
            let params: ContainerParams = parse_params(params)?;
            let containers = ctx.runtime.list_containers(true).await.map_err(runtime_error)?;
            let found = containers
                .into_iter()
                .find(|c| c.name == params.container || c.id == params.container)
                .ok_or_else(|| {
                    RpcError::new(
                        tomo_wire::CONTAINER_RUNTIME,
                        format!("no such container: {}", params.container),
                    )
                })?;
            to_value(found)
        }
    });

    let run_ctx = ctx.clone();
    dispatcher.register("docker.containers.run", move |params| {
        let ctx = run_ctx.clone();
        async move {
            let request: RunRequest = parse_params(params)?;

            if let Err(violation) = validate_container_params(&policy_input(&request)) {
                let reason = violation.to_string();
                tracing::warn!(
                    name = request.name.as_deref().unwrap_or(""),
                    %reason,
                    "container creation blocked by security policy"
                );
                ctx.audit.record(AuditEvent::ContainerBlocked {
                    image: request.image.clone(),
                    name: request.name.clone().unwrap_or_default(),
                    reason: reason.clone(),
                });
                return Err(RpcError::new(tomo_wire::CONTAINER_BLOCKED, reason).with_data(json!({
                    "image": request.image,
                    "name": request.name,
                })));
            }

            let redacted = tomo_guard::redact_value(&json!({
                "env": request.env,
                "volumes": request.volumes,
            }));
            tracing::info!(
                image = %request.image,
                name = request.name.as_deref().unwrap_or(""),
                params = %redacted,
                "creating container"
            );

            let created = ctx.runtime.run_container(request).await.map_err(runtime_error)?;
            to_value(created)
        }
    });

    let start_ctx = ctx.clone();
    dispatcher.register("docker.containers.start", move |params| {
        let ctx = start_ctx.clone();
        async move {
            let params: ContainerParams = parse_params(params)?;
            ctx.runtime.start_container(&params.container).await.map_err(runtime_error)?;
            Ok(json!({"status": "started"}))
        }
    });

    let stop_ctx = ctx.clone();
    dispatcher.register("docker.containers.stop", move |params| {
        let ctx = stop_ctx.clone();
        async move {
            let params: StopParams = parse_params(params)?;
            ctx.runtime
                .stop_container(&params.container, params.timeout)
                .await
                .map_err(runtime_error)?;
            Ok(json!({"status": "stopped"}))
        }
    });

    let restart_ctx = ctx.clone();
    dispatcher.register("docker.containers.restart", move |params| {
        let ctx = restart_ctx.clone();
        async move {
            let params: ContainerParams = parse_params(params)?;
            ctx.runtime.restart_container(&params.container).await.map_err(runtime_error)?;
            Ok(json!({"status": "restarted"}))
        }
    });

    let remove_ctx = ctx.clone();
    dispatcher.register("docker.containers.remove", move |params| {
        let ctx = remove_ctx.clone();
        async move {
            let params: RemoveParams = parse_params(params)?;
            ctx.runtime
                .remove_container(&params.container, params.force)
                .await
                .map_err(runtime_error)?;
            Ok(json!({"status": "removed"}))
        }
    });

    let logs_ctx = ctx.clone();
    dispatcher.register("docker.containers.logs", move |params| {
        let ctx = logs_ctx.clone();
        async move {
            let params: LogsParams = parse_params(params)?;
            let logs =
                ctx.runtime.container_logs(&params.container, params.tail).await.map_err(runtime_error)?;
            Ok(json!({"logs": logs}))
        }
    });

    let inspect_ctx = ctx.clone();
    dispatcher.register("docker.containers.inspect", move |params| {
        let ctx = inspect_ctx.clone();
        async move {
            let params: ContainerParams = parse_params(params)?;
            to_value(ctx.runtime.inspect_container(&params.container).await.map_err(runtime_error)?)
        }
    });

    let status_ctx = ctx.clone();
    dispatcher.register("docker.containers.status", move |params| {
        let ctx = status_ctx.clone();
        async move {
            let params: StatusParams = parse_params(params)?;
            to_value(
                ctx.runtime
                    .container_status(&params.container, params.include_logs)
                    .await
                    .map_err(runtime_error)?,
            )
        }
    });

    let stats_ctx = ctx.clone();
    dispatcher.register("docker.containers.stats", move |params| {
        let ctx = stats_ctx.clone();
        async move {
            let params: ContainerParams = parse_params(params)?;
            to_value(ctx.runtime.container_stats(&params.container).await.map_err(runtime_error)?)
        }
    });

    let update_ctx = ctx;
    dispatcher.register("docker.containers.update", move |params| {
        let ctx = update_ctx.clone();
        async move {
            let params: UpdateParams = parse_params(params)?;
            if let Some(policy) = params.restart_policy.as_deref() {
                ctx.runtime
                    .update_restart_policy(&params.container, policy)
                    .await
                    .map_err(runtime_error)?;
            }
            Ok(json!({"status": "updated"}))
        }
    });
}

#[cfg(test)]
#[path = "containers_tests.rs"]
mod tests;
