// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `docker.volumes.*` methods.

use crate::context::AgentContext;
use crate::rpc::{parse_params, runtime_error, to_value, Dispatcher};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct CreateParams {
    name: String,
    #[serde(default = "default_driver")]
    driver: String,
}

fn default_driver() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize)]
struct RemoveParams {
    name: String,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PruneParams {
    /// e.g. `label=container=app-x-ab12`
    #[serde(default)]
    filter: Option<String>,
}

pub fn register(dispatcher: &mut Dispatcher, ctx: Arc<AgentContext>) {
    let list_ctx = ctx.clone();
    dispatcher.register("docker.volumes.list", move |_params| {
        let ctx = list_ctx.clone();
        async move { to_value(ctx.runtime.list_volumes().await.map_err(runtime_error)?) }
    });

    let create_ctx = ctx.clone();
    dispatcher.register("docker.volumes.create", move |params| {
        let ctx = create_ctx.clone();
        async move {
            let params: CreateParams = parse_params(params)?;
            to_value(
                ctx.runtime.create_volume(&params.name, &params.driver).await.map_err(runtime_error)?,
            )
        }
    });

    let remove_ctx = ctx.clone();
    dispatcher.register("docker.volumes.remove", move |params| {
        let ctx = remove_ctx.clone();
        async move {
            let params: RemoveParams = parse_params(params)?;
            ctx.runtime.remove_volume(&params.name, params.force).await.map_err(runtime_error)?;
            Ok(json!({"status": "removed"}))
        }
    });

    let prune_ctx = ctx;
    dispatcher.register("docker.volumes.prune", move |params| {
        let ctx = prune_ctx.clone();
        async move {
            let params: PruneParams = parse_params(params)?;
            to_value(ctx.runtime.prune_volumes(params.filter.as_deref()).await.map_err(runtime_error)?)
        }
    });
}

#[cfg(test)]
#[path = "volumes_tests.rs"]
mod tests;
