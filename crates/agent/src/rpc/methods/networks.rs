// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `docker.networks.*` methods.

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
    "bridge".to_string()
}

#[derive(Debug, Deserialize)]
struct RemoveParams {
    name: String,
}

pub fn register(dispatcher: &mut Dispatcher, ctx: Arc<AgentContext>) {
    let list_ctx = ctx.clone();
    dispatcher.register("docker.networks.list", move |_params| {
        let ctx = list_ctx.clone();
        async move { to_value(ctx.runtime.list_networks().await.map_err(runtime_error)?) }
    });

    let create_ctx = ctx.clone();
    dispatcher.register("docker.networks.create", move |params| {
        let ctx = create_ctx.clone();
        async move {
            let params: CreateParams = parse_params(params)?;
            to_value(
                ctx.runtime.create_network(&params.name, &params.driver).await.map_err(runtime_error)?,
            )
        }
    });

    let remove_ctx = ctx;
    dispatcher.register("docker.networks.remove", move |params| {
        let ctx = remove_ctx.clone();
        async move {
            let params: RemoveParams = parse_params(params)?;
            ctx.runtime.remove_network(&params.name).await.map_err(runtime_error)?;
            Ok(json!({"status": "removed"}))
        }
    });
}

#[cfg(test)]
#[path = "networks_tests.rs"]
mod tests;
