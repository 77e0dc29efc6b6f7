// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `docker.images.*` methods.

use crate::context::AgentContext;
use crate::rpc::{parse_params, runtime_error, to_value, Dispatcher};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct PullParams {
    image: String,
    #[serde(default = "default_tag")]
    tag: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

#[derive(Debug, Deserialize)]
struct RemoveParams {
    image: String,
    #[serde(default)]
    force: bool,
}

pub fn register(dispatcher: &mut Dispatcher, ctx: Arc<AgentContext>) {
    let list_ctx = ctx.clone();
    dispatcher.register("docker.images.list", move |_params| {
        let ctx = list_ctx.clone();
        async move { to_value(ctx.runtime.list_images().await.map_err(runtime_error)?) }
    });

    let pull_ctx = ctx.clone();
    dispatcher.register("docker.images.pull", move |params| {
        let ctx = pull_ctx.clone();
        async move {
            let params: PullParams = parse_params(params)?;
            to_value(ctx.runtime.pull_image(&params.image, &params.tag).await.map_err(runtime_error)?)
        }
    });

    let remove_ctx = ctx.clone();
    dispatcher.register("docker.images.remove", move |params| {
        let ctx = remove_ctx.clone();
        async move {
            let params: RemoveParams = parse_params(params)?;
            ctx.runtime.remove_image(&params.image, params.force).await.map_err(runtime_error)?;
            Ok(json!({"status": "removed"}))
        }
    });

    let prune_ctx = ctx;
    dispatcher.register("docker.images.prune", move |_params| {
        let ctx = prune_ctx.clone();
        async move { to_value(ctx.runtime.prune_images().await.map_err(runtime_error)?) }
    });
}

#[cfg(test)]
#[path = "images_tests.rs"]
mod tests;
