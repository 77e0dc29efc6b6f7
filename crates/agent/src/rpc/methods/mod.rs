// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's RPC method surface.
//!
//! Each module registers its methods under a dotted prefix; `register_all`
//! wires the full surface onto a dispatcher.

pub mod agent;
pub mod containers;
pub mod images;
pub mod networks;
pub mod system;
pub mod volumes;

use crate::context::AgentContext;
use crate::rpc::Dispatcher;
use std::sync::Arc;

/// Register every method module.
pub fn register_all(dispatcher: &mut Dispatcher, ctx: Arc<AgentContext>) {
    containers::register(dispatcher, ctx.clone());
    images::register(dispatcher, ctx.clone());
    volumes::register(dispatcher, ctx.clone());
    networks::register(dispatcher, ctx.clone());
    system::register(dispatcher, ctx.clone());
    agent::register(dispatcher, ctx);
}
