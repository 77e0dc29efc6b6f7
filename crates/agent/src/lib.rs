// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tomo-agent: the on-host agent process.
//!
//! Maintains one WebSocket channel to the backend, authenticates or
//! registers, serves JSON-RPC against the local container runtime, and
//! pushes periodic telemetry. Reconnects forever with jittered backoff.

pub mod agent;
pub mod collectors;
pub mod connection;
pub mod context;
pub mod env;
pub mod host;
pub mod rpc;
pub mod runtime;
pub mod sealing;
pub mod state;

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use agent::Agent;
pub use context::{AgentContext, SharedConfig};
pub use env::EnvConfig;
#[cfg(any(test, feature = "test-support"))]
pub use runtime::FakeRuntime;
pub use runtime::{ContainerRuntime, RuntimeError};
pub use state::{PersistedState, StateStore};
