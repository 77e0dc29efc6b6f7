// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tomo-backend: the control-plane daemon.
//!
//! Holds one WebSocket channel per agent, manages agent lifecycle and
//! token rotation, routes per-host commands to the agent channel or the
//! shell fallback, and drives app deployments through their state
//! machine.

pub mod agents;
pub mod deploy;
pub mod hub;
pub mod rotation;
pub mod router;
pub mod settings;
pub mod tokens;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use agents::{AgentService, RegistrationOutcome};
pub use deploy::{AppCatalog, DeployError, DeploymentService, StaticCatalog};
pub use hub::{AgentCaller, AgentHub, CallError};
pub use rotation::RotationScheduler;
pub use router::{CommandResult, CommandRouter, ExecutionMethod, RoutedExecutor, ShellTransport};
