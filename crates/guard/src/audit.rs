// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured audit events for security-relevant operations.
//!
//! Components hand events to an [`AuditSink`]; the default sink emits them
//! as structured `tracing` events on the `audit` target. Payloads must be
//! redacted before they reach an event.

use serde::Serialize;
#[cfg(any(test, feature = "test-support"))]
use std::sync::Arc;

/// A security-relevant event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditEvent {
    AuthAttempt { auth_type: String },
    AuthSuccess { agent_id: String },
    AuthFailure { reason: String },
    CommandExec { command: String },
    CommandBlocked { command: String, reason: String },
    ContainerBlocked { image: String, name: String, reason: String },
    RateLimited { method: String, reason: String },
    ConfigUpdate { changed_keys: Vec<String> },
    RpcError { method: String, code: i32, message: String },
    AgentInstalled { agent_id: String, server_id: String },
    AgentTokenRotated { agent_id: String },
    AgentTokenRevoked { agent_id: String },
}

impl AuditEvent {
    /// Stable label of the event kind.
    pub fn action(&self) -> &'static str {
        match self {
            Self::AuthAttempt { .. } => "auth_attempt",
            Self::AuthSuccess { .. } => "auth_success",
            Self::AuthFailure { .. } => "auth_failure",
            Self::CommandExec { .. } => "command_exec",
            Self::CommandBlocked { .. } => "command_blocked",
            Self::ContainerBlocked { .. } => "container_blocked",
            Self::RateLimited { .. } => "rate_limited",
            Self::ConfigUpdate { .. } => "config_update",
            Self::RpcError { .. } => "rpc_error",
            Self::AgentInstalled { .. } => "agent_installed",
            Self::AgentTokenRotated { .. } => "agent_token_rotated",
            Self::AgentTokenRevoked { .. } => "agent_token_revoked",
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default sink: one structured log line per event on the `audit` target.
#[derive(Clone, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, event: AuditEvent) {
        let detail = serde_json::to_string(&event).unwrap_or_else(|_| event.action().to_string());
        tracing::info!(target: "audit", action = event.action(), %detail);
    }
}

/// Test sink that remembers every event.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<parking_lot::Mutex<Vec<AuditEvent>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.action()).collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AuditSink for RecordingSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
