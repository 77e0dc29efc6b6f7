// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry records.
//!
//! An [`AgentRecord`] is the backend-side row for one agent process bound
//! to one server. Tokens and registration codes are stored as SHA-256 hex
//! hashes only; the plaintext exists on the agent's host and nowhere else.

use crate::config::AgentConfig;
use crate::id::{AgentId, CodeId, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registration code minted, agent has never connected
    Pending,
    /// Live channel open
    Connected,
    /// Previously connected, channel closed
    Disconnected,
    /// Auth or protocol failure
    Error,
}

crate::simple_display! {
    AgentStatus {
        Pending => "pending",
        Connected => "connected",
        Disconnected => "disconnected",
        Error => "error",
    }
}

/// Backend record for one agent.
///
/// Invariants enforced by the store and lifecycle service:
/// - at most one agent per server (create replaces)
/// - `pending_token_hash` is set only while a rotation is outstanding
/// - `token_hash != pending_token_hash`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub server_id: ServerId,
    /// SHA-256 hex of the current token; `None` until registration completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_hash: Option<String>,
    /// SHA-256 hex of the rotation-in-flight token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_token_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_issued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Fresh pending record for a server, as created when a code is minted.
    pub fn new(server_id: ServerId, now: DateTime<Utc>) -> Self {
        Self {
            id: AgentId::new(),
            server_id,
            token_hash: None,
            pending_token_hash: None,
            version: None,
            status: AgentStatus::Pending,
            last_seen: None,
            registered_at: None,
            token_issued_at: None,
            token_expires_at: None,
            config: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Single-use registration code binding one agent record to one future
/// connection. Only the hash of the normalized code is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationCode {
    pub id: CodeId,
    pub agent_id: AgentId,
    /// SHA-256 hex of the normalized (dashes stripped, upper-cased) code
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl RegistrationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
