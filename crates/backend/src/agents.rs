// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent lifecycle: registration codes, token issuance and rotation,
//! stale-status reconciliation.

use crate::settings::Settings;
use crate::tokens;
use chrono::TimeDelta;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tomo_core::{AgentConfigUpdate, AgentId, AgentRecord, AgentStatus, Clock, CodeId, RegistrationCode, ServerId};
use tomo_guard::{AuditEvent, AuditSink};
use tomo_store::Store;

/// Registration-code lifetime.
pub const CODE_EXPIRY_MINUTES: i64 = 5;
/// Pending agents older than this are considered stale.
const STALE_PENDING_MINUTES: i64 = 10;

/// Outcome of a completed registration.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub agent_id: AgentId,
    pub server_id: ServerId,
    pub token: String,
    pub config: AgentConfigUpdate,
}

/// Agent lifecycle service over the record store.
#[derive(Clone)]
pub struct AgentService<C: Clock> {
    store: Store,
    settings: Settings,
    audit: Arc<dyn AuditSink>,
    clock: C,
}

impl<C: Clock> AgentService<C> {
    pub fn new(store: Store, audit: Arc<dyn AuditSink>, clock: C) -> Self {
        Self { settings: Settings::new(store.clone()), store, audit, clock }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn update(&self, id: &AgentId, updates: Map<String, Value>) -> Option<AgentRecord> {
        match self.store.update_agent(id, updates, self.clock.utc_now()) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::error!(agent_id = %id, %error, "agent update failed");
                None
            }
        }
    }

    // === Creation & registration ===

    /// Create an agent for a server (replacing any existing one) and mint
    /// its registration code. Returns the record and the plaintext code,
    /// which is shown once and never stored.
    pub fn create_agent(&self, server_id: ServerId) -> (AgentRecord, String) {
        let now = self.clock.utc_now();
        let record = self.store.create_agent(server_id, now);

        let code = tokens::generate_registration_code();
        self.store.insert_code(RegistrationCode {
            id: CodeId::new(),
            agent_id: record.id.clone(),
            code_hash: tokens::hash_code(&code),
            expires_at: now + TimeDelta::minutes(CODE_EXPIRY_MINUTES),
            used: false,
            created_at: now,
        });
        tracing::info!(agent_id = %record.id, server_id = %record.server_id, "agent created");
        (record, code)
    }

    /// Validate a registration code: must exist, be unused and unexpired.
    pub fn validate_registration_code(&self, code: &str) -> Option<RegistrationCode> {
        let hash = tokens::hash_code(code);
        let row = self.store.get_code_by_hash(&hash)?;
        if !tokens::hashes_equal(&row.code_hash, &hash) {
            return None;
        }
        if row.used {
            tracing::warn!(code_id = %row.id, "registration code already used");
            return None;
        }
        if row.is_expired(self.clock.utc_now()) {
            tracing::warn!(code_id = %row.id, "registration code expired");
            return None;
        }
        Some(row)
    }

    /// Complete a registration: burn the code, issue the first token.
    pub fn complete_registration(&self, code: &str, version: &str) -> Option<RegistrationOutcome> {
        let row = self.validate_registration_code(code)?;
        let now = self.clock.utc_now();

        let token = tokens::generate_token();
        let ttl = TimeDelta::days(self.settings.token_ttl_days() as i64);
        let mut updates = Map::new();
        updates.insert("token_hash".into(), json!(tokens::hash_secret(&token)));
        updates.insert("version".into(), json!(version));
        updates.insert("status".into(), json!(AgentStatus::Connected));
        updates.insert("registered_at".into(), json!(now));
        updates.insert("last_seen".into(), json!(now));
        updates.insert("token_issued_at".into(), json!(now));
        updates.insert("token_expires_at".into(), json!(now + ttl));

        let record = self.update(&row.agent_id, updates)?;
        if let Err(error) = self.store.mark_code_used(&row.id) {
            tracing::error!(code_id = %row.id, %error, "failed to burn registration code");
        }

        self.audit.record(AuditEvent::AgentInstalled {
            agent_id: record.id.to_string(),
            server_id: record.server_id.to_string(),
        });
        tracing::info!(agent_id = %record.id, "registration completed");

        Some(RegistrationOutcome {
            agent_id: record.id,
            server_id: record.server_id,
            token,
            config: self.agent_config(),
        })
    }

    /// WebSocket-facing registration: `(agent_id, token, config)`.
    pub fn register_agent(
        &self,
        code: &str,
        version: Option<&str>,
    ) -> Option<(AgentId, String, AgentConfigUpdate)> {
        self.audit.record(AuditEvent::AuthAttempt { auth_type: "register".to_string() });
        match self.complete_registration(code, version.unwrap_or("unknown")) {
            Some(outcome) => {
                self.audit
                    .record(AuditEvent::AuthSuccess { agent_id: outcome.agent_id.to_string() });
                Some((outcome.agent_id, outcome.token, outcome.config))
            }
            None => {
                self.audit.record(AuditEvent::AuthFailure {
                    reason: "invalid registration code".to_string(),
                });
                None
            }
        }
    }

    // === Token validation & rotation ===

    /// Resolve a plaintext token to its agent.
    ///
    /// Checks the current hash first, then the pending hash; a pending
    /// hit promotes the rotation before returning.
    pub fn validate_token(&self, token: &str) -> Option<AgentRecord> {
        let hash = tokens::hash_secret(token);

        if let Some(record) = self.store.get_agent_by_token_hash(&hash) {
            if tokens::hashes_equal(record.token_hash.as_deref().unwrap_or(""), &hash) {
                return Some(record);
            }
        }

        let record = self.store.get_agent_by_pending_token_hash(&hash)?;
        if !tokens::hashes_equal(record.pending_token_hash.as_deref().unwrap_or(""), &hash) {
            return None;
        }
        if self.complete_rotation(&record.id) {
            return self.store.get_agent(&record.id);
        }
        None
    }

    /// WebSocket-facing authentication: `(agent_id, server_id, config)`.
    pub fn authenticate_agent(
        &self,
        token: &str,
        version: Option<&str>,
    ) -> Option<(AgentId, ServerId, AgentConfigUpdate)> {
        self.audit.record(AuditEvent::AuthAttempt { auth_type: "token".to_string() });
        let Some(record) = self.validate_token(token) else {
            // One generic failure path regardless of which check missed
            self.audit.record(AuditEvent::AuthFailure { reason: "invalid token".to_string() });
            return None;
        };

        let now = self.clock.utc_now();
        let mut updates = Map::new();
        updates.insert("status".into(), json!(AgentStatus::Connected));
        updates.insert("last_seen".into(), json!(now));
        if let Some(version) = version {
            updates.insert("version".into(), json!(version));
        }
        let record = self.update(&record.id, updates)?;

        self.audit.record(AuditEvent::AuthSuccess { agent_id: record.id.to_string() });
        Some((record.id, record.server_id, self.agent_config()))
    }

    /// Start a rotation: store the pending hash and hand back the new
    /// plaintext for delivery to the agent.
    pub fn initiate_rotation(&self, agent_id: &AgentId) -> Option<String> {
        let record = self.store.get_agent(agent_id)?;
        if record.token_hash.is_none() {
            tracing::warn!(%agent_id, "cannot rotate: agent has no token");
            return None;
        }
        if record.pending_token_hash.is_some() {
            tracing::warn!(%agent_id, "rotation already in progress");
            return None;
        }

        let token = tokens::generate_token();
        let mut updates = Map::new();
        updates.insert("pending_token_hash".into(), json!(tokens::hash_secret(&token)));
        self.update(agent_id, updates)?;
        tracing::info!(%agent_id, "token rotation initiated");
        Some(token)
    }

    /// Promote the pending hash to current. Atomic with respect to the
    /// store lock: once this returns, `validate_token` sees the new hash.
    pub fn complete_rotation(&self, agent_id: &AgentId) -> bool {
        let Some(record) = self.store.get_agent(agent_id) else {
            return false;
        };
        let Some(pending) = record.pending_token_hash else {
            return false;
        };

        let now = self.clock.utc_now();
        let ttl = TimeDelta::days(self.settings.token_ttl_days() as i64);
        let mut updates = Map::new();
        updates.insert("token_hash".into(), json!(pending));
        updates.insert("pending_token_hash".into(), Value::Null);
        updates.insert("token_issued_at".into(), json!(now));
        updates.insert("token_expires_at".into(), json!(now + ttl));

        if self.update(agent_id, updates).is_none() {
            return false;
        }
        self.audit.record(AuditEvent::AgentTokenRotated { agent_id: agent_id.to_string() });
        tracing::info!(%agent_id, "token rotation completed");
        true
    }

    /// Abandon an in-flight rotation; the current token stays valid.
    pub fn cancel_rotation(&self, agent_id: &AgentId) -> bool {
        if self.store.get_agent(agent_id).is_none() {
            return false;
        }
        let mut updates = Map::new();
        updates.insert("pending_token_hash".into(), Value::Null);
        let cancelled = self.update(agent_id, updates).is_some();
        if cancelled {
            tracing::info!(%agent_id, "token rotation cancelled");
        }
        cancelled
    }

    /// Agents whose tokens expire within the rotation window and have no
    /// rotation in flight.
    pub fn agents_needing_rotation(&self) -> Vec<AgentRecord> {
        let window = TimeDelta::days(self.settings.rotation_window_days() as i64);
        self.store.agents_with_expiring_tokens(self.clock.utc_now() + window)
    }

    /// In-flight rotations whose grace period has fully elapsed.
    ///
    /// A pending hash must not dangle forever when the agent never
    /// reconnects; the scheduler sweeps these away.
    pub fn rotations_past_grace(&self) -> Vec<AgentRecord> {
        let grace = TimeDelta::seconds(self.settings.rotation_grace_secs() as i64);
        let now = self.clock.utc_now();
        self.store
            .agents_with_pending_rotation()
            .into_iter()
            .filter(|record| record.token_expires_at.is_some_and(|at| at + grace < now))
            .collect()
    }

    pub fn rotation_grace_secs(&self) -> u64 {
        self.settings.rotation_grace_secs()
    }

    /// Clear the token so the agent must re-register.
    pub fn revoke_agent_token(&self, agent_id: &AgentId) -> bool {
        let mut updates = Map::new();
        updates.insert("token_hash".into(), Value::Null);
        updates.insert("pending_token_hash".into(), Value::Null);
        updates.insert("status".into(), json!(AgentStatus::Pending));
        let revoked = self.update(agent_id, updates).is_some();
        if revoked {
            self.audit.record(AuditEvent::AgentTokenRevoked { agent_id: agent_id.to_string() });
        }
        revoked
    }

    // === Presence & reconciliation ===

    pub fn get_agent(&self, agent_id: &AgentId) -> Option<AgentRecord> {
        self.store.get_agent(agent_id)
    }

    pub fn get_agent_by_server(&self, server_id: &ServerId) -> Option<AgentRecord> {
        self.store.get_agent_by_server(server_id)
    }

    pub fn list_agents(&self) -> Vec<AgentRecord> {
        self.store.list_agents()
    }

    pub fn delete_agent(&self, agent_id: &AgentId) -> bool {
        self.store.delete_agent(agent_id)
    }

    /// Mark an agent disconnected (channel closed).
    pub fn mark_disconnected(&self, agent_id: &AgentId) {
        let mut updates = Map::new();
        updates.insert("status".into(), json!(AgentStatus::Disconnected));
        updates.insert("last_seen".into(), json!(self.clock.utc_now()));
        self.update(agent_id, updates);
    }

    /// Record liveness from telemetry.
    pub fn touch(&self, agent_id: &AgentId) {
        let mut updates = Map::new();
        updates.insert("last_seen".into(), json!(self.clock.utc_now()));
        self.update(agent_id, updates);
    }

    /// Startup reconciliation: nothing is connected after a restart, and
    /// pending agents whose code must long since have expired are dead.
    /// Returns how many records were touched.
    pub fn reset_stale_agent_statuses(&self) -> usize {
        let now = self.clock.utc_now();
        let stale_horizon = TimeDelta::minutes(STALE_PENDING_MINUTES);
        let mut reset = 0;

        for record in self.store.list_agents() {
            let new_status = match record.status {
                AgentStatus::Connected => Some(AgentStatus::Disconnected),
                AgentStatus::Pending => {
                    let anchor = record.registered_at.or(record.last_seen);
                    match anchor {
                        Some(at) if now - at <= stale_horizon => None,
                        _ => Some(AgentStatus::Error),
                    }
                }
                _ => None,
            };
            if let Some(status) = new_status {
                let mut updates = Map::new();
                updates.insert("status".into(), json!(status));
                if self.update(&record.id, updates).is_some() {
                    reset += 1;
                }
            }
        }

        if reset > 0 {
            tracing::info!(count = reset, "stale agent statuses reset");
        }
        // Expired codes can go while we are here
        self.store.cleanup_expired_codes(now);
        reset
    }

    /// Config pushed to agents at handshake time.
    fn agent_config(&self) -> AgentConfigUpdate {
        AgentConfigUpdate {
            server_url: None,
            metrics_interval: Some(self.settings.metrics_interval_secs()),
            health_interval: Some(self.settings.health_interval_secs()),
            reconnect_timeout: None,
        }
    }
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
