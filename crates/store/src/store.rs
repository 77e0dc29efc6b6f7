// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record CRUD over the materialized state.

use crate::columns::{apply_agent_column, apply_installation_column, ALLOWED_AGENT_COLUMNS, ALLOWED_INSTALLATION_COLUMNS};
use crate::snapshot::Snapshot;
use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tomo_core::{
    AgentId, AgentRecord, CodeId, InstallId, InstallationRecord, RegistrationCode, ServerId,
    UserConfig,
};

/// A dynamic column → value update.
pub type UpdateMap = serde_json::Map<String, Value>;

/// Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid update column: {column}")]
    UnknownColumn { column: String },

    #[error("invalid value for column {column}: {source}")]
    InvalidValue {
        column: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backend record store.
///
/// Clones share state. Every mutation persists a snapshot when a path is
/// configured; the mutex is never held across the disk write's await
/// points (there are none, writes are synchronous).
#[derive(Clone)]
pub struct Store {
    state: Arc<Mutex<MaterializedState>>,
    snapshot_path: Option<PathBuf>,
}

impl Store {
    /// Volatile store for tests and embedded use.
    pub fn in_memory() -> Self {
        Self { state: Arc::new(Mutex::new(MaterializedState::default())), snapshot_path: None }
    }

    /// Store backed by a snapshot file, loading existing state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = Snapshot::load(&path)?;
        Ok(Self { state: Arc::new(Mutex::new(state)), snapshot_path: Some(path) })
    }

    fn persist(&self, state: &MaterializedState) {
        if let Some(path) = &self.snapshot_path {
            if let Err(error) = Snapshot::new(state.clone()).save(path) {
                tracing::error!(%error, path = %path.display(), "snapshot write failed");
            }
        }
    }

    // === Agents ===

    /// Create an agent for a server, replacing any existing one.
    ///
    /// The replaced agent's registration codes are cascaded away.
    pub fn create_agent(&self, server_id: ServerId, now: DateTime<Utc>) -> AgentRecord {
        let mut state = self.state.lock();
        if let Some(existing) = state.agent_by_server(&server_id).map(|a| a.id.clone()) {
            state.agents.remove(&existing);
            state.codes.retain(|_, code| code.agent_id != existing);
        }
        let record = AgentRecord::new(server_id, now);
        state.agents.insert(record.id.clone(), record.clone());
        self.persist(&state);
        record
    }

    pub fn get_agent(&self, id: &AgentId) -> Option<AgentRecord> {
        self.state.lock().agents.get(id).cloned()
    }

    pub fn get_agent_by_server(&self, server_id: &ServerId) -> Option<AgentRecord> {
        self.state.lock().agent_by_server(server_id).cloned()
    }

    pub fn get_agent_by_token_hash(&self, hash: &str) -> Option<AgentRecord> {
        self.state.lock().agent_by_token_hash(hash).cloned()
    }

    pub fn get_agent_by_pending_token_hash(&self, hash: &str) -> Option<AgentRecord> {
        self.state.lock().agent_by_pending_token_hash(hash).cloned()
    }

    pub fn list_agents(&self) -> Vec<AgentRecord> {
        let mut agents: Vec<_> = self.state.lock().agents.values().cloned().collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        agents
    }

    /// Agents whose current token expires before `before` and have no
    /// rotation in flight.
    pub fn agents_with_expiring_tokens(&self, before: DateTime<Utc>) -> Vec<AgentRecord> {
        let state = self.state.lock();
        let mut agents: Vec<_> = state
            .agents
            .values()
            .filter(|agent| {
                agent.token_hash.is_some()
                    && agent.pending_token_hash.is_none()
                    && agent.token_expires_at.is_some_and(|at| at < before)
            })
            .cloned()
            .collect();
        agents.sort_by_key(|agent| agent.token_expires_at);
        agents
    }

    /// Agents with a rotation in flight, for the grace-expiry sweep.
    pub fn agents_with_pending_rotation(&self) -> Vec<AgentRecord> {
        self.state
            .lock()
            .agents
            .values()
            .filter(|agent| agent.pending_token_hash.is_some())
            .cloned()
            .collect()
    }

    /// Update whitelisted agent columns.
    ///
    /// Any key outside [`ALLOWED_AGENT_COLUMNS`] fails the whole update;
    /// the record is untouched.
    pub fn update_agent(
        &self,
        id: &AgentId,
        updates: UpdateMap,
        now: DateTime<Utc>,
    ) -> Result<AgentRecord, StoreError> {
        if let Some(bad) = updates.keys().find(|k| !ALLOWED_AGENT_COLUMNS.contains(&k.as_str())) {
            tracing::warn!(agent_id = %id, column = %bad, "rejected invalid agent update column");
            return Err(StoreError::UnknownColumn { column: bad.clone() });
        }

        let mut state = self.state.lock();
        let record =
            state.agents.get(id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // Apply to a copy so a bad value leaves the stored row untouched
        let mut updated = record;
        for (column, value) in updates {
            apply_agent_column(&mut updated, &column, value)?;
        }
        updated.updated_at = now;
        state.agents.insert(id.clone(), updated.clone());
        self.persist(&state);
        Ok(updated)
    }

    /// Delete an agent, cascading its registration codes.
    pub fn delete_agent(&self, id: &AgentId) -> bool {
        let mut state = self.state.lock();
        let removed = state.agents.remove(id).is_some();
        if removed {
            state.codes.retain(|_, code| &code.agent_id != id);
            self.persist(&state);
        }
        removed
    }

    // === Registration codes ===

    pub fn insert_code(&self, code: RegistrationCode) {
        let mut state = self.state.lock();
        state.codes.insert(code.id.clone(), code);
        self.persist(&state);
    }

    pub fn get_code_by_hash(&self, code_hash: &str) -> Option<RegistrationCode> {
        self.state.lock().code_by_hash(code_hash).cloned()
    }

    pub fn mark_code_used(&self, id: &CodeId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let code = state.codes.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        code.used = true;
        self.persist(&state);
        Ok(())
    }

    /// Delete codes past expiry; returns how many were removed.
    pub fn cleanup_expired_codes(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let before = state.codes.len();
        state.codes.retain(|_, code| !code.is_expired(now));
        let removed = before - state.codes.len();
        if removed > 0 {
            tracing::info!(count = removed, "expired registration codes cleaned up");
            self.persist(&state);
        }
        removed
    }

    // === Installations ===

    /// Create an installation record; at most one per `(server, app)`.
    pub fn create_installation(
        &self,
        server_id: ServerId,
        app_id: &str,
        container_name: &str,
        config: UserConfig,
        now: DateTime<Utc>,
    ) -> InstallationRecord {
        let mut state = self.state.lock();
        if let Some(existing) = state.installation_for(&server_id, app_id).map(|i| i.id.clone()) {
            state.installations.remove(&existing);
        }
        let record = InstallationRecord::new(server_id, app_id, container_name, config, now);
        state.installations.insert(record.id.clone(), record.clone());
        self.persist(&state);
        record
    }

    pub fn get_installation(&self, server_id: &ServerId, app_id: &str) -> Option<InstallationRecord> {
        self.state.lock().installation_for(server_id, app_id).cloned()
    }

    pub fn get_installation_by_id(&self, id: &InstallId) -> Option<InstallationRecord> {
        self.state.lock().installations.get(id).cloned()
    }

    pub fn list_installations(&self, server_id: &ServerId) -> Vec<InstallationRecord> {
        let mut records: Vec<_> = self
            .state
            .lock()
            .installations
            .values()
            .filter(|install| &install.server_id == server_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.installed_at.cmp(&b.installed_at));
        records
    }

    /// Update whitelisted installation columns; same discipline as
    /// [`Store::update_agent`].
    pub fn update_installation(
        &self,
        id: &InstallId,
        updates: UpdateMap,
    ) -> Result<InstallationRecord, StoreError> {
        if let Some(bad) =
            updates.keys().find(|k| !ALLOWED_INSTALLATION_COLUMNS.contains(&k.as_str()))
        {
            tracing::warn!(install_id = %id, column = %bad, "rejected invalid installation update column");
            return Err(StoreError::UnknownColumn { column: bad.clone() });
        }

        let mut state = self.state.lock();
        let record = state
            .installations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut updated = record;
        for (column, value) in updates {
            apply_installation_column(&mut updated, &column, value)?;
        }
        state.installations.insert(id.clone(), updated.clone());
        self.persist(&state);
        Ok(updated)
    }

    pub fn delete_installation(&self, server_id: &ServerId, app_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(id) = state.installation_for(server_id, app_id).map(|i| i.id.clone()) else {
            return false;
        };
        state.installations.remove(&id);
        self.persist(&state);
        true
    }

    // === Settings ===

    pub fn set_setting(&self, key: &str, value: Value) {
        let mut state = self.state.lock();
        state.settings.insert(key.to_string(), value);
        self.persist(&state);
    }

    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        self.state.lock().settings.get(key).and_then(Value::as_u64)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
