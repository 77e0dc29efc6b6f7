// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory materialized state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tomo_core::{AgentId, AgentRecord, CodeId, InstallId, InstallationRecord, RegistrationCode, ServerId};

/// All backend records, held in memory and rebuilt from a snapshot.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub agents: HashMap<AgentId, AgentRecord>,
    pub codes: HashMap<CodeId, RegistrationCode>,
    pub installations: HashMap<InstallId, InstallationRecord>,
    /// Parsed-scalar settings (intervals, rotation window/grace)
    pub settings: BTreeMap<String, Value>,
}

impl MaterializedState {
    pub fn agent_by_server(&self, server_id: &ServerId) -> Option<&AgentRecord> {
        self.agents.values().find(|agent| &agent.server_id == server_id)
    }

    pub fn agent_by_token_hash(&self, hash: &str) -> Option<&AgentRecord> {
        self.agents
            .values()
            .find(|agent| agent.token_hash.as_deref() == Some(hash))
    }

    pub fn agent_by_pending_token_hash(&self, hash: &str) -> Option<&AgentRecord> {
        self.agents
            .values()
            .find(|agent| agent.pending_token_hash.as_deref() == Some(hash))
    }

    pub fn code_by_hash(&self, code_hash: &str) -> Option<&RegistrationCode> {
        self.codes.values().find(|code| code.code_hash == code_hash)
    }

    pub fn installation_for(&self, server_id: &ServerId, app_id: &str) -> Option<&InstallationRecord> {
        self.installations
            .values()
            .find(|install| &install.server_id == server_id && install.app_id == app_id)
    }
}
