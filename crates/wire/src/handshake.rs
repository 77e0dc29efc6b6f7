// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-RPC handshake frames.

use serde::{Deserialize, Serialize};
use tomo_core::{AgentConfigUpdate, AgentId};

/// Handshake frames exchanged before RPC traffic starts.
///
/// The agent opens with `register` (first run) or `authenticate`; the
/// backend answers with the matching success frame or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Handshake {
    Register {
        code: String,
        version: String,
    },
    Registered {
        agent_id: AgentId,
        token: String,
        #[serde(default)]
        config: AgentConfigUpdate,
    },
    Authenticate {
        token: String,
        version: String,
    },
    Authenticated {
        agent_id: AgentId,
        #[serde(default)]
        config: AgentConfigUpdate,
    },
    Error {
        error: String,
    },
}

impl Handshake {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
#[path = "handshake_tests.rs"]
mod tests;
