// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted agent state.
//!
//! `{data_dir}/agent.json` (0600 inside a 0700 directory) holds the agent
//! id, the sealed token, the server URL and the registration timestamp.
//! The token is sealed before it touches disk and unsealed on load;
//! legacy plaintext tokens (no `tomo1:` prefix) are still accepted.

use crate::sealing::{self, SealError, TokenSealer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const STATE_FILE: &str = "agent.json";

/// On-disk agent state. `token` is plaintext in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub agent_id: String,
    pub token: String,
    pub server_url: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Seal(#[from] SealError),
}

/// Loads and saves [`PersistedState`] with the token sealed at rest.
pub struct StateStore {
    data_dir: PathBuf,
    sealer: TokenSealer,
}

impl StateStore {
    /// Open a store rooted at `data_dir` (`/data` in production).
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StateError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        std::fs::set_permissions(&data_dir, std::fs::Permissions::from_mode(0o700))?;
        let sealer = TokenSealer::open(&sealing::salt_path(&data_dir))?;
        Ok(Self { data_dir, sealer })
    }

    fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    /// Load persisted state; `Ok(None)` when the agent has never registered.
    ///
    /// An undecryptable token is treated as no state so the agent falls
    /// back to registration rather than looping on a dead token.
    pub fn load(&self) -> Result<Option<PersistedState>, StateError> {
        let bytes = match std::fs::read(self.state_path()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut state: PersistedState = serde_json::from_slice(&bytes)?;

        if sealing::is_sealed(&state.token) {
            match self.sealer.unseal(&state.token) {
                Ok(token) => state.token = token,
                Err(error) => {
                    tracing::error!(%error, "failed to unseal stored token, discarding state");
                    return Ok(None);
                }
            }
        }
        Ok(Some(state))
    }

    /// Save state with the token sealed, file mode 0600.
    pub fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let mut on_disk = state.clone();
        on_disk.token = self.sealer.seal(&state.token)?;

        let path = self.state_path();
        let bytes = serde_json::to_vec_pretty(&on_disk)?;
        write_atomic(&path, &bytes)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        Ok(())
    }

    /// Replace only the token, preserving identity fields. Used by
    /// `agent.rotate_token`; the write is atomic.
    pub fn rotate_token(&self, new_token: &str) -> Result<PersistedState, StateError> {
        let Some(mut state) = self.load()? else {
            return Err(StateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no existing state",
            )));
        };
        state.token = new_token.to_string();
        self.save(&state)?;
        Ok(state)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
