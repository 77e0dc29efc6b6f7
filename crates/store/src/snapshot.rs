// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence: versioned JSON written atomically.

use crate::state::MaterializedState;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// Versioned on-disk form of [`MaterializedState`].
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub state: MaterializedState,
}

impl Snapshot {
    pub fn new(state: MaterializedState) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, state }
    }

    /// Load a snapshot; a missing file yields empty state.
    pub fn load(path: &Path) -> std::io::Result<MaterializedState> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                if snapshot.version > CURRENT_SNAPSHOT_VERSION {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("snapshot version {} is newer than supported", snapshot.version),
                    ));
                }
                Ok(snapshot.state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MaterializedState::default()),
            Err(e) => Err(e),
        }
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
