// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Column whitelists for dynamic record updates.
//!
//! Every generic "update row" path refuses keys outside these sets. This
//! is the containment boundary between a buggy caller and arbitrary
//! writes, so additions here deserve review.

use crate::store::StoreError;
use serde_json::Value;
use tomo_core::{AgentRecord, InstallationRecord, ServerId};

/// Whitelisted columns for agent updates.
pub const ALLOWED_AGENT_COLUMNS: &[&str] = &[
    "server_id",
    "token_hash",
    "version",
    "status",
    "last_seen",
    "registered_at",
    "config",
    "pending_token_hash",
    "token_issued_at",
    "token_expires_at",
];

/// Whitelisted columns for installation updates.
pub const ALLOWED_INSTALLATION_COLUMNS: &[&str] = &[
    "status",
    "container_id",
    "container_name",
    "config",
    "started_at",
    "error_message",
    "progress",
    "step_durations",
    "step_started_at",
    "networks",
    "named_volumes",
    "bind_mounts",
];

fn field<T: serde::de::DeserializeOwned>(column: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::InvalidValue {
        column: column.to_string(),
        source,
    })
}

/// Apply one whitelisted column to an agent record.
pub(crate) fn apply_agent_column(
    record: &mut AgentRecord,
    column: &str,
    value: Value,
) -> Result<(), StoreError> {
    match column {
        "server_id" => record.server_id = ServerId::from_string(field::<String>(column, value)?),
        "token_hash" => record.token_hash = field(column, value)?,
        "version" => record.version = field(column, value)?,
        "status" => record.status = field(column, value)?,
        "last_seen" => record.last_seen = field(column, value)?,
        "registered_at" => record.registered_at = field(column, value)?,
        "config" => record.config = field(column, value)?,
        "pending_token_hash" => record.pending_token_hash = field(column, value)?,
        "token_issued_at" => record.token_issued_at = field(column, value)?,
        "token_expires_at" => record.token_expires_at = field(column, value)?,
        other => return Err(StoreError::UnknownColumn { column: other.to_string() }),
    }
    Ok(())
}

/// Apply one whitelisted column to an installation record.
pub(crate) fn apply_installation_column(
    record: &mut InstallationRecord,
    column: &str,
    value: Value,
) -> Result<(), StoreError> {
    match column {
        "status" => record.status = field(column, value)?,
        "container_id" => record.container_id = field(column, value)?,
        "container_name" => record.container_name = field(column, value)?,
        "config" => record.config = field(column, value)?,
        "started_at" => record.started_at = field(column, value)?,
        "error_message" => record.error_message = field(column, value)?,
        "progress" => record.progress = field(column, value)?,
        "step_durations" => record.step_durations = field(column, value)?,
        "step_started_at" => record.step_started_at = field(column, value)?,
        "networks" => record.networks = field(column, value)?,
        "named_volumes" => record.named_volumes = field(column, value)?,
        "bind_mounts" => record.bind_mounts = field(column, value)?,
        other => return Err(StoreError::UnknownColumn { column: other.to_string() }),
    }
    Ok(())
}

#[cfg(test)]
#[path = "columns_tests.rs"]
mod tests;
