// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission tiers for RPC methods.
//!
//! Every method maps to a tier; dispatch rejects calls whose tier is not
//! in the channel's allowed set. Unknown methods are admin so a forgotten
//! map entry fails closed.

use serde::{Deserialize, Serialize};

/// Permission tier required to invoke a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionTier {
    /// Read-only operations (info, status, logs)
    Read,
    /// Container management (start, stop, restart)
    Execute,
    /// Dangerous operations (exec, container run, token rotation)
    Admin,
}

tomo_core::simple_display! {
    PermissionTier {
        Read => "read",
        Execute => "execute",
        Admin => "admin",
    }
}

/// Static method → tier map.
const METHOD_TIERS: &[(&str, PermissionTier)] = &[
    // System
    ("system.info", PermissionTier::Read),
    ("system.get_metrics", PermissionTier::Read),
    ("system.exec", PermissionTier::Admin), // allowlist-gated
    ("system.preflight_check", PermissionTier::Execute),
    ("system.prepare_volumes", PermissionTier::Execute),
    // Containers: read
    ("docker.containers.list", PermissionTier::Read),
    ("docker.containers.get", PermissionTier::Read),
    ("docker.containers.logs", PermissionTier::Read),
    ("docker.containers.inspect", PermissionTier::Read),
    ("docker.containers.status", PermissionTier::Read),
    ("docker.containers.stats", PermissionTier::Read),
    // Containers: execute
    ("docker.containers.start", PermissionTier::Execute),
    ("docker.containers.stop", PermissionTier::Execute),
    ("docker.containers.restart", PermissionTier::Execute),
    ("docker.containers.remove", PermissionTier::Execute),
    ("docker.containers.update", PermissionTier::Execute),
    // Containers: admin
    ("docker.containers.run", PermissionTier::Admin),
    // Images
    ("docker.images.list", PermissionTier::Read),
    ("docker.images.pull", PermissionTier::Execute),
    ("docker.images.remove", PermissionTier::Execute),
    ("docker.images.prune", PermissionTier::Execute),
    // Volumes
    ("docker.volumes.list", PermissionTier::Execute),
    ("docker.volumes.create", PermissionTier::Execute),
    ("docker.volumes.remove", PermissionTier::Execute),
    ("docker.volumes.prune", PermissionTier::Execute),
    // Networks
    ("docker.networks.list", PermissionTier::Execute),
    ("docker.networks.create", PermissionTier::Execute),
    ("docker.networks.remove", PermissionTier::Execute),
    // Agent
    ("agent.ping", PermissionTier::Read),
    ("agent.update", PermissionTier::Admin),
    ("agent.restart", PermissionTier::Admin),
    ("agent.rotate_token", PermissionTier::Admin),
    // Built-ins
    ("config.update", PermissionTier::Admin),
    ("metrics.get", PermissionTier::Read),
];

/// Tier required for `method`. Unknown methods require admin.
pub fn method_tier(method: &str) -> PermissionTier {
    METHOD_TIERS
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, tier)| *tier)
        .unwrap_or(PermissionTier::Admin)
}

#[cfg(test)]
#[path = "permissions_tests.rs"]
mod tests;
