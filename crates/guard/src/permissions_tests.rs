// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    system_info = { "system.info", PermissionTier::Read },
    system_exec = { "system.exec", PermissionTier::Admin },
    preflight = { "system.preflight_check", PermissionTier::Execute },
    prepare_volumes = { "system.prepare_volumes", PermissionTier::Execute },
    containers_list = { "docker.containers.list", PermissionTier::Read },
    containers_stats = { "docker.containers.stats", PermissionTier::Read },
    containers_stop = { "docker.containers.stop", PermissionTier::Execute },
    containers_update = { "docker.containers.update", PermissionTier::Execute },
    containers_run = { "docker.containers.run", PermissionTier::Admin },
    images_list = { "docker.images.list", PermissionTier::Read },
    images_pull = { "docker.images.pull", PermissionTier::Execute },
    volumes_prune = { "docker.volumes.prune", PermissionTier::Execute },
    networks_create = { "docker.networks.create", PermissionTier::Execute },
    ping = { "agent.ping", PermissionTier::Read },
    rotate = { "agent.rotate_token", PermissionTier::Admin },
    config_update = { "config.update", PermissionTier::Admin },
    metrics_get = { "metrics.get", PermissionTier::Read },
)]
fn known_methods_have_expected_tiers(method: &str, tier: PermissionTier) {
    assert_eq!(method_tier(method), tier);
}

#[test]
fn unknown_methods_default_to_admin() {
    assert_eq!(method_tier("docker.containers.drop_all"), PermissionTier::Admin);
    assert_eq!(method_tier(""), PermissionTier::Admin);
}

#[test]
fn tiers_are_ordered_read_execute_admin() {
    assert!(PermissionTier::Read < PermissionTier::Execute);
    assert!(PermissionTier::Execute < PermissionTier::Admin);
}

#[test]
fn tier_display_matches_wire_form() {
    assert_eq!(PermissionTier::Read.to_string(), "read");
    assert_eq!(PermissionTier::Execute.to_string(), "execute");
    assert_eq!(PermissionTier::Admin.to_string(), "admin");
}
