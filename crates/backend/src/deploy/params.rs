// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container parameter assembly and volume normalization.

use serde_json::{json, Value};
use tomo_core::{DockerSpec, UserConfig};

/// Roots the orchestrator may prepare and mount read-write.
pub const ALLOWED_DATA_ROOTS: &[&str] = &["/DATA", "/opt/tomo"];

/// One resolved volume: host path already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVolume {
    pub host: String,
    pub container: String,
    pub mode: &'static str,
}

/// Resolve app volumes against user overrides and rewrite host paths
/// outside the allowed data roots to
/// `/DATA/AppData/<app_id><original>`.
pub fn resolve_volumes(spec: &DockerSpec, config: &UserConfig, app_id: &str) -> Vec<ResolvedVolume> {
    spec.volumes
        .iter()
        .map(|volume| {
            let host = config
                .volumes
                .get(&volume.container_path)
                .cloned()
                .unwrap_or_else(|| volume.host_path.clone());
            ResolvedVolume {
                host: normalize_host_path(&host, app_id),
                container: volume.container_path.clone(),
                mode: if volume.readonly { "ro" } else { "rw" },
            }
        })
        .collect()
}

/// Absolute paths outside the allowed roots are relocated under the
/// app's data directory; named volumes pass through.
pub fn normalize_host_path(host_path: &str, app_id: &str) -> String {
    if !host_path.starts_with('/') {
        return host_path.to_string();
    }
    if ALLOWED_DATA_ROOTS.iter().any(|root| host_path.starts_with(root)) {
        return host_path.to_string();
    }
    let normalized = format!("/DATA/AppData/{app_id}{host_path}");
    tracing::info!(original = host_path, %normalized, "normalizing volume path");
    normalized
}

/// Build the `docker.containers.run` params from the app spec and user
/// overrides. `restart_policy` is forced by the caller: `"no"` during
/// startup, the real policy applied after the health gate.
pub fn build_container_params(
    spec: &DockerSpec,
    container_name: &str,
    config: &UserConfig,
    app_id: &str,
    restart_policy: &str,
) -> Value {
    // host_port → "container_port/protocol"
    let mut ports = serde_json::Map::new();
    for port in &spec.ports {
        let host_port =
            config.ports.get(&port.container.to_string()).copied().unwrap_or(port.host);
        ports.insert(host_port.to_string(), json!(format!("{}/{}", port.container, port.protocol)));
    }

    let volumes: Vec<Value> = resolve_volumes(spec, config, app_id)
        .into_iter()
        .map(|volume| {
            json!({"host": volume.host, "container": volume.container, "mode": volume.mode})
        })
        .collect();

    json!({
        "image": spec.image,
        "name": container_name,
        "ports": ports,
        "env": config.env,
        "volumes": volumes,
        "restart_policy": restart_policy,
        "network_mode": spec.network_mode,
        "privileged": spec.privileged,
        "capabilities": spec.capabilities,
    })
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
