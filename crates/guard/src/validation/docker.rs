// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker run-command and container-parameter validation.

use super::constants::{BLOCKED_CAPABILITIES, HOST_NAMESPACE_FLAGS};
use super::volume::{validate_volume_mount, validate_volume_path};
use super::PolicyViolation;

/// Validate a `docker run` command string for dangerous flags.
pub fn validate_run_command(command: &str) -> Result<(), PolicyViolation> {
    let tokens = shlex::split(command).ok_or(PolicyViolation::Syntax)?;

    for (i, token) in tokens.iter().enumerate() {
        let lower = token.to_lowercase();

        if lower == "--privileged" {
            return Err(PolicyViolation::Privileged);
        }

        if let Some(cap) = lower.strip_prefix("--cap-add=") {
            let cap = cap.to_uppercase();
            if BLOCKED_CAPABILITIES.contains(&cap.as_str()) {
                return Err(PolicyViolation::Capability(cap));
            }
        }

        for ns in HOST_NAMESPACE_FLAGS {
            if lower.starts_with(ns) && lower.ends_with("host") {
                return Err(PolicyViolation::HostNamespace(token.clone()));
            }
        }

        if let Some(spec) = token.strip_prefix("-v=").or_else(|| token.strip_prefix("--volume=")) {
            validate_volume_mount(spec)?;
        }
        if (token == "-v" || token == "--volume") && i + 1 < tokens.len() {
            validate_volume_mount(&tokens[i + 1])?;
        }

        if lower.starts_with("--device=") {
            return Err(PolicyViolation::DeviceMount);
        }

        if let Some(opt) = lower.strip_prefix("--security-opt=") {
            if opt.contains("unconfined") || opt.contains("disabled") {
                return Err(PolicyViolation::SecurityOption(token.clone()));
            }
        }
    }

    Ok(())
}

/// One mount of a structured run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub host_path: String,
    pub mode: String,
}

/// The policy-relevant slice of a `docker.containers.run` request.
#[derive(Debug, Clone, Default)]
pub struct ContainerPolicyInput {
    pub privileged: bool,
    pub cap_add: Vec<String>,
    pub network_mode: Option<String>,
    pub pid_mode: Option<String>,
    pub ipc_mode: Option<String>,
    pub userns_mode: Option<String>,
    pub mounts: Vec<MountRequest>,
}

/// Apply the run-command rules structurally to a parameter object.
pub fn validate_container_params(params: &ContainerPolicyInput) -> Result<(), PolicyViolation> {
    if params.privileged {
        return Err(PolicyViolation::Privileged);
    }

    for cap in &params.cap_add {
        let cap = cap.to_uppercase();
        if BLOCKED_CAPABILITIES.contains(&cap.as_str()) {
            return Err(PolicyViolation::Capability(cap));
        }
    }

    for (name, mode) in [
        ("pid_mode", &params.pid_mode),
        ("network_mode", &params.network_mode),
        ("ipc_mode", &params.ipc_mode),
        ("userns_mode", &params.userns_mode),
    ] {
        if mode.as_deref() == Some("host") {
            return Err(PolicyViolation::HostNamespace(format!("{name}=host")));
        }
    }

    for mount in &params.mounts {
        if !mount.host_path.starts_with('/') {
            continue; // named volume
        }
        validate_volume_path(&mount.host_path, &mount.mode)?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
