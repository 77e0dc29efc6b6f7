// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command allowlisting and container-parameter validation.
//!
//! The allowlist gates `system.exec`; the container validators gate
//! `docker.containers.run` both as a command string and as a structured
//! parameter object.

mod command;
mod constants;
mod docker;
mod volume;

pub use command::{AllowlistEntry, CommandError, CommandValidator};
pub use constants::{BLOCKED_CAPABILITIES, PROTECTED_PATHS, RUNTIME_SOCKET_PATHS};
pub use docker::{validate_container_params, validate_run_command, ContainerPolicyInput, MountRequest};
pub use volume::{validate_volume_mount, validate_volume_path};

use thiserror::Error;

/// A container or mount request rejected by security policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Privileged mode is not allowed")]
    Privileged,

    #[error("Capability {0} is not allowed")]
    Capability(String),

    #[error("Host namespace mode is not allowed: {0}")]
    HostNamespace(String),

    #[error("Mounting the container runtime socket is not allowed")]
    RuntimeSocket,

    #[error("Write access to {0} is not allowed")]
    ProtectedPath(String),

    #[error("Blocked volume mount: {0}")]
    VolumeMount(String),

    #[error("Device mounts are not allowed")]
    DeviceMount,

    #[error("Insecure security option: {0}")]
    SecurityOption(String),

    #[error("Blocked flag: {0}")]
    BlockedFlag(String),

    #[error("Invalid command syntax")]
    Syntax,
}
