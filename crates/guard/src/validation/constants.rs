// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Security constants shared by the validators.

/// Capabilities that allow container escape or host takeover.
pub const BLOCKED_CAPABILITIES: &[&str] =
    &["ALL", "SYS_ADMIN", "SYS_PTRACE", "SYS_RAWIO", "NET_ADMIN"];

/// Host paths that must never be mounted read-write.
///
/// Read-only mounts are tolerated except under `/proc` and `/sys`.
pub const PROTECTED_PATHS: &[&str] = &[
    "/", "/etc", "/var", "/usr", "/bin", "/sbin", "/lib", "/root", "/home", "/boot", "/proc",
    "/sys", "/dev",
];

/// Container runtime socket paths; never mountable in any mode.
pub const RUNTIME_SOCKET_PATHS: &[&str] = &["/var/run/docker.sock", "/run/docker.sock"];

/// Namespace flags that would share a host namespace.
pub const HOST_NAMESPACE_FLAGS: &[&str] = &["--pid=", "--network=", "--ipc=", "--userns=", "--uts="];

/// Paths blocked even for read-only mounts.
pub fn blocked_even_readonly(path: &str) -> bool {
    path == "/proc" || path == "/sys" || path.starts_with("/proc/") || path.starts_with("/sys/")
}

/// Whether `path` is a protected path or sits under one.
pub fn under_protected_path(path: &str) -> Option<&'static str> {
    PROTECTED_PATHS
        .iter()
        .find(|protected| {
            path == **protected || (**protected != "/" && path.starts_with(&format!("{protected}/")))
        })
        .copied()
}

/// Lexically normalize a path: collapse `//` and `.`, resolve `..`.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}
