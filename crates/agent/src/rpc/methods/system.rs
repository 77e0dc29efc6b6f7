// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `system.*` methods: host info, gated command execution, preflight,
//! volume preparation and metrics.

use crate::context::AgentContext;
use crate::rpc::{parse_params, to_value, Dispatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tomo_core::{ContainerCounts, MetricsReport};
use tomo_guard::{redact_command, AuditEvent};
use tomo_wire::RpcError;

/// Writable roots for volume preparation.
const ALLOWED_DATA_PATHS: &[&str] = &["/DATA", "/opt/tomo"];

fn shell_metacharacters() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // static pattern, exercised by tests
        Regex::new(r"[|;&`$()<>]").unwrap()
    })
}

/// Decide how to execute: plain argv when possible, `sh -c` only when
/// the (already allowlisted) command needs shell features.
fn prepare_command(command: &str) -> (Vec<String>, bool) {
    if shell_metacharacters().is_match(command) {
        return (vec!["sh".into(), "-c".into(), command.to_string()], true);
    }
    match shlex::split(command) {
        Some(args) if !args.is_empty() => (args, false),
        _ => (vec!["sh".into(), "-c".into(), command.to_string()], true),
    }
}

#[derive(Debug, Deserialize)]
struct ExecParams {
    command: String,
    #[serde(default = "default_exec_timeout")]
    timeout: u64,
}

fn default_exec_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize)]
struct PreflightParams {
    #[serde(default = "default_min_disk_gb")]
    min_disk_gb: u64,
    #[serde(default = "default_min_memory_mb")]
    min_memory_mb: u64,
}

fn default_min_disk_gb() -> u64 {
    3
}

fn default_min_memory_mb() -> u64 {
    256
}

#[derive(Debug, Deserialize)]
struct VolumeEntry {
    #[serde(default)]
    host: String,
    #[serde(default)]
    uid: Option<u32>,
    #[serde(default)]
    gid: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PrepareVolumesParams {
    #[serde(default)]
    volumes: Vec<VolumeEntry>,
    #[serde(default = "default_owner")]
    default_uid: u32,
    #[serde(default = "default_owner")]
    default_gid: u32,
}

fn default_owner() -> u32 {
    1000
}

#[derive(Debug, Serialize)]
struct VolumeOutcome {
    path: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gid: Option<u32>,
}

pub fn register(dispatcher: &mut Dispatcher, ctx: Arc<AgentContext>) {
    let info_ctx = ctx.clone();
    dispatcher.register("system.info", move |_params| {
        let ctx = info_ctx.clone();
        async move {
            let runtime_version =
                ctx.runtime.version().await.unwrap_or_else(|_| "unknown".to_string());
            let host = ctx.host.clone();
            let (os, kernel, arch, hostname) = tokio::task::spawn_blocking(move || {
                (host.os_info(), host.kernel(), host.arch(), host.hostname())
            })
            .await
            .map_err(|_| RpcError::internal())?;
            Ok(json!({
                "os": os,
                "kernel": kernel,
                "arch": arch,
                "hostname": hostname,
                "docker_version": runtime_version,
            }))
        }
    });

    let exec_ctx = ctx.clone();
    dispatcher.register("system.exec", move |params| {
        let ctx = exec_ctx.clone();
        async move {
            let params: ExecParams = parse_params(params)?;
            exec_command(&ctx, &params.command, params.timeout).await
        }
    });

    let preflight_ctx = ctx.clone();
    dispatcher.register("system.preflight_check", move |params| {
        let ctx = preflight_ctx.clone();
        async move {
            let params: PreflightParams = parse_params(params)?;
            preflight_check(&ctx, params.min_disk_gb, params.min_memory_mb).await
        }
    });

    let prepare_ctx = ctx.clone();
    dispatcher.register("system.prepare_volumes", move |params| {
        let ctx = prepare_ctx.clone();
        async move {
            let params: PrepareVolumesParams = parse_params(params)?;
            tokio::task::spawn_blocking(move || prepare_volumes(params))
                .await
                .map_err(|_| RpcError::internal())?
        }
    });

    let metrics_ctx = ctx;
    dispatcher.register("system.get_metrics", move |_params| {
        let ctx = metrics_ctx.clone();
        async move { to_value(collect_metrics(&ctx).await) }
    });
}

/// Host metrics for telemetry and `system.get_metrics`.
pub async fn collect_metrics(ctx: &Arc<AgentContext>) -> MetricsReport {
    let host = ctx.host.clone();
    let (cpu, memory, disk) = tokio::task::spawn_blocking(move || {
        (host.cpu_percent(), host.memory(), host.disk())
    })
    .await
    .unwrap_or_default();

    let (running, stopped) = ctx.runtime.container_counts().await.unwrap_or((0, 0));
    MetricsReport { cpu, memory, disk, containers: ContainerCounts { running, stopped } }
}

async fn exec_command(
    ctx: &Arc<AgentContext>,
    command: &str,
    timeout_secs: u64,
) -> Result<serde_json::Value, RpcError> {
    if let Err(error) = ctx.validator.validate(command, timeout_secs) {
        let reason = error.to_string();
        tracing::warn!(command = %redact_command(command), %reason, "command rejected by security policy");
        ctx.audit.record(AuditEvent::CommandBlocked {
            command: redact_command(command),
            reason: reason.clone(),
        });
        return Err(RpcError::command_blocked(reason));
    }

    let _slot = match ctx.rate_limiter.acquire() {
        Ok(slot) => slot,
        Err(error) => {
            let reason = error.to_string();
            tracing::warn!(command = %redact_command(command), %reason, "command rate limited");
            ctx.audit.record(AuditEvent::RateLimited {
                method: "system.exec".to_string(),
                reason: reason.clone(),
            });
            return Err(RpcError::rate_limited(reason));
        }
    };

    let (argv, used_shell) = prepare_command(command);
    let mut process = tokio::process::Command::new(&argv[0]);
    process.args(&argv[1..]).kill_on_drop(true);

    ctx.audit.record(AuditEvent::CommandExec { command: redact_command(command) });

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        process.output().await
    })
    .await;

    match output {
        Ok(Ok(output)) => {
            tracing::info!(
                command = %redact_command(command),
                shell = used_shell,
                exit_code = output.status.code().unwrap_or(-1),
                "executed allowed command"
            );
            Ok(json!({
                "stdout": String::from_utf8_lossy(&output.stdout),
                "stderr": String::from_utf8_lossy(&output.stderr),
                "exit_code": output.status.code().unwrap_or(-1),
            }))
        }
        Ok(Err(error)) => {
            tracing::error!(%error, "command execution error");
            // Internal detail never reaches the peer
            Ok(json!({
                "stdout": "",
                "stderr": "Command execution failed",
                "exit_code": -1,
            }))
        }
        Err(_) => Ok(json!({
            "stdout": "",
            "stderr": format!("Command timed out after {timeout_secs}s"),
            "exit_code": -1,
        })),
    }
}

async fn preflight_check(
    ctx: &Arc<AgentContext>,
    min_disk_gb: u64,
    min_memory_mb: u64,
) -> Result<serde_json::Value, RpcError> {
    let mut errors: Vec<String> = Vec::new();
    let warnings: Vec<String> = Vec::new();

    let (docker_ok, docker_version) = match ctx.runtime.ping().await {
        Ok(()) => {
            let version = ctx.runtime.version().await.unwrap_or_else(|_| "unknown".to_string());
            (true, version)
        }
        Err(error) => {
            errors.push(format!("Docker daemon not responding: {error}"));
            (false, "unknown".to_string())
        }
    };

    let host = ctx.host.clone();
    let (disk, memory, free_memory) = tokio::task::spawn_blocking(move || {
        (host.disk(), host.memory(), host.available_memory())
    })
    .await
    .map_err(|_| RpcError::internal())?;

    let free_disk_gb = (disk.total.saturating_sub(disk.used)) as f64 / f64::from(1 << 30);
    if free_disk_gb < min_disk_gb as f64 {
        errors.push(format!("Only {free_disk_gb:.1}GB free, need {min_disk_gb}GB"));
    }

    let free_memory_mb = free_memory as f64 / f64::from(1 << 20);
    if free_memory_mb < min_memory_mb as f64 {
        errors.push(format!("Only {free_memory_mb:.0}MB free, need {min_memory_mb}MB"));
    }

    Ok(json!({
        "success": errors.is_empty(),
        "errors": errors,
        "warnings": warnings,
        "docker": {"ok": docker_ok, "version": docker_version},
        "disk": {
            "free_gb": (free_disk_gb * 10.0).round() / 10.0,
            "total_gb": (disk.total as f64 / f64::from(1 << 30) * 10.0).round() / 10.0,
        },
        "memory": {
            "free_mb": free_memory_mb.round(),
            "total_mb": (memory.total as f64 / f64::from(1 << 20)).round(),
        },
    }))
}

fn prepare_volumes(params: PrepareVolumesParams) -> Result<serde_json::Value, RpcError> {
    let mut results = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    // Agent containers see the host filesystem under /host
    let host_prefix = if Path::new("/host").exists() { "/host" } else { "" };

    for volume in &params.volumes {
        let host_path = volume.host.as_str();
        if host_path.is_empty() {
            continue;
        }
        if !host_path.starts_with('/') {
            results.push(VolumeOutcome {
                path: host_path.to_string(),
                status: "skipped",
                reason: Some("named volume".to_string()),
                uid: None,
                gid: None,
            });
            continue;
        }

        let allowed = ALLOWED_DATA_PATHS.iter().any(|root| host_path.starts_with(root));
        if !allowed {
            tracing::warn!(path = host_path, "volume path not in allowed directories");
            results.push(VolumeOutcome {
                path: host_path.to_string(),
                status: "skipped",
                reason: Some(format!("not in allowed paths: {ALLOWED_DATA_PATHS:?}")),
                uid: None,
                gid: None,
            });
            continue;
        }

        let uid = volume.uid.unwrap_or(params.default_uid);
        let gid = volume.gid.unwrap_or(params.default_gid);
        let full_path = format!("{host_prefix}{host_path}");

        match create_owned_dir(Path::new(&full_path), uid, gid) {
            Ok(()) => {
                tracing::info!(path = host_path, uid, gid, "prepared volume");
                results.push(VolumeOutcome {
                    path: host_path.to_string(),
                    status: "ok",
                    reason: None,
                    uid: Some(uid),
                    gid: Some(gid),
                });
            }
            Err(error) => {
                tracing::error!(path = host_path, %error, "error preparing volume");
                errors.push(format!("Failed to prepare {host_path}: {error}"));
                results.push(VolumeOutcome {
                    path: host_path.to_string(),
                    status: "error",
                    reason: Some(error.to_string()),
                    uid: None,
                    gid: None,
                });
            }
        }
    }

    Ok(json!({
        "success": errors.is_empty(),
        "results": results,
        "errors": errors,
    }))
}

fn create_owned_dir(path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    std::os::unix::fs::chown(path, Some(uid), Some(gid))?;

    // Existing contents get the same owner so the container can write
    for entry in walk(path) {
        let _ = std::os::unix::fs::chown(&entry, Some(uid), Some(gid));
    }
    Ok(())
}

fn walk(path: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(path) else {
        return found;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            found.extend(walk(&entry_path));
        }
        found.push(entry_path);
    }
    found
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
