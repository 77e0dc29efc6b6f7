// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-host command routing: agent channel preferred, shell fallback.

use crate::agents::AgentService;
use crate::hub::{AgentCaller, CallError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tomo_core::{AgentId, AgentRecord, Clock, ServerId};

/// How a command was (or could not be) executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    Agent,
    Shell,
    None,
}

tomo_core::simple_display! {
    ExecutionMethod {
        Agent => "agent",
        Shell => "shell",
        None => "none",
    }
}

/// Normalized result of one routed command.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub output: String,
    pub method: ExecutionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl CommandResult {
    fn unroutable(error: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            method: ExecutionMethod::None,
            exit_code: None,
            error: Some(error),
            execution_time_ms: None,
        }
    }
}

/// Output of a shell execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub success: bool,
    pub output: String,
    pub exit_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error("server not found")]
    ServerNotFound,

    #[error("no shell credentials for server")]
    NoCredentials,

    #[error("shell transport error: {0}")]
    Transport(String),
}

/// Callback fed each output line of a progress-bearing execution.
pub type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Out-of-band shell transport (SSH or equivalent) with stored
/// credentials per server.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    fn has_credentials(&self, server_id: &ServerId) -> bool;

    async fn execute(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout: Duration,
    ) -> Result<ShellOutput, ShellError>;

    /// Streaming variant; the default ignores progress.
    async fn execute_with_progress(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout: Duration,
        _on_output: ProgressFn,
    ) -> Result<ShellOutput, ShellError> {
        self.execute(server_id, command, timeout).await
    }
}

/// Options for one routed execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptions {
    pub force_shell: bool,
    pub force_agent: bool,
    pub timeout: Option<Duration>,
}

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Selects the execution method per host and normalizes results.
pub struct CommandRouter<C: Clock> {
    agents: AgentService<C>,
    caller: Arc<dyn AgentCaller>,
    shell: Arc<dyn ShellTransport>,
    prefer_agent: bool,
    clock: C,
}

impl<C: Clock> CommandRouter<C> {
    pub fn new(
        agents: AgentService<C>,
        caller: Arc<dyn AgentCaller>,
        shell: Arc<dyn ShellTransport>,
        clock: C,
    ) -> Self {
        Self { agents, caller, shell, prefer_agent: true, clock }
    }

    pub fn with_prefer_agent(mut self, prefer_agent: bool) -> Self {
        self.prefer_agent = prefer_agent;
        self
    }

    /// The agent record for a server, if its channel is live.
    pub fn available_agent(&self, server_id: &ServerId) -> Option<AgentRecord> {
        let record = self.agents.get_agent_by_server(server_id)?;
        self.caller.is_connected(&record.id).then_some(record)
    }

    pub fn available_methods(&self, server_id: &ServerId) -> Vec<ExecutionMethod> {
        let mut methods = Vec::new();
        if self.available_agent(server_id).is_some() {
            methods.push(ExecutionMethod::Agent);
        }
        if self.shell.has_credentials(server_id) {
            methods.push(ExecutionMethod::Shell);
        }
        methods
    }

    /// Why the agent path is unavailable, for structured errors.
    pub fn agent_unavailable_reason(&self, server_id: &ServerId) -> String {
        match self.agents.get_agent_by_server(server_id) {
            None => "no agent registered for server".to_string(),
            Some(record) if !self.caller.is_connected(&record.id) => {
                format!("agent {} is not connected", record.id)
            }
            Some(_) => "agent unavailable".to_string(),
        }
    }

    fn determine_method(
        &self,
        server_id: &ServerId,
        force_shell: bool,
        force_agent: bool,
    ) -> ExecutionMethod {
        // Agent wins when both are forced
        if force_agent {
            return if self.available_agent(server_id).is_some() {
                ExecutionMethod::Agent
            } else {
                ExecutionMethod::None
            };
        }
        if force_shell {
            return ExecutionMethod::Shell;
        }
        if self.prefer_agent && self.available_agent(server_id).is_some() {
            return ExecutionMethod::Agent;
        }
        if self.shell.has_credentials(server_id) {
            return ExecutionMethod::Shell;
        }
        ExecutionMethod::None
    }

    /// Agent-only RPC dispatch (deployment path).
    pub async fn dispatch(
        &self,
        server_id: &ServerId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let record = self.available_agent(server_id).ok_or(CallError::NotConnected)?;
        self.caller.send_command(&record.id, method, params, timeout).await
    }

    /// The agent id serving a server, connected or not.
    pub fn agent_id_for(&self, server_id: &ServerId) -> Option<AgentId> {
        self.agents.get_agent_by_server(server_id).map(|record| record.id)
    }

    /// Execute a shell-style command on a host.
    pub async fn execute(
        &self,
        server_id: &ServerId,
        command: &str,
        options: RouteOptions,
    ) -> CommandResult {
        self.execute_inner(server_id, command, options, None).await
    }

    /// Progress-bearing variant; only the shell path streams.
    pub async fn execute_with_progress(
        &self,
        server_id: &ServerId,
        command: &str,
        options: RouteOptions,
        on_output: ProgressFn,
    ) -> CommandResult {
        self.execute_inner(server_id, command, options, Some(on_output)).await
    }

    async fn execute_inner(
        &self,
        server_id: &ServerId,
        command: &str,
        options: RouteOptions,
        on_output: Option<ProgressFn>,
    ) -> CommandResult {
        let started = self.clock.now();
        let timeout = options.timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);
        let method = self.determine_method(server_id, options.force_shell, options.force_agent);

        let mut result = match method {
            ExecutionMethod::Agent => self.execute_via_agent(server_id, command, timeout).await,
            ExecutionMethod::Shell => {
                self.execute_via_shell(server_id, command, timeout, on_output).await
            }
            ExecutionMethod::None => {
                let reason = if options.force_agent {
                    format!("agent required but unavailable: {}", self.agent_unavailable_reason(server_id))
                } else {
                    format!(
                        "no execution method available ({}; no shell credentials)",
                        self.agent_unavailable_reason(server_id)
                    )
                };
                CommandResult::unroutable(reason)
            }
        };

        result.execution_time_ms = Some(self.clock.now().duration_since(started).as_millis() as u64);
        result
    }

    async fn execute_via_agent(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout: Duration,
    ) -> CommandResult {
        let outcome = self
            .dispatch(
                server_id,
                "system.exec",
                json!({"command": command, "timeout": timeout.as_secs()}),
                timeout,
            )
            .await;

        match outcome {
            Ok(value) => {
                let exit_code = value.get("exit_code").and_then(Value::as_i64).unwrap_or(-1);
                let stdout =
                    value.get("stdout").and_then(Value::as_str).unwrap_or_default().to_string();
                let stderr =
                    value.get("stderr").and_then(Value::as_str).unwrap_or_default().to_string();
                let success = exit_code == 0;
                CommandResult {
                    success,
                    output: stdout,
                    method: ExecutionMethod::Agent,
                    exit_code: Some(exit_code),
                    error: (!success).then_some(stderr),
                    execution_time_ms: None,
                }
            }
            Err(CallError::Timeout(_)) => CommandResult {
                success: false,
                output: String::new(),
                method: ExecutionMethod::Agent,
                exit_code: None,
                error: Some("timed out".to_string()),
                execution_time_ms: None,
            },
            Err(error) => CommandResult {
                success: false,
                output: String::new(),
                method: ExecutionMethod::Agent,
                exit_code: None,
                error: Some(error.to_string()),
                execution_time_ms: None,
            },
        }
    }

    async fn execute_via_shell(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout: Duration,
        on_output: Option<ProgressFn>,
    ) -> CommandResult {
        let outcome = match on_output {
            Some(on_output) => {
                self.shell.execute_with_progress(server_id, command, timeout, on_output).await
            }
            None => self.shell.execute(server_id, command, timeout).await,
        };

        match outcome {
            Ok(output) => CommandResult {
                success: output.success,
                output: output.output,
                method: ExecutionMethod::Shell,
                exit_code: output.exit_code.or(Some(if output.success { 0 } else { 1 })),
                error: None,
                execution_time_ms: None,
            },
            Err(error) => CommandResult {
                success: false,
                output: String::new(),
                method: ExecutionMethod::Shell,
                exit_code: None,
                error: Some(error.to_string()),
                execution_time_ms: None,
            },
        }
    }
}

/// Executor facade for callers that only need `(success, output)`.
pub struct RoutedExecutor<C: Clock> {
    router: Arc<CommandRouter<C>>,
}

impl<C: Clock> RoutedExecutor<C> {
    pub fn new(router: Arc<CommandRouter<C>>) -> Self {
        Self { router }
    }

    pub async fn execute(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout: Duration,
    ) -> (bool, String) {
        let result = self
            .router
            .execute(server_id, command, RouteOptions { timeout: Some(timeout), ..Default::default() })
            .await;
        let output = if result.success {
            result.output
        } else {
            result.error.unwrap_or(result.output)
        };
        (result.success, output)
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
