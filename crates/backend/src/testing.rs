// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness: an in-process agent behind the [`AgentCaller`] trait
//! and a scripted shell transport.
//!
//! The loopback caller runs requests through a real agent dispatcher
//! (with the fake container runtime), so router and orchestrator tests
//! exercise the same method surface production traffic hits.

// Test-support code may panic on setup failure
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use crate::hub::{AgentCaller, CallError};
use crate::router::{ProgressFn, ShellError, ShellOutput, ShellTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tomo_agent::rpc::{methods, Dispatcher};
use tomo_agent::{AgentContext, FakeRuntime, StateStore};
use tomo_core::{AgentConfig, AgentId, ServerId};
use tomo_guard::{PermissionTier, RecordingSink};

/// An in-process agent: real dispatcher, fake runtime.
pub struct FakeAgent {
    pub runtime: Arc<FakeRuntime>,
    pub audit: Arc<RecordingSink>,
    pub dispatcher: Arc<Dispatcher>,
    state_store: Arc<StateStore>,
    _data_dir: tempfile::TempDir,
}

impl FakeAgent {
    /// The agent's on-disk state store (backed by a tempdir).
    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }
}

/// Build a fake agent with the full method surface registered.
pub fn fake_agent() -> FakeAgent {
    let data_dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let runtime = Arc::new(FakeRuntime::new());
    let audit = Arc::new(RecordingSink::new());
    let state_store = match StateStore::open(data_dir.path()) {
        Ok(store) => Arc::new(store),
        Err(e) => panic!("state store: {e}"),
    };
    let ctx = Arc::new(AgentContext::new(
        AgentConfig::default(),
        state_store.clone(),
        runtime.clone(),
        audit.clone(),
    ));
    let mut dispatcher = Dispatcher::new(
        [PermissionTier::Read, PermissionTier::Execute, PermissionTier::Admin],
        audit.clone(),
    );
    methods::register_all(&mut dispatcher, ctx);
    FakeAgent { runtime, audit, dispatcher: Arc::new(dispatcher), state_store, _data_dir: data_dir }
}

/// [`AgentCaller`] over in-process dispatchers.
#[derive(Default)]
pub struct LoopbackCaller {
    dispatchers: Mutex<HashMap<AgentId, Arc<Dispatcher>>>,
    next_id: AtomicU64,
}

impl LoopbackCaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach an agent's dispatcher, making it "connected".
    pub fn connect(&self, agent_id: AgentId, dispatcher: Arc<Dispatcher>) {
        self.dispatchers.lock().insert(agent_id, dispatcher);
    }

    pub fn disconnect(&self, agent_id: &AgentId) {
        self.dispatchers.lock().remove(agent_id);
    }
}

#[async_trait]
impl AgentCaller for LoopbackCaller {
    fn is_connected(&self, agent_id: &AgentId) -> bool {
        self.dispatchers.lock().contains_key(agent_id)
    }

    async fn send_command(
        &self,
        agent_id: &AgentId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let dispatcher =
            self.dispatchers.lock().get(agent_id).cloned().ok_or(CallError::NotConnected)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = tomo_wire::Request::new(method, params, id);

        let response = tokio::time::timeout(timeout, dispatcher.handle(request))
            .await
            .map_err(|_| CallError::Timeout(timeout))?
            .ok_or(CallError::ChannelClosed)?;

        match response.error {
            Some(error) => Err(CallError::Remote(error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }
}

/// [`AgentCaller`] answering from scripted per-method responses.
///
/// Methods without a script succeed with `{}`. Always "connected".
#[derive(Default)]
pub struct ScriptedCaller {
    responses: Mutex<HashMap<String, std::collections::VecDeque<Value>>>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedCaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one response for a method; earlier entries answer first.
    pub fn script(&self, method: &str, response: Value) {
        self.responses.lock().entry(method.to_string()).or_default().push_back(response);
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl AgentCaller for ScriptedCaller {
    fn is_connected(&self, _agent_id: &AgentId) -> bool {
        true
    }

    async fn send_command(
        &self,
        _agent_id: &AgentId,
        method: &str,
        params: Value,
        _timeout: Duration,
    ) -> Result<Value, CallError> {
        self.calls.lock().push((method.to_string(), params));
        let scripted = self
            .responses
            .lock()
            .get_mut(method)
            .and_then(std::collections::VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| serde_json::json!({})))
    }
}

type ShellScript = Box<dyn Fn(&str) -> Result<ShellOutput, ShellError> + Send + Sync>;

/// Scripted [`ShellTransport`] recording every command.
pub struct ScriptedShell {
    servers: Mutex<HashMap<ServerId, ShellScript>>,
    pub calls: Mutex<Vec<(ServerId, String)>>,
}

impl Default for ScriptedShell {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self { servers: Mutex::new(HashMap::new()), calls: Mutex::new(Vec::new()) }
    }

    /// Grant credentials for a server, answering every command with `script`.
    pub fn with_server(
        self,
        server_id: ServerId,
        script: impl Fn(&str) -> Result<ShellOutput, ShellError> + Send + Sync + 'static,
    ) -> Self {
        self.servers.lock().insert(server_id, Box::new(script));
        self
    }

    /// Grant credentials answering every command with success and `output`.
    pub fn echoing(self, server_id: ServerId, output: &str) -> Self {
        let output = output.to_string();
        self.with_server(server_id, move |_| {
            Ok(ShellOutput { success: true, output: output.clone(), exit_code: Some(0) })
        })
    }

    pub fn commands_for(&self, server_id: &ServerId) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(id, _)| id == server_id)
            .map(|(_, command)| command.clone())
            .collect()
    }
}

#[async_trait]
impl ShellTransport for ScriptedShell {
    fn has_credentials(&self, server_id: &ServerId) -> bool {
        self.servers.lock().contains_key(server_id)
    }

    async fn execute(
        &self,
        server_id: &ServerId,
        command: &str,
        _timeout: Duration,
    ) -> Result<ShellOutput, ShellError> {
        self.calls.lock().push((server_id.clone(), command.to_string()));
        let servers = self.servers.lock();
        let script = servers.get(server_id).ok_or(ShellError::NoCredentials)?;
        script(command)
    }
}
