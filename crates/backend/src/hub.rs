// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent hub: one live WebSocket channel per agent.
//!
//! Connections are accepted, taken through the handshake against the
//! lifecycle service, and then served as JSON-RPC peers. The channel
//! handle is a weak, transient lookup from agent id to an in-memory
//! sender; it is never persisted.

use crate::agents::AgentService;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tomo_core::{AgentId, Clock};
use tomo_guard::generate_nonce;
use tomo_wire::{decode_incoming, Handshake, Incoming, Request, Response, RpcError};

/// Outbound channel depth per agent.
const OUTGOING_DEPTH: usize = 64;

/// Failures of a hub call to an agent.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("agent not connected")]
    NotConnected,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("channel closed while waiting for response")]
    ChannelClosed,

    #[error(transparent)]
    Remote(#[from] RpcError),

    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// Sends RPCs to connected agents. The hub implements this; tests use a
/// loopback implementation.
#[async_trait]
pub trait AgentCaller: Send + Sync {
    fn is_connected(&self, agent_id: &AgentId) -> bool;

    /// Send a request and await its response within `timeout`.
    async fn send_command(
        &self,
        agent_id: &AgentId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CallError>;
}

struct ConnectionHandle {
    outgoing: mpsc::Sender<String>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>,
}

/// One channel per agent, keyed by agent id.
pub struct AgentHub<C: Clock> {
    agents: AgentService<C>,
    clock: C,
    connections: Mutex<HashMap<AgentId, Arc<ConnectionHandle>>>,
    next_request_id: AtomicU64,
}

impl<C: Clock + 'static> AgentHub<C> {
    pub fn new(agents: AgentService<C>, clock: C) -> Arc<Self> {
        Arc::new(Self {
            agents,
            clock,
            connections: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
        })
    }

    pub fn connected_agents(&self) -> Vec<AgentId> {
        self.connections.lock().keys().cloned().collect()
    }

    /// Accept loop; one task per connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let hub = Arc::clone(&self);
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(error) = hub.handle_connection(stream, shutdown).await {
                                    tracing::warn!(%peer, %error, "agent connection ended");
                                }
                            });
                        }
                        Err(error) => tracing::error!(%error, "accept error"),
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("hub listener stopping");
                    return;
                }
            }
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        shutdown: CancellationToken,
    ) -> Result<(), CallError> {
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| CallError::Encode(e.to_string()))?;

        let Some(agent_id) = self.handshake(&mut ws).await else {
            let _ = ws.close(None).await;
            return Ok(());
        };

        self.serve_agent(agent_id, ws, shutdown).await;
        Ok(())
    }

    /// First frame must be `register` or `authenticate`; anything else or
    /// a failed credential gets a generic error frame.
    async fn handshake(&self, ws: &mut WebSocketStream<TcpStream>) -> Option<AgentId> {
        let frame = match ws.next().await {
            Some(Ok(Message::Text(text))) => Handshake::decode(&text).ok(),
            _ => None,
        };

        let (reply, agent_id) = match frame {
            Some(Handshake::Register { code, version }) => {
                match self.agents.register_agent(&code, Some(&version)) {
                    Some((agent_id, token, config)) => (
                        Handshake::Registered { agent_id: agent_id.clone(), token, config },
                        Some(agent_id),
                    ),
                    None => (Handshake::Error { error: "Registration failed".into() }, None),
                }
            }
            Some(Handshake::Authenticate { token, version }) => {
                match self.agents.authenticate_agent(&token, Some(&version)) {
                    Some((agent_id, _server_id, config)) => (
                        Handshake::Authenticated { agent_id: agent_id.clone(), config },
                        Some(agent_id),
                    ),
                    None => (Handshake::Error { error: "Authentication failed".into() }, None),
                }
            }
            _ => (Handshake::Error { error: "Expected handshake frame".into() }, None),
        };

        let text = reply.encode().ok()?;
        ws.send(Message::Text(text.into())).await.ok()?;
        agent_id
    }

    async fn serve_agent(
        &self,
        agent_id: AgentId,
        ws: WebSocketStream<TcpStream>,
        shutdown: CancellationToken,
    ) {
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_DEPTH);
        let handle = Arc::new(ConnectionHandle {
            outgoing: outgoing_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
        });

        // A reconnect replaces the previous handle for this agent
        self.connections.lock().insert(agent_id.clone(), handle.clone());
        tracing::info!(%agent_id, "agent channel open");

        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&agent_id, &handle, &text),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            tracing::warn!(%agent_id, %error, "channel error");
                            break;
                        }
                    }
                }
                frame = outgoing_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if sink.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = shutdown.cancelled() => {
                    if let Ok(mut ws) = sink.reunite(stream) {
                        let _ = tokio::time::timeout(Duration::from_secs(5), ws.close(None)).await;
                    }
                    break;
                }
            }
        }

        // Drop the handle only if it is still ours (a reconnect may have
        // already replaced it)
        {
            let mut connections = self.connections.lock();
            if connections.get(&agent_id).is_some_and(|h| Arc::ptr_eq(h, &handle)) {
                connections.remove(&agent_id);
            }
        }
        handle.pending.lock().clear();
        self.agents.mark_disconnected(&agent_id);
        tracing::info!(%agent_id, "agent channel closed");
    }

    fn handle_frame(&self, agent_id: &AgentId, handle: &Arc<ConnectionHandle>, text: &str) {
        match decode_incoming(text) {
            Ok(Incoming::Response(response)) => {
                let Some(id) = response.id.as_ref().and_then(Value::as_u64) else {
                    tracing::warn!(%agent_id, "response without usable id");
                    return;
                };
                if let Some(waiter) = handle.pending.lock().remove(&id) {
                    let _ = waiter.send(response);
                } else {
                    tracing::debug!(%agent_id, id, "response for expired request");
                }
            }
            Ok(Incoming::Request(request)) if request.is_notification() => {
                self.handle_notification(agent_id, &request);
            }
            Ok(Incoming::Request(request)) => {
                tracing::warn!(%agent_id, method = %request.method, "unexpected request from agent");
            }
            Err(error) => {
                tracing::warn!(%agent_id, %error, "undecodable frame from agent");
            }
        }
    }

    /// Unsolicited telemetry. Best-effort: liveness is recorded, payloads
    /// are logged for the metrics pipeline.
    fn handle_notification(&self, agent_id: &AgentId, request: &Request) {
        match request.method.as_str() {
            "metrics.update" => {
                self.agents.touch(agent_id);
                tracing::debug!(%agent_id, params = ?request.params, "metrics received");
            }
            "health.status" => {
                self.agents.touch(agent_id);
                tracing::debug!(%agent_id, params = ?request.params, "health received");
            }
            other => tracing::warn!(%agent_id, method = other, "unknown notification"),
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> AgentCaller for AgentHub<C> {
    fn is_connected(&self, agent_id: &AgentId) -> bool {
        self.connections.lock().contains_key(agent_id)
    }

    async fn send_command(
        &self,
        agent_id: &AgentId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let handle = self
            .connections
            .lock()
            .get(agent_id)
            .cloned()
            .ok_or(CallError::NotConnected)?;

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(method, params, id)
            .with_freshness(self.clock.epoch_ms() as f64 / 1000.0, generate_nonce());
        let frame = request.encode().map_err(|e| CallError::Encode(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        handle.pending.lock().insert(id, tx);

        if handle.outgoing.send(frame).await.is_err() {
            handle.pending.lock().remove(&id);
            return Err(CallError::NotConnected);
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                handle.pending.lock().remove(&id);
                return Err(CallError::ChannelClosed);
            }
            Err(_) => {
                // Free the id slot so a late response is dropped cleanly
                handle.pending.lock().remove(&id);
                return Err(CallError::Timeout(timeout));
            }
        };

        match response.error {
            Some(error) => Err(CallError::Remote(error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
