// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket connection management: TLS, handshake, message loop.

use crate::context::AgentContext;
use crate::rpc::Dispatcher;
use crate::state::PersistedState;
use crate::AGENT_VERSION;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tomo_core::{AgentConfigUpdate, AgentId, SystemClock};
use tomo_guard::ReplayGuard;
use tomo_wire::{decode_incoming, Handshake, Incoming, Response, RpcError};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no server URL configured")]
    NoServerUrl,

    #[error("no token or registration code available")]
    NoCredentials,

    #[error("connection failed: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// A connected, authenticated channel.
#[derive(Debug)]
pub struct Established {
    pub ws: WsStream,
    pub agent_id: AgentId,
    pub config_update: Option<AgentConfigUpdate>,
}

/// Build the TLS connector.
///
/// Production requires a verified chain against the system roots, with
/// the bundled webpki roots as fallback, and TLS ≥ 1.2 (the rustls
/// floor). Dev mode (`TOMO_DEV=1`) disables verification with a loud
/// warning.
pub fn build_connector(dev_mode: bool) -> Connector {
    if dev_mode {
        tracing::warn!("development mode: TLS certificate verification disabled");
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerification))
            .with_no_client_auth();
        return Connector::Rustls(Arc::new(config));
    }

    let mut roots = rustls::RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        result if !result.certs.is_empty() => {
            for cert in result.certs {
                let _ = roots.add(cert);
            }
        }
        _ => {
            tracing::warn!("no native CA certificates, falling back to bundled roots");
        }
    }
    if roots.is_empty() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    let config = rustls::ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    Connector::Rustls(Arc::new(config))
}

/// Connect and authenticate (or register on first run).
pub async fn establish(
    ctx: &Arc<AgentContext>,
    dev_mode: bool,
) -> Result<Established, ConnectError> {
    let state = ctx.state_store.load().ok().flatten();
    let config = ctx.current_config();
    let server_url = state
        .as_ref()
        .map(|s| s.server_url.clone())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| config.server_url.clone());
    if server_url.is_empty() {
        return Err(ConnectError::NoServerUrl);
    }

    tracing::info!(url = %server_url, "connecting");
    let connector = server_url.starts_with("wss://").then(|| build_connector(dev_mode));

    let (mut ws, _response) = tokio_tungstenite::connect_async_tls_with_config(
        server_url.as_str(),
        None,
        false,
        connector,
    )
    .await
    .map_err(|e| ConnectError::Transport(e.to_string()))?;

    match authenticate(&mut ws, state, &config.register_code, &server_url, ctx).await {
        Ok((agent_id, config_update)) => Ok(Established { ws, agent_id, config_update }),
        Err(error) => {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await;
            Err(error)
        }
    }
}

async fn authenticate(
    ws: &mut WsStream,
    state: Option<PersistedState>,
    register_code: &Option<String>,
    server_url: &str,
    ctx: &Arc<AgentContext>,
) -> Result<(AgentId, Option<AgentConfigUpdate>), ConnectError> {
    let frame = if let Some(state) = &state {
        Handshake::Authenticate { token: state.token.clone(), version: AGENT_VERSION.to_string() }
    } else if let Some(code) = register_code {
        Handshake::Register { code: code.clone(), version: AGENT_VERSION.to_string() }
    } else {
        return Err(ConnectError::NoCredentials);
    };

    send_handshake(ws, &frame).await?;
    let reply = recv_handshake(ws).await?;

    match reply {
        Handshake::Authenticated { agent_id, config } => {
            tracing::info!(%agent_id, "authenticated");
            Ok((agent_id, (!config.is_empty()).then_some(config)))
        }
        Handshake::Registered { agent_id, token, config } => {
            let persisted = PersistedState {
                agent_id: agent_id.to_string(),
                token,
                server_url: server_url.to_string(),
                registered_at: Utc::now(),
            };
            ctx.state_store
                .save(&persisted)
                .map_err(|e| ConnectError::Auth(format!("state persistence failed: {e}")))?;
            tracing::info!(%agent_id, "registered");
            Ok((agent_id, (!config.is_empty()).then_some(config)))
        }
        Handshake::Error { error } => Err(ConnectError::Auth(error)),
        other => Err(ConnectError::Auth(format!("unexpected handshake reply: {other:?}"))),
    }
}

async fn send_handshake(ws: &mut WsStream, frame: &Handshake) -> Result<(), ConnectError> {
    let text = frame.encode().map_err(|e| ConnectError::Transport(e.to_string()))?;
    ws.send(Message::Text(text.into())).await.map_err(|e| ConnectError::Transport(e.to_string()))
}

async fn recv_handshake(ws: &mut WsStream) -> Result<Handshake, ConnectError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return Handshake::decode(&text).map_err(|e| ConnectError::Auth(e.to_string()));
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(other)) => {
                return Err(ConnectError::Auth(format!("unexpected frame: {other:?}")))
            }
            Some(Err(e)) => return Err(ConnectError::Transport(e.to_string())),
            None => return Err(ConnectError::Transport("closed during handshake".to_string())),
        }
    }
}

/// Drive one connected session until the channel closes or shutdown.
///
/// Incoming requests are dispatched on their own tasks so a slow handler
/// never blocks the read loop; responses and telemetry share the
/// `outgoing` channel and are written in arrival order.
pub async fn run_session(
    ws: WsStream,
    dispatcher: Arc<Dispatcher>,
    guard: ReplayGuard<SystemClock>,
    mut outgoing_rx: mpsc::Receiver<String>,
    outgoing_tx: mpsc::Sender<String>,
    shutdown: &CancellationToken,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&text, &dispatcher, &guard, &outgoing_tx);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("connection closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::error!(%error, "message loop error");
                        break;
                    }
                }
            }
            frame = outgoing_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(error) = sink.send(Message::Text(frame.into())).await {
                            tracing::error!(%error, "send failed");
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = shutdown.cancelled() => {
                tracing::info!("shutdown requested, closing channel");
                let mut ws = match sink.reunite(stream) {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                if tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await.is_err() {
                    tracing::warn!("websocket close timed out");
                }
                return;
            }
        }
    }
}

/// Parse and dispatch one incoming text frame.
fn handle_text(
    text: &str,
    dispatcher: &Arc<Dispatcher>,
    guard: &ReplayGuard<SystemClock>,
    outgoing: &mpsc::Sender<String>,
) {
    let request = match decode_incoming(text) {
        Ok(Incoming::Request(request)) => request,
        Ok(Incoming::Response(_)) => {
            tracing::debug!("ignoring unsolicited response frame");
            return;
        }
        Err(error) => {
            let preview: String = text.chars().take(100).collect();
            tracing::error!(%error, frame = %preview, "invalid frame received");
            return;
        }
    };

    // Replay gate runs before dispatch when the fields are present
    if let (Some(timestamp), Some(nonce)) = (request.timestamp, request.nonce.as_deref()) {
        if let Err(reason) = guard.validate(timestamp, nonce) {
            tracing::warn!(method = %request.method, %reason, "message rejected");
            if let Some(id) = request.id {
                let response = Response::fail(
                    Some(id),
                    RpcError::new(tomo_wire::INVALID_REQUEST, reason.to_string()),
                );
                if let Ok(frame) = response.encode() {
                    let _ = outgoing.try_send(frame);
                }
            }
            return;
        }
    }

    let dispatcher = dispatcher.clone();
    let outgoing = outgoing.clone();
    tokio::spawn(async move {
        if let Some(response) = dispatcher.handle(request).await {
            match response.encode() {
                Ok(frame) => {
                    let _ = outgoing.send(frame).await;
                }
                Err(error) => tracing::error!(%error, "response encoding failed"),
            }
        }
    });
}

mod danger {
    //! Certificate verifier for development mode only.

    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerification;

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::ED25519,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
            ]
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
