// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection tests against a local plain-TCP WebSocket server.

use super::*;
use crate::context::AgentContext;
use crate::runtime::FakeRuntime;
use crate::state::StateStore;
use serde_json::json;
use tokio::net::TcpListener;
use tomo_core::AgentConfig;
use tomo_guard::{PermissionTier, RecordingSink};
use tomo_wire::Request;

async fn server_with_handshake(
    reply: Handshake,
) -> (String, tokio::task::JoinHandle<Option<Handshake>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.ok()?;
        let mut ws = tokio_tungstenite::accept_async(stream).await.ok()?;
        let first = match ws.next().await? {
            Ok(Message::Text(text)) => Handshake::decode(&text).ok()?,
            _ => return None,
        };
        ws.send(Message::Text(reply.encode().ok()?.into())).await.ok()?;
        Some(first)
    });
    (format!("ws://{addr}"), task)
}

fn context(server_url: &str, register_code: Option<&str>) -> (Arc<AgentContext>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig {
        server_url: server_url.to_string(),
        register_code: register_code.map(String::from),
        ..AgentConfig::default()
    };
    let ctx = Arc::new(AgentContext::new(
        config,
        Arc::new(StateStore::open(dir.path()).unwrap()),
        Arc::new(FakeRuntime::new()),
        Arc::new(RecordingSink::new()),
    ));
    (ctx, dir)
}

#[tokio::test]
async fn register_flow_persists_state() {
    let (url, server) = server_with_handshake(Handshake::Registered {
        agent_id: AgentId::from_string("agt-1"),
        token: "issued-token".into(),
        config: AgentConfigUpdate { metrics_interval: Some(10), ..Default::default() },
    })
    .await;
    let (ctx, _dir) = context(&url, Some("AB12-CD34-EF56-7890"));

    let established = establish(&ctx, false).await.unwrap();
    assert_eq!(established.agent_id, "agt-1");
    assert_eq!(established.config_update.unwrap().metrics_interval, Some(10));

    // The server saw a register frame with our code
    match server.await.unwrap().unwrap() {
        Handshake::Register { code, version } => {
            assert_eq!(code, "AB12-CD34-EF56-7890");
            assert_eq!(version, AGENT_VERSION);
        }
        other => panic!("unexpected frame: {other:?}"),
    }

    // And the issued token is persisted
    let state = ctx.state_store.load().unwrap().unwrap();
    assert_eq!(state.agent_id, "agt-1");
    assert_eq!(state.token, "issued-token");
}

#[tokio::test]
async fn authenticate_flow_uses_persisted_token() {
    let (url, server) = server_with_handshake(Handshake::Authenticated {
        agent_id: AgentId::from_string("agt-2"),
        config: AgentConfigUpdate::default(),
    })
    .await;
    let (ctx, _dir) = context(&url, None);
    ctx.state_store
        .save(&PersistedState {
            agent_id: "agt-2".into(),
            token: "stored-token".into(),
            server_url: url.clone(),
            registered_at: Utc::now(),
        })
        .unwrap();

    let established = establish(&ctx, false).await.unwrap();
    assert_eq!(established.agent_id, "agt-2");
    assert!(established.config_update.is_none());

    match server.await.unwrap().unwrap() {
        Handshake::Authenticate { token, .. } => assert_eq!(token, "stored-token"),
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test]
async fn error_reply_is_fatal_auth_failure() {
    let (url, _server) =
        server_with_handshake(Handshake::Error { error: "Authentication failed".into() }).await;
    let (ctx, _dir) = context(&url, Some("BAD1-BAD1-BAD1-BAD1"));

    match establish(&ctx, false).await {
        Err(ConnectError::Auth(message)) => assert_eq!(message, "Authentication failed"),
        other => panic!("expected auth failure, got {other:?}"),
    }
    // Nothing was persisted
    assert!(ctx.state_store.load().unwrap().is_none());
}

#[tokio::test]
async fn no_credentials_fails_before_network_use() {
    let (url, _server) = server_with_handshake(Handshake::Error { error: "unused".into() }).await;
    let (ctx, _dir) = context(&url, None);
    assert!(matches!(establish(&ctx, false).await, Err(ConnectError::NoCredentials)));
}

#[tokio::test]
async fn missing_server_url_is_an_error() {
    let (ctx, _dir) = context("", Some("AB12"));
    assert!(matches!(establish(&ctx, false).await, Err(ConnectError::NoServerUrl)));
}

#[tokio::test]
async fn session_dispatches_requests_and_replays_are_rejected() {
    // Server that sends two copies of the same nonce-carrying request
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        let request = Request::new("agent.ping", json!({}), 1).with_freshness(now, "a".repeat(32));
        let replayed = Request::new("agent.ping", json!({}), 2).with_freshness(now, "a".repeat(32));

        ws.send(Message::Text(request.encode().unwrap().into())).await.unwrap();
        ws.send(Message::Text(replayed.encode().unwrap().into())).await.unwrap();

        let mut responses = Vec::new();
        while responses.len() < 2 {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => responses.push(text.to_string()),
                Some(Ok(_)) => {}
                _ => break,
            }
        }
        responses
    });

    let (ctx, _dir) = context(&format!("ws://{addr}"), None);
    let sink = Arc::new(RecordingSink::new());
    let mut dispatcher = Dispatcher::new([PermissionTier::Read], sink);
    crate::rpc::methods::agent::register(&mut dispatcher, ctx.clone());

    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let session_shutdown = shutdown.clone();
    let session = tokio::spawn(async move {
        run_session(
            ws,
            Arc::new(dispatcher),
            ReplayGuard::new(SystemClock),
            rx,
            tx,
            &session_shutdown,
        )
        .await;
    });

    let responses = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server should see both responses")
        .unwrap();
    shutdown.cancel();
    let _ = session.await;

    // Responses may interleave; find them by id
    let parsed: Vec<tomo_wire::Response> =
        responses.iter().map(|r| serde_json::from_str(r).unwrap()).collect();
    let first = parsed.iter().find(|r| r.id == Some(json!(1))).unwrap();
    let second = parsed.iter().find(|r| r.id == Some(json!(2))).unwrap();
    assert!(first.is_success());
    let error = second.error.clone().unwrap();
    assert_eq!(error.code, tomo_wire::INVALID_REQUEST);
    assert!(error.message.to_lowercase().contains("replay"), "{}", error.message);
}
