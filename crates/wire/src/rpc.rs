// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC 2.0 frames.

use crate::codes::{self, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Request id: absent for notifications, number or string otherwise.
pub type RequestId = Value;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is neither a request nor a response")]
    UnknownFrame,
}

/// A JSON-RPC request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Absent id marks a notification; no response may be sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Replay protection: Unix seconds at send time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// Replay protection: 32-hex random nonce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params: Some(params),
            id: Some(id.into()),
            timestamp: None,
            nonce: None,
        }
    }

    /// Notification: request without an id.
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params: Some(params),
            id: None,
            timestamp: None,
            nonce: None,
        }
    }

    /// Attach replay-protection fields.
    pub fn with_freshness(mut self, timestamp: f64, nonce: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp);
        self.nonce = Some(nonce.into());
        self
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error object inside a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_request(reason: &str) -> Self {
        Self::new(codes::INVALID_REQUEST, reason)
    }

    pub fn permission_denied(required: &str) -> Self {
        Self::new(codes::PERMISSION_DENIED, format!("Permission denied: requires {required}"))
    }

    pub fn command_blocked(reason: impl Into<String>) -> Self {
        Self::new(codes::COMMAND_BLOCKED, reason)
    }

    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self::new(codes::RATE_LIMIT, reason)
    }

    /// Generic internal error; never carries handler detail.
    pub fn internal() -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal server error")
    }
}

/// A JSON-RPC response. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<RequestId>,
}

impl Response {
    pub fn ok(id: Option<RequestId>, result: Value) -> Self {
        Self { jsonrpc: jsonrpc_version(), result: Some(result), error: None, id }
    }

    pub fn fail(id: Option<RequestId>, error: RpcError) -> Self {
        Self { jsonrpc: jsonrpc_version(), result: None, error: Some(error), id }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Any post-handshake frame read off the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request(Request),
    Response(Response),
}

/// Classify a raw text frame.
///
/// A frame with a `method` key is a request (or notification); anything
/// else with `result`/`error` is a response.
pub fn decode_incoming(text: &str) -> Result<Incoming, WireError> {
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(WireError::UnknownFrame);
    };
    if object.contains_key("method") {
        Ok(Incoming::Request(serde_json::from_value(value)?))
    } else if object.contains_key("result") || object.contains_key("error") {
        Ok(Incoming::Response(serde_json::from_value(value)?))
    } else {
        Err(WireError::UnknownFrame)
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
