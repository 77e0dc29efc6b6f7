// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC dispatch and the agent's method surface.

mod dispatcher;
pub mod methods;

pub use dispatcher::{Dispatcher, Handler, HandlerResult};

use serde_json::Value;
use tomo_wire::RpcError;

/// Deserialize request params into a typed struct.
///
/// Missing or `null` params become `{}` so parameter structs with
/// defaults keep working; anything else that fails to parse is
/// `invalid-params`.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let value = match params {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value) => value,
    };
    serde_json::from_value(value)
        .map_err(|e| RpcError::new(tomo_wire::INVALID_PARAMS, format!("invalid params: {e}")))
}

/// Map a runtime failure onto the wire.
pub fn runtime_error(error: crate::runtime::RuntimeError) -> RpcError {
    RpcError::new(tomo_wire::CONTAINER_RUNTIME, error.to_string())
}

/// Serialize a handler result; serialization failures are internal
/// errors (and logged, never mirrored).
pub fn to_value<T: serde::Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value).map_err(|error| {
        tracing::error!(%error, "handler result serialization failed");
        RpcError::internal()
    })
}
