// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{
    code, CONTAINER_BLOCKED, CONTAINER_RUNTIME, COMMAND_BLOCKED, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, PERMISSION_DENIED, RATE_LIMIT,
};
use serde_json::json;

#[test]
fn request_encodes_jsonrpc_20() {
    let request = Request::new("agent.ping", json!({}), 1);
    let value: serde_json::Value = serde_json::from_str(&request.encode().unwrap()).unwrap();
    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["method"], "agent.ping");
    assert_eq!(value["id"], 1);
}

#[test]
fn notification_has_no_id() {
    let note = Request::notification("metrics.update", json!({"cpu": 1.0}));
    assert!(note.is_notification());
    let value: serde_json::Value = serde_json::from_str(&note.encode().unwrap()).unwrap();
    assert!(value.get("id").is_none());
}

#[test]
fn freshness_fields_ride_on_requests() {
    let request = Request::new("system.exec", json!({"command": "uptime"}), 7)
        .with_freshness(1_700_000_000.0, "aa".repeat(16));
    let value: serde_json::Value = serde_json::from_str(&request.encode().unwrap()).unwrap();
    assert_eq!(value["timestamp"], 1_700_000_000.0);
    assert_eq!(value["nonce"].as_str().unwrap().len(), 32);
}

#[test]
fn response_has_exactly_one_of_result_error() {
    let ok = Response::ok(Some(json!(3)), json!({"status": "ok"}));
    assert!(ok.is_success());
    let value: serde_json::Value = serde_json::from_str(&ok.encode().unwrap()).unwrap();
    assert!(value.get("error").is_none());

    let fail = Response::fail(Some(json!(3)), RpcError::method_not_found("nope"));
    assert!(!fail.is_success());
    let value: serde_json::Value = serde_json::from_str(&fail.encode().unwrap()).unwrap();
    assert!(value.get("result").is_none());
    assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);
}

#[test]
fn decode_incoming_classifies_by_method_key() {
    let request = decode_incoming(r#"{"jsonrpc":"2.0","method":"agent.ping","id":1}"#).unwrap();
    assert!(matches!(request, Incoming::Request(_)));

    let response = decode_incoming(r#"{"jsonrpc":"2.0","result":{},"id":1}"#).unwrap();
    assert!(matches!(response, Incoming::Response(_)));

    let error = decode_incoming(r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"x"},"id":1}"#)
        .unwrap();
    match error {
        Incoming::Response(response) => {
            assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND)
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn decode_incoming_rejects_non_frames() {
    assert!(matches!(decode_incoming("[]"), Err(WireError::UnknownFrame)));
    assert!(matches!(decode_incoming(r#"{"jsonrpc":"2.0"}"#), Err(WireError::UnknownFrame)));
    assert!(matches!(decode_incoming("not json"), Err(WireError::Json(_))));
}

#[yare::parameterized(
    parse = { PARSE_ERROR, "parse_error" },
    invalid = { INVALID_REQUEST, "invalid_request" },
    not_found = { METHOD_NOT_FOUND, "method_not_found" },
    params = { INVALID_PARAMS, "invalid_params" },
    internal = { INTERNAL_ERROR, "internal_error" },
    permission = { PERMISSION_DENIED, "permission_denied" },
    rate = { RATE_LIMIT, "rate_limit" },
    runtime = { CONTAINER_RUNTIME, "container_runtime" },
    container = { CONTAINER_BLOCKED, "container_blocked" },
    command = { COMMAND_BLOCKED, "command_blocked" },
)]
fn code_labels_are_stable(value: ErrorCode, label: &str) {
    assert_eq!(code(value), label);
}

#[test]
fn internal_error_never_leaks_detail() {
    let error = RpcError::internal();
    assert_eq!(error.message, "Internal server error");
    assert!(error.data.is_none());
}
