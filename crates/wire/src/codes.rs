// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC error-code registry.

/// A JSON-RPC error code.
pub type ErrorCode = i32;

// Standard JSON-RPC 2.0 error codes
pub const PARSE_ERROR: ErrorCode = -32700;
pub const INVALID_REQUEST: ErrorCode = -32600;
pub const METHOD_NOT_FOUND: ErrorCode = -32601;
pub const INVALID_PARAMS: ErrorCode = -32602;
pub const INTERNAL_ERROR: ErrorCode = -32603;

// Custom codes for agent operations
pub const PERMISSION_DENIED: ErrorCode = -32001;
pub const RATE_LIMIT: ErrorCode = -32002;
pub const CONTAINER_RUNTIME: ErrorCode = -32003;
pub const CONTAINER_BLOCKED: ErrorCode = -32004;
pub const COMMAND_BLOCKED: ErrorCode = -32005;

/// Short stable label for a code, used in logs and audit events.
pub fn code(value: ErrorCode) -> &'static str {
    match value {
        PARSE_ERROR => "parse_error",
        INVALID_REQUEST => "invalid_request",
        METHOD_NOT_FOUND => "method_not_found",
        INVALID_PARAMS => "invalid_params",
        INTERNAL_ERROR => "internal_error",
        PERMISSION_DENIED => "permission_denied",
        RATE_LIMIT => "rate_limit",
        CONTAINER_RUNTIME => "container_runtime",
        CONTAINER_BLOCKED => "container_blocked",
        COMMAND_BLOCKED => "command_blocked",
        _ => "unknown",
    }
}
