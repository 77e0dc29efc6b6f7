// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between agent and backend.
//!
//! Two frame families share one WebSocket text channel:
//!
//! - handshake frames (`register`/`authenticate` and their replies), sent
//!   before any RPC traffic
//! - JSON-RPC 2.0 frames (requests, notifications, responses), both
//!   directions after the handshake
//!
//! Requests may carry optional `timestamp`/`nonce` replay-protection
//! fields; they are part of the frame, validation lives in `tomo-guard`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codes;
mod handshake;
mod rpc;

pub use codes::{
    code, ErrorCode, COMMAND_BLOCKED, CONTAINER_BLOCKED, CONTAINER_RUNTIME, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, PERMISSION_DENIED, RATE_LIMIT,
};
pub use handshake::Handshake;
pub use rpc::{decode_incoming, Incoming, Request, RequestId, Response, RpcError, WireError};
