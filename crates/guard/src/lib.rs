// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tomo-guard: security layer shared by agent and backend.
//!
//! Replay protection, the command allowlist and container validators,
//! permission tiers, command rate limiting, log redaction, and the audit
//! event sink. Everything here is policy; enforcement points live in the
//! dispatcher and the method handlers.

pub mod audit;
pub mod permissions;
pub mod rate_limit;
pub mod redact;
pub mod replay;
pub mod validation;

#[cfg(any(test, feature = "test-support"))]
pub use audit::RecordingSink;
pub use audit::{AuditEvent, AuditSink, TracingSink};
pub use permissions::{method_tier, PermissionTier};
pub use rate_limit::{CommandRateLimiter, CommandSlot, RateLimitError};
pub use redact::{redact_command, redact_value};
pub use replay::{generate_nonce, ReplayError, ReplayGuard};
pub use validation::{
    validate_container_params, validate_run_command, CommandError, CommandValidator,
    ContainerPolicyInput, MountRequest, PolicyViolation,
};
