// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message replay protection.
//!
//! Requests may carry a `(timestamp, nonce)` pair; the guard rejects stale
//! timestamps, timestamps from the future beyond clock-skew tolerance, and
//! nonces it has already admitted. Nonce memory is bounded.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tomo_core::Clock;

/// Window for accepting messages.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(300);
/// Allowed clock skew for messages stamped in the future.
pub const CLOCK_SKEW_TOLERANCE: Duration = Duration::from_secs(30);
/// Upper bound on remembered nonces.
pub const MAX_NONCES: usize = 10_000;

/// Why a message was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error("Message too old: {age_secs:.1}s > {max_secs}s")]
    TooOld { age_secs: f64, max_secs: u64 },

    #[error("Message timestamp in future")]
    FromFuture,

    #[error("Duplicate nonce - possible replay attack")]
    Replayed,
}

/// Freshness + nonce-memory guard.
///
/// Process-wide on the agent (one instance per process, shared by every
/// connection to the single backend peer).
#[derive(Clone)]
pub struct ReplayGuard<C: Clock> {
    clock: C,
    freshness_window: Duration,
    skew_tolerance: Duration,
    max_nonces: usize,
    /// nonce → epoch seconds at admission
    seen: Arc<Mutex<HashMap<String, f64>>>,
}

impl<C: Clock> ReplayGuard<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            freshness_window: FRESHNESS_WINDOW,
            skew_tolerance: CLOCK_SKEW_TOLERANCE,
            max_nonces: MAX_NONCES,
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn with_limits(mut self, window: Duration, skew: Duration, max_nonces: usize) -> Self {
        self.freshness_window = window;
        self.skew_tolerance = skew;
        self.max_nonces = max_nonces;
        self
    }

    /// Validate a `(timestamp, nonce)` pair and admit the nonce on success.
    ///
    /// `timestamp` is Unix seconds as stamped by the sender.
    pub fn validate(&self, timestamp: f64, nonce: &str) -> Result<(), ReplayError> {
        let now = self.clock.epoch_ms() as f64 / 1000.0;
        let age = now - timestamp;

        let max_secs = self.freshness_window.as_secs();
        if age > max_secs as f64 {
            return Err(ReplayError::TooOld { age_secs: age, max_secs });
        }
        if age < -(self.skew_tolerance.as_secs() as f64) {
            return Err(ReplayError::FromFuture);
        }

        let mut seen = self.seen.lock();
        if seen.contains_key(nonce) {
            return Err(ReplayError::Replayed);
        }
        seen.insert(nonce.to_string(), now);
        Self::purge_expired(&mut seen, now, self.freshness_window, self.max_nonces);
        Ok(())
    }

    /// Drop nonces past twice the freshness window once the set is half full.
    fn purge_expired(
        seen: &mut HashMap<String, f64>,
        now: f64,
        window: Duration,
        max_nonces: usize,
    ) {
        if seen.len() < max_nonces / 2 {
            return;
        }
        let horizon = (window.as_secs() * 2) as f64;
        seen.retain(|_, admitted| now - *admitted <= horizon);
    }

    #[cfg(test)]
    fn remembered(&self) -> usize {
        self.seen.lock().len()
    }
}

/// Random 16-byte hex nonce for outgoing requests.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes[..]);
    hex::encode(bytes)
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;
