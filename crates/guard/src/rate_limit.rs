// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command execution rate limiting.
//!
//! A sliding one-minute window bounds total command volume and a counter
//! bounds concurrency. `acquire` hands back a scoped [`CommandSlot`] whose
//! drop releases the concurrency slot, so callers cannot forget to pair
//! acquire/release.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tomo_core::Clock;

pub const DEFAULT_MAX_PER_MINUTE: usize = 30;
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Why a command slot was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Too many concurrent commands (max {max})")]
    TooManyConcurrent { max: usize },

    #[error("Rate limit exceeded ({max}/min)")]
    WindowExhausted { max: usize },
}

#[derive(Debug)]
struct State {
    /// Epoch-ms of commands admitted in the last minute
    admitted: VecDeque<u64>,
    concurrent: usize,
}

/// Sliding-window rate limiter for `system.exec`.
#[derive(Clone)]
pub struct CommandRateLimiter<C: Clock> {
    clock: C,
    max_per_minute: usize,
    max_concurrent: usize,
    state: Arc<Mutex<State>>,
}

impl<C: Clock> CommandRateLimiter<C> {
    pub fn new(clock: C) -> Self {
        Self::with_limits(clock, DEFAULT_MAX_PER_MINUTE, DEFAULT_MAX_CONCURRENT)
    }

    pub fn with_limits(clock: C, max_per_minute: usize, max_concurrent: usize) -> Self {
        Self {
            clock,
            max_per_minute,
            max_concurrent,
            state: Arc::new(Mutex::new(State { admitted: VecDeque::new(), concurrent: 0 })),
        }
    }

    /// Acquire permission to run one command.
    pub fn acquire(&self) -> Result<CommandSlot, RateLimitError> {
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();

        if state.concurrent >= self.max_concurrent {
            return Err(RateLimitError::TooManyConcurrent { max: self.max_concurrent });
        }

        let cutoff = now.saturating_sub(60_000);
        while state.admitted.front().is_some_and(|t| *t <= cutoff) {
            state.admitted.pop_front();
        }
        if state.admitted.len() >= self.max_per_minute {
            return Err(RateLimitError::WindowExhausted { max: self.max_per_minute });
        }

        state.admitted.push_back(now);
        state.concurrent += 1;
        Ok(CommandSlot { state: Arc::clone(&self.state) })
    }

    #[cfg(test)]
    fn concurrent(&self) -> usize {
        self.state.lock().concurrent
    }
}

/// Held while a command executes; releases the concurrency slot on drop.
#[derive(Debug)]
pub struct CommandSlot {
    state: Arc<Mutex<State>>,
}

impl Drop for CommandSlot {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.concurrent = state.concurrent.saturating_sub(1);
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
