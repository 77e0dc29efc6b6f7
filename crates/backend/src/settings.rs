// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Settings keys and defaults consumed by the core.

use tomo_store::Store;

pub const AGENT_METRICS_INTERVAL: &str = "agent_metrics_interval";
pub const AGENT_HEALTH_INTERVAL: &str = "agent_health_interval";
pub const TOKEN_TTL_DAYS: &str = "agent_token_ttl_days";
pub const ROTATION_WINDOW_DAYS: &str = "agent_token_rotation_window_days";
pub const ROTATION_GRACE_SECONDS: &str = "agent_token_rotation_grace_seconds";

pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_TOKEN_TTL_DAYS: u64 = 30;
pub const DEFAULT_ROTATION_WINDOW_DAYS: u64 = 7;
pub const DEFAULT_ROTATION_GRACE_SECS: u64 = 300;

/// Parsed-scalar view over the settings store.
#[derive(Clone)]
pub struct Settings {
    store: Store,
}

impl Settings {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.store.setting_u64(AGENT_METRICS_INTERVAL).unwrap_or(DEFAULT_METRICS_INTERVAL_SECS)
    }

    pub fn health_interval_secs(&self) -> u64 {
        self.store.setting_u64(AGENT_HEALTH_INTERVAL).unwrap_or(DEFAULT_HEALTH_INTERVAL_SECS)
    }

    pub fn token_ttl_days(&self) -> u64 {
        self.store.setting_u64(TOKEN_TTL_DAYS).unwrap_or(DEFAULT_TOKEN_TTL_DAYS)
    }

    pub fn rotation_window_days(&self) -> u64 {
        self.store.setting_u64(ROTATION_WINDOW_DAYS).unwrap_or(DEFAULT_ROTATION_WINDOW_DAYS)
    }

    pub fn rotation_grace_secs(&self) -> u64 {
        self.store.setting_u64(ROTATION_GRACE_SECONDS).unwrap_or(DEFAULT_ROTATION_GRACE_SECS)
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
