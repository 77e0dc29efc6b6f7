// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment configuration.

use tomo_core::AgentConfig;

/// Environment variable names.
pub const SERVER_URL: &str = "SERVER_URL";
pub const REGISTER_CODE: &str = "REGISTER_CODE";
pub const DEV_MODE: &str = "TOMO_DEV";
pub const HOSTNAME: &str = "HOSTNAME";

/// Configuration read from the process environment at boot.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config: AgentConfig,
    /// `TOMO_DEV=1` disables TLS verification
    pub dev_mode: bool,
}

impl EnvConfig {
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Testable constructor taking an env lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let config = AgentConfig {
            server_url: lookup(SERVER_URL).unwrap_or_default(),
            register_code: lookup(REGISTER_CODE).filter(|code| !code.is_empty()),
            ..AgentConfig::default()
        };
        let dev_mode = lookup(DEV_MODE).as_deref() == Some("1");
        Self { config, dev_mode }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
