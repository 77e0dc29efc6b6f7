// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command allowlist for `system.exec`.
//!
//! An ordered list of regex entries; the first whole-string match wins.
//! Entries cap the requested timeout and may attach a deeper validator
//! (the `docker run` policy check).

use super::docker::validate_run_command;
use super::PolicyViolation;
use regex::Regex;
use thiserror::Error;

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Command not in allowlist")]
    NotAllowed,

    #[error("Timeout {requested}s exceeds maximum {max}s for this command")]
    TimeoutTooHigh { requested: u64, max: u64 },

    #[error(transparent)]
    Policy(#[from] PolicyViolation),
}

const DEFAULT_MAX_TIMEOUT_SECS: u64 = 300;

type EntryValidator = fn(&str) -> Result<(), PolicyViolation>;

/// One allowlist entry.
#[derive(Debug)]
pub struct AllowlistEntry {
    pattern: Regex,
    pub description: &'static str,
    pub max_timeout_secs: u64,
    validator: Option<EntryValidator>,
}

impl AllowlistEntry {
    fn new(pattern: &str, description: &'static str) -> Self {
        #[allow(clippy::unwrap_used)] // static patterns, exercised by tests
        Self {
            pattern: Regex::new(pattern).unwrap(),
            description,
            max_timeout_secs: DEFAULT_MAX_TIMEOUT_SECS,
            validator: None,
        }
    }

    fn max_timeout(mut self, secs: u64) -> Self {
        self.max_timeout_secs = secs;
        self
    }

    fn with_validator(mut self, validator: EntryValidator) -> Self {
        self.validator = Some(validator);
        self
    }
}

fn default_allowlist() -> Vec<AllowlistEntry> {
    vec![
        // Docker read-only info
        AllowlistEntry::new(
            r"^docker\s+ps(\s+--format\s+'[^']*')?(\s+--filter\s+\S+)*(\s+-a)?\s*$",
            "List running containers",
        ),
        AllowlistEntry::new(r"^docker\s+images(\s+--format\s+'[^']*')?\s*$", "List images"),
        AllowlistEntry::new(r"^docker\s+version\s*$", "Get Docker version"),
        AllowlistEntry::new(r"^docker\s+info\s*$", "Get Docker info"),
        // Pull for deployment
        AllowlistEntry::new(r"^docker\s+pull\s+[\w./:@-]+\s*$", "Pull Docker image")
            .max_timeout(600),
        // Run for deployment, with deep validation
        AllowlistEntry::new(r"^docker\s+run\s+-d\s+.+$", "Run Docker container (detached)")
            .max_timeout(300)
            .with_validator(validate_run_command),
        // Container lifecycle
        AllowlistEntry::new(
            r"^docker\s+(stop|start|restart|kill)\s+[\w-]+(\s+--time\s+\d+)?\s*$",
            "Start/stop Docker container",
        )
        .max_timeout(120),
        AllowlistEntry::new(r"^docker\s+rm(\s+-f)?\s+[\w-]+\s*$", "Remove Docker container")
            .max_timeout(60),
        // Inspection and logs
        AllowlistEntry::new(
            r"^docker\s+inspect\s+[\w./:@-]+(\s+--format\s+.+)?(\s+2>/dev/null)?\s*$",
            "Inspect container or image",
        )
        .max_timeout(30),
        AllowlistEntry::new(r"^docker\s+logs\s+(--tail\s+\d+\s+)?[\w-]+\s*$", "Get container logs"),
        AllowlistEntry::new(
            r"^docker\s+update\s+--restart\s+\S+\s+[\w-]+\s*$",
            "Update container restart policy",
        )
        .max_timeout(30),
        AllowlistEntry::new(
            r"^docker\s+image\s+inspect\s+[\w./:@-]+(\s+>\s*/dev/null\s+2>&1)?\s*$",
            "Check if Docker image exists",
        )
        .max_timeout(10),
        // Safe in-container exec for health checks
        AllowlistEntry::new(
            r"^docker\s+exec\s+[\w-]+\s+(curl|wget|nc|cat|ls|echo|ping|nslookup)\s+[^;&|`$]+$",
            "Execute command in container (safe commands)",
        )
        .max_timeout(30),
        // Pre-flight checks
        AllowlistEntry::new(
            r"^(df|free|docker\s+info|docker\s+ps)\s+[^;&|`$]*$",
            "System pre-flight checks",
        )
        .max_timeout(30),
        // Deployment directories
        AllowlistEntry::new(
            r"^mkdir\s+-p\s+/(DATA|opt/tomo)/[\w/.@-]+\s*$",
            "Create deployment directories",
        )
        .max_timeout(10),
        // System info
        AllowlistEntry::new(r"^uname\s+-[a-z]+\s*$", "Get system info"),
        AllowlistEntry::new(r"^hostname\s*$", "Get hostname"),
        AllowlistEntry::new(r"^uptime\s*$", "Get uptime"),
        AllowlistEntry::new(r"^df\s+-h\s*$", "Get disk usage"),
        AllowlistEntry::new(r"^free\s+-[hm]\s*$", "Get memory usage"),
        // Pull-job scratch files
        AllowlistEntry::new(
            r"^cat\s+/tmp/pull-job-[a-f0-9-]+/(status|output|progress)\s*$",
            "Check pull job status",
        )
        .max_timeout(10),
        AllowlistEntry::new(r"^rm\s+-rf\s+/tmp/pull-job-[a-f0-9-]+\s*$", "Cleanup pull job directory")
            .max_timeout(10),
    ]
}

/// Validates commands against the allowlist.
pub struct CommandValidator {
    entries: Vec<AllowlistEntry>,
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandValidator {
    pub fn new() -> Self {
        Self { entries: default_allowlist() }
    }

    #[cfg(test)]
    fn with_entries(entries: Vec<AllowlistEntry>) -> Self {
        Self { entries }
    }

    /// Validate a command and requested timeout, returning the matched entry.
    pub fn validate(
        &self,
        command: &str,
        timeout_secs: u64,
    ) -> Result<&AllowlistEntry, CommandError> {
        let command = normalize_whitespace(command);

        for entry in &self.entries {
            if entry.pattern.is_match(&command) {
                if timeout_secs > entry.max_timeout_secs {
                    return Err(CommandError::TimeoutTooHigh {
                        requested: timeout_secs,
                        max: entry.max_timeout_secs,
                    });
                }
                if let Some(validator) = entry.validator {
                    validator(&command)?;
                }
                tracing::debug!(description = entry.description, "command allowed");
                return Ok(entry);
            }
        }

        Err(CommandError::NotAllowed)
    }
}

fn normalize_whitespace(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
