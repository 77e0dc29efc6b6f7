// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newtype IDs for registry entities.
//!
//! IDs are opaque strings generated as `{prefix}{nanoid}` (4-char type
//! prefix + 19-char nanoid). `from_string` accepts any string so records
//! round-trip through snapshots and the wire unchanged.

/// Define a `String`-backed newtype ID with a type prefix.
///
/// Generates `new()` for random generation, `from_string()`, `as_str()`,
/// `Display`, `From<String>`, `From<&str>`, `PartialEq<str>` and
/// `Borrow<str>` implementations.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random ID with the type prefix.
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19)))
            }

            /// Create an ID from an existing string.
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent record.
    ///
    /// One agent is bound to exactly one server; the live channel for an
    /// agent is looked up by this ID in the backend hub.
    pub struct AgentId("agt-");
}

define_id! {
    /// Identifier of the server (managed host) an agent runs on.
    pub struct ServerId("srv-");
}

define_id! {
    /// Identifier for one app installation on one server.
    pub struct InstallId("ins-");
}

define_id! {
    /// Identifier for a registration code row.
    pub struct CodeId("cod-");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
