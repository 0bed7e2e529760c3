//! Strongly-typed ID types for domain entities.
//!
//! Users, teams, clients and records are identified by opaque strings issued
//! by the hosted backend (typically UUIDs). The application never interprets
//! them, it only compares them. Sessions are the one thing identified locally,
//! using ULIDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed wrapper around a backend-issued ID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an ID from its backend representation.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the ID, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        id_type: stringify!($name),
                        reason: "empty identifier".to_string(),
                    });
                }
                Ok(Self(trimmed.to_string()))
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of an authenticated principal, issued by the identity provider.
    UserId
);

define_id!(
    /// Identifier of an inspection team.
    TeamId
);

define_id!(
    /// Identifier of a client organisation.
    ClientId
);

define_id!(
    /// Identifier of an inspection.
    InspectionId
);

define_id!(
    /// Identifier of an inspection template.
    TemplateId
);

define_id!(
    /// Identifier of a single test recorded during an inspection.
    TestId
);

/// Locally generated identifier for one authenticated session.
///
/// A new one is minted every time the orchestrator arms timers, so a timer
/// callback can tell whether it still belongs to the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Creates a new session ID with a randomly generated ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess_{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("sess_").unwrap_or(s);
        Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
            id_type: "SessionId",
            reason: e.to_string(),
        })
    }
}
