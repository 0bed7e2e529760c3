//! Errors from the HTTP adapters.
//!
//! `BackendError` only describes what happened on the wire. The adapters
//! convert it into the contract errors (`ProviderError`, `StoreError`) at
//! their trait boundaries.

use std::fmt;

use fieldcheck_data::StoreError;
use fieldcheck_platform_access::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The connection settings cannot be used.
    InvalidConfig { reason: String },
    /// The request never got a response.
    Transport { endpoint: String, reason: String },
    /// The request timed out.
    Timeout { endpoint: String },
    /// The backend answered with a non-success status.
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    /// The response body was not what the endpoint promises.
    Decode { endpoint: String, reason: String },
    /// The saved session could not be read or written.
    Persistence { path: String, reason: String },
}

impl BackendError {
    /// True for 4xx responses: the backend understood and refused.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Status { status, .. } if (400..500).contains(status))
    }

    fn reason(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid backend configuration: {reason}"),
            Self::Transport { endpoint, reason } => {
                write!(f, "request to {endpoint} failed: {reason}")
            }
            Self::Timeout { endpoint } => write!(f, "request to {endpoint} timed out"),
            Self::Status {
                endpoint,
                status,
                message,
            } => write!(f, "{endpoint} returned HTTP {status}: {message}"),
            Self::Decode { endpoint, reason } => {
                write!(f, "unexpected response from {endpoint}: {reason}")
            }
            Self::Persistence { path, reason } => {
                write!(f, "saved session at {path} unusable: {reason}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for ProviderError {
    fn from(err: BackendError) -> Self {
        if err.is_client_error() {
            Self::Rejected {
                reason: err.reason(),
            }
        } else {
            Self::Unavailable {
                reason: err.to_string(),
            }
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        if err.is_client_error() {
            Self::Rejected {
                reason: err.reason(),
            }
        } else {
            Self::Unavailable {
                reason: err.to_string(),
            }
        }
    }
}
