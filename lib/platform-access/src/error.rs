//! Error types for the platform-access crate.
//!
//! - `ProviderError`: failures reported by the identity provider contract
//! - `AuthenticationError`: failures of session operations, as seen by callers

use std::fmt;

use crate::password::PasswordViolation;

/// Errors returned by an [`IdentityProvider`](crate::provider::IdentityProvider).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The email/password pair was rejected.
    InvalidCredentials,
    /// There is no current session to act on.
    NoSession,
    /// The provider refused the request (duplicate account, invalid email, ...).
    Rejected { reason: String },
    /// The provider could not be reached or answered unexpectedly.
    Unavailable { reason: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid login credentials"),
            Self::NoSession => write!(f, "no active provider session"),
            Self::Rejected { reason } => write!(f, "request rejected by provider: {reason}"),
            Self::Unavailable { reason } => write!(f, "identity provider unavailable: {reason}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from authentication operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// Credentials were rejected.
    InvalidCredentials,
    /// The issued or stored session is already expired.
    SessionExpired,
    /// Identity claims do not resolve to a valid user.
    MappingFailure { reason: String },
    /// The provider refused to create the account.
    SignupRejected { reason: String },
    /// The password fails the strength policy.
    WeakPassword { violations: Vec<PasswordViolation> },
    /// The operation needs a signed-in user.
    NotAuthenticated,
    /// Opaque upstream failure.
    Provider { reason: String },
}

impl AuthenticationError {
    /// Message safe to show to the user.
    ///
    /// Credential failures never say which part was wrong.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::SessionExpired => "Your session has expired. Please sign in again.".to_string(),
            Self::MappingFailure { .. } => {
                "Your account could not be loaded. Please contact support.".to_string()
            }
            Self::SignupRejected { .. } => "We could not create your account.".to_string(),
            Self::WeakPassword { violations } => violations
                .iter()
                .map(|v| v.message())
                .collect::<Vec<_>>()
                .join("; "),
            Self::NotAuthenticated => "Please sign in to continue.".to_string(),
            Self::Provider { .. } => {
                "The authentication service is unavailable. Please try again.".to_string()
            }
        }
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::SessionExpired => write!(f, "session has expired"),
            Self::MappingFailure { reason } => write!(f, "user mapping failed: {reason}"),
            Self::SignupRejected { reason } => write!(f, "sign-up rejected: {reason}"),
            Self::WeakPassword { violations } => {
                write!(f, "password fails {} strength rule(s)", violations.len())
            }
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::Provider { reason } => write!(f, "identity provider error: {reason}"),
        }
    }
}

impl std::error::Error for AuthenticationError {}

impl From<ProviderError> for AuthenticationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials => Self::InvalidCredentials,
            ProviderError::NoSession => Self::NotAuthenticated,
            ProviderError::Rejected { reason } | ProviderError::Unavailable { reason } => {
                Self::Provider { reason }
            }
        }
    }
}
