//! Identity provider contract.
//!
//! The hosted backend owns accounts and tokens. This module describes what
//! the session manager needs from it and the shapes it hands back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::ProviderError;
use crate::role::{Plan, Role};
use crate::token;
use fieldcheck_core::{ClientId, TeamId};

/// Email/password pair for sign-in.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Account data submitted at registration.
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub plan: Plan,
    pub team_id: Option<TeamId>,
    pub client_id: Option<ClientId>,
}

impl Registration {
    /// Metadata attached to the provider account.
    #[must_use]
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("full_name".to_string(), Value::from(self.full_name.clone()));
        metadata.insert("role".to_string(), Value::from(self.role.as_str()));
        metadata.insert("plan".to_string(), Value::from(self.plan.as_str()));
        if let Some(team_id) = &self.team_id {
            metadata.insert("team_id".to_string(), Value::from(team_id.as_str()));
        }
        if let Some(client_id) = &self.client_id {
            metadata.insert("client_id".to_string(), Value::from(client_id.as_str()));
        }
        metadata
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("full_name", &self.full_name)
            .field("role", &self.role)
            .field("plan", &self.plan)
            .field("team_id", &self.team_id)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// An account as the provider describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUser {
    /// Provider-issued account id.
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Metadata the user (or the registration form) supplied.
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    /// Metadata only the backend can write.
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
}

impl ProviderUser {
    /// Looks a key up in app metadata, then user metadata.
    ///
    /// A value the backend wrote always wins over one the user supplied.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.app_metadata
            .get(key)
            .or_else(|| self.user_metadata.get(key))
            .and_then(Value::as_str)
    }
}

/// A provider session: tokens plus the account they belong to.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry reported by the provider; the token's own `exp` wins when both exist.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: ProviderUser,
}

impl ProviderSession {
    /// Expiry of the access token: its `exp` claim, else the provider's value.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        token::expiration_time(&self.access_token).or(self.expires_at)
    }

    /// True if the access token is expired or unreadable.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        token::is_expired(&self.access_token)
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Result of a sign-up call.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: ProviderUser,
    /// Present only when the provider signs new accounts in immediately.
    pub session: Option<ProviderSession>,
}

/// Notifications emitted by the provider for the life of the application.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(ProviderSession),
    SignedOut,
    TokenRefreshed(ProviderSession),
    UserUpdated(ProviderUser),
}

impl AuthEvent {
    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::UserUpdated(_) => "user_updated",
        }
    }
}

/// What the session manager needs from the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Signs in with email and password.
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderSession, ProviderError>;

    /// Creates an account with the registration metadata attached.
    async fn sign_up(&self, registration: &Registration) -> Result<SignUpOutcome, ProviderError>;

    /// Ends the provider session.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Returns the session the provider currently holds, if any.
    async fn get_session(&self) -> Result<Option<ProviderSession>, ProviderError>;

    /// Exchanges the held refresh token for new tokens.
    async fn refresh_session(&self) -> Result<ProviderSession, ProviderError>;

    /// Sends a password-reset email.
    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), ProviderError>;

    /// Sets a new password for the signed-in account.
    async fn update_password(&self, new_password: &str) -> Result<ProviderUser, ProviderError>;

    /// Subscribes to auth-state notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
