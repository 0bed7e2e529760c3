//! Mapping provider identities to application users.
//!
//! The role is taken from the first source that yields a known value:
//!
//! 1. the configured access-token claim (set by the backend, not editable by users)
//! 2. the `role` key in account metadata, app metadata before user metadata
//! 3. [`Role::LOWEST`]
//!
//! An unrecognised value at any step is skipped, so a bad claim can only ever
//! lower privilege.

use std::str::FromStr;

use chrono::Utc;
use fieldcheck_core::{ClientId, TeamId, UserId};
use tracing::warn;

use crate::config::IdentityConfig;
use crate::error::AuthenticationError;
use crate::provider::{ProviderSession, ProviderUser};
use crate::role::{Plan, Role};
use crate::token;
use crate::user::{SessionTokens, User};

/// Builds [`User`] records from provider accounts and sessions.
#[derive(Debug, Clone, Default)]
pub struct UserMapper {
    config: IdentityConfig,
}

impl UserMapper {
    #[must_use]
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Maps a provider account, plus its session when there is one.
    ///
    /// # Errors
    ///
    /// `MappingFailure` if the account has no id or email.
    /// `SessionExpired` if a session is given but its expiry cannot be read.
    pub fn map(
        &self,
        account: &ProviderUser,
        session: Option<&ProviderSession>,
    ) -> Result<User, AuthenticationError> {
        let id = UserId::from_str(&account.id).map_err(|_| AuthenticationError::MappingFailure {
            reason: "provider account has no id".to_string(),
        })?;

        let email = account
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthenticationError::MappingFailure {
                reason: format!("provider account {id} has no email"),
            })?
            .to_string();

        let role = self.resolve_role(account, session.map(|s| s.access_token.as_str()));
        let plan = account
            .metadata_str("plan")
            .and_then(|p| Plan::from_str(p).ok())
            .unwrap_or_default();

        let team_id = account
            .metadata_str("team_id")
            .and_then(|t| TeamId::from_str(t).ok());
        let client_id = account
            .metadata_str("client_id")
            .and_then(|c| ClientId::from_str(c).ok());

        let display_name = account
            .metadata_str("full_name")
            .or_else(|| account.metadata_str("name"))
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| local_part(&email).to_string(), str::to_string);

        let tokens = match session {
            Some(session) => {
                let expires_at = session.expiry().ok_or(AuthenticationError::SessionExpired)?;
                Some(SessionTokens {
                    access_token: session.access_token.clone(),
                    refresh_token: session.refresh_token.clone(),
                    expires_at,
                })
            }
            None => None,
        };

        Ok(User::new(id, email, display_name)
            .with_role(role)
            .with_plan(plan)
            .with_team(team_id)
            .with_client(client_id)
            .with_created_at(account.created_at.unwrap_or_else(Utc::now))
            .with_tokens(tokens))
    }

    fn resolve_role(&self, account: &ProviderUser, access_token: Option<&str>) -> Role {
        let claimed = access_token.and_then(|t| self.role_from_token(t, &account.id));
        let metadata = account
            .metadata_str(self.config.metadata_role_key())
            .and_then(|raw| match Role::from_str(raw) {
                Ok(role) => Some(role),
                Err(e) => {
                    warn!(user_id = %account.id, error = %e, "ignoring metadata role");
                    None
                }
            });

        match (claimed, metadata) {
            (Some(claimed), Some(metadata)) if claimed != metadata => {
                warn!(
                    user_id = %account.id,
                    token_role = %claimed,
                    metadata_role = %metadata,
                    "role claim disagrees with account metadata; using token claim"
                );
                claimed
            }
            (Some(claimed), _) => claimed,
            (None, Some(metadata)) => metadata,
            (None, None) => Role::LOWEST,
        }
    }

    fn role_from_token(&self, access_token: &str, user_id: &str) -> Option<Role> {
        let claims = token::decode(access_token).ok()?;
        let raw = claims.claim_str(self.config.role_claim())?;
        match Role::from_str(raw) {
            Ok(role) => Some(role),
            Err(e) => {
                warn!(user_id, error = %e, "ignoring token role claim");
                None
            }
        }
    }
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}
