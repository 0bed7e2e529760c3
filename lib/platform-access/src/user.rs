//! User domain type.
//!
//! A `User` is a plain data record for an authenticated principal. It is
//! created from identity-provider claims on login, updated in place when the
//! tokens are refreshed, and dropped on logout. Timer handles live in the
//! session manager, never here.

use chrono::{DateTime, Utc};
use fieldcheck_core::{ClientId, TeamId, UserId};
use serde::{Deserialize, Serialize};

use crate::role::{Plan, Role};

/// Access and refresh tokens issued for a user, with their expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Bearer token sent to the hosted backend.
    pub access_token: String,
    /// Token used to obtain a new access token.
    pub refresh_token: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    email: String,
    display_name: String,
    role: Role,
    plan: Plan,
    team_id: Option<TeamId>,
    client_id: Option<ClientId>,
    created_at: DateTime<Utc>,
    /// Absent for users mapped from a sign-up that still awaits confirmation.
    tokens: Option<SessionTokens>,
}

impl User {
    /// Creates a user with the lowest-privilege role on the starter plan.
    #[must_use]
    pub fn new(id: UserId, email: String, display_name: String) -> Self {
        Self {
            id,
            email,
            display_name,
            role: Role::LOWEST,
            plan: Plan::default(),
            team_id: None,
            client_id: None,
            created_at: Utc::now(),
            tokens: None,
        }
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the plan.
    #[must_use]
    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = plan;
        self
    }

    /// Sets the team.
    #[must_use]
    pub fn with_team(mut self, team_id: Option<TeamId>) -> Self {
        self.team_id = team_id;
        self
    }

    /// Sets the client organisation.
    #[must_use]
    pub fn with_client(mut self, client_id: Option<ClientId>) -> Self {
        self.client_id = client_id;
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Attaches session tokens.
    #[must_use]
    pub fn with_tokens(mut self, tokens: Option<SessionTokens>) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn id(&self) -> &UserId {
        &self.id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn plan(&self) -> Plan {
        self.plan
    }

    #[must_use]
    pub fn team_id(&self) -> Option<&TeamId> {
        self.team_id.as_ref()
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the session tokens, if the user is signed in.
    #[must_use]
    pub fn tokens(&self) -> Option<&SessionTokens> {
        self.tokens.as_ref()
    }

    /// Returns the access token, if the user is signed in.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    /// Returns when the access token expires, if the user is signed in.
    #[must_use]
    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.tokens.as_ref().map(|t| t.expires_at)
    }

    /// Returns true if this user and `other` are the same principal.
    #[must_use]
    pub fn same_identity(&self, other: &User) -> bool {
        self.id == other.id
    }

    /// Replaces the tokens after a refresh. Identity fields are untouched.
    pub fn refresh_tokens(&mut self, tokens: SessionTokens) {
        self.tokens = Some(tokens);
    }

    /// Copies profile fields (name, role, plan, scoping) from a freshly
    /// mapped record of the same principal, keeping this user's tokens.
    pub fn update_profile(&mut self, fresh: &User) {
        self.email.clone_from(&fresh.email);
        self.display_name.clone_from(&fresh.display_name);
        self.role = fresh.role;
        self.plan = fresh.plan;
        self.team_id.clone_from(&fresh.team_id);
        self.client_id.clone_from(&fresh.client_id);
    }
}
