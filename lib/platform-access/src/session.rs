//! Published session state.
//!
//! One `SessionState` value describes the whole application's view of
//! authentication. The session manager is its only writer; UI code and HTTP
//! adapters read it.

use serde::{Deserialize, Serialize};

use crate::user::User;

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nobody is signed in.
    Anonymous,
    /// A login or startup restore is in flight.
    Authenticating,
    /// A user is signed in.
    Authenticated,
    /// A user is signed in and their tokens are being refreshed.
    Refreshing,
}

/// The authoritative session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// The signed-in user, if any.
    pub user: Option<User>,
    /// True while a transition is in flight.
    pub loading: bool,
    /// User-facing message from the last failed transition.
    pub error: Option<String>,
}

impl SessionState {
    /// Initial state before the startup restore runs.
    #[must_use]
    pub fn initializing() -> Self {
        Self {
            user: None,
            loading: true,
            error: None,
        }
    }

    /// Nobody signed in, optionally carrying a message for the UI.
    #[must_use]
    pub fn anonymous(error: Option<String>) -> Self {
        Self {
            user: None,
            loading: false,
            error,
        }
    }

    /// A signed-in user with no transition in flight.
    #[must_use]
    pub fn authenticated(user: User) -> Self {
        Self {
            user: Some(user),
            loading: false,
            error: None,
        }
    }

    /// Derives the lifecycle phase from `user` and `loading`.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match (&self.user, self.loading) {
            (None, false) => SessionPhase::Anonymous,
            (None, true) => SessionPhase::Authenticating,
            (Some(_), false) => SessionPhase::Authenticated,
            (Some(_), true) => SessionPhase::Refreshing,
        }
    }

    /// True when a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The signed-in user's access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.user.as_ref().and_then(User::access_token)
    }
}
