//! In-memory identity provider for tests.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! downstream crates. Accounts, sessions and failures are scripted; every
//! contract call is counted. Auth events are emitted the way the hosted
//! provider emits them: sign-in, auto-confirmed sign-up, sign-out, refresh
//! and password change each announce themselves to subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;

use crate::error::ProviderError;
use crate::provider::{
    AuthEvent, Credentials, IdentityProvider, ProviderSession, ProviderUser, Registration,
    SignUpOutcome,
};

/// Builds an unsigned token carrying `claims`.
#[must_use]
pub fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

/// A scripted account.
#[derive(Debug, Clone)]
pub struct FakeAccount {
    id: String,
    email: String,
    password: String,
    user_metadata: Map<String, Value>,
    token_claims: Map<String, Value>,
}

impl FakeAccount {
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            password: password.into(),
            user_metadata: Map::new(),
            token_claims: Map::new(),
        }
    }

    /// Adds a user-metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.user_metadata.insert(key.to_string(), value.into());
        self
    }

    /// Adds a claim to every access token issued for this account.
    #[must_use]
    pub fn claim(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.token_claims.insert(key.to_string(), value.into());
        self
    }

    fn provider_user(&self) -> ProviderUser {
        ProviderUser {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            created_at: None,
            user_metadata: self.user_metadata.clone(),
            app_metadata: Map::new(),
        }
    }
}

/// Snapshot of how often each contract operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub sign_in: usize,
    pub sign_up: usize,
    pub sign_out: usize,
    pub get_session: usize,
    pub refresh: usize,
    pub reset_password: usize,
    pub update_password: usize,
}

#[derive(Debug)]
struct FakeState {
    accounts: HashMap<String, FakeAccount>,
    session: Option<(String, ProviderSession)>,
    token_lifetime: Duration,
    auto_confirm: bool,
    refresh_failure: Option<ProviderError>,
    sign_out_failure: Option<ProviderError>,
    reset_failure: Option<ProviderError>,
    calls: CallCounts,
    reset_requests: Vec<(String, Option<String>)>,
}

/// Identity provider backed by a map of scripted accounts.
#[derive(Debug)]
pub struct FakeIdentityProvider {
    state: Mutex<FakeState>,
    events: broadcast::Sender<AuthEvent>,
    issued: AtomicUsize,
}

impl Default for FakeIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(FakeState {
                accounts: HashMap::new(),
                session: None,
                token_lifetime: Duration::hours(1),
                auto_confirm: false,
                refresh_failure: None,
                sign_out_failure: None,
                reset_failure: None,
                calls: CallCounts::default(),
                reset_requests: Vec::new(),
            }),
            events,
            issued: AtomicUsize::new(0),
        }
    }

    /// Registers an account.
    #[must_use]
    pub fn with_account(self, account: FakeAccount) -> Self {
        self.state().accounts.insert(account.email.clone(), account);
        self
    }

    /// Lifetime of access tokens issued from now on. May be negative.
    pub fn set_token_lifetime(&self, lifetime: Duration) {
        self.state().token_lifetime = lifetime;
    }

    /// Whether sign-up returns a session immediately.
    pub fn set_auto_confirm(&self, auto_confirm: bool) {
        self.state().auto_confirm = auto_confirm;
    }

    /// Makes every refresh fail with `error` until cleared with `None`.
    pub fn fail_refresh(&self, error: Option<ProviderError>) {
        self.state().refresh_failure = error;
    }

    /// Makes every sign-out fail with `error` until cleared with `None`.
    pub fn fail_sign_out(&self, error: Option<ProviderError>) {
        self.state().sign_out_failure = error;
    }

    /// Makes every password-reset request fail with `error` until cleared with `None`.
    pub fn fail_reset(&self, error: Option<ProviderError>) {
        self.state().reset_failure = error;
    }

    /// Starts a provider session for `email` without counting a sign-in,
    /// as if one survived from a previous run.
    pub fn seed_session(&self, email: &str) -> Option<ProviderSession> {
        let mut state = self.state();
        let account = state.accounts.get(email)?.clone();
        let session = self.issue(&account, state.token_lifetime);
        state.session = Some((email.to_string(), session.clone()));
        Some(session)
    }

    /// The session the provider currently holds.
    #[must_use]
    pub fn current_session(&self) -> Option<ProviderSession> {
        self.state().session.as_ref().map(|(_, s)| s.clone())
    }

    /// Emits an auth event to every subscriber.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Email and redirect of every password-reset request, in order.
    #[must_use]
    pub fn reset_requests(&self) -> Vec<(String, Option<String>)> {
        self.state().reset_requests.clone()
    }

    /// Current password of an account.
    #[must_use]
    pub fn password_of(&self, email: &str) -> Option<String> {
        self.state().accounts.get(email).map(|a| a.password.clone())
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue(&self, account: &FakeAccount, lifetime: Duration) -> ProviderSession {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let expires_at = now + lifetime;

        let mut claims = account.token_claims.clone();
        claims.insert("sub".to_string(), json!(account.id));
        claims.insert("email".to_string(), json!(account.email));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert("exp".to_string(), json!(expires_at.timestamp()));
        claims.insert("jti".to_string(), json!(serial));

        ProviderSession {
            access_token: unsigned_token(&Value::Object(claims)),
            refresh_token: format!("refresh-{serial}"),
            expires_at: Some(expires_at),
            user: account.provider_user(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderSession, ProviderError> {
        let mut state = self.state();
        state.calls.sign_in += 1;

        let account = match state.accounts.get(&credentials.email) {
            Some(account) if account.password == credentials.password => account.clone(),
            _ => return Err(ProviderError::InvalidCredentials),
        };
        let session = self.issue(&account, state.token_lifetime);
        state.session = Some((account.email, session.clone()));
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, registration: &Registration) -> Result<SignUpOutcome, ProviderError> {
        let mut state = self.state();
        state.calls.sign_up += 1;

        if state.accounts.contains_key(&registration.email) {
            return Err(ProviderError::Rejected {
                reason: "User already registered".to_string(),
            });
        }

        let mut account = FakeAccount::new(
            format!("user-{}", state.accounts.len() + 1),
            registration.email.clone(),
            registration.password.clone(),
        );
        account.user_metadata = registration.metadata();
        state
            .accounts
            .insert(account.email.clone(), account.clone());

        let session = if state.auto_confirm {
            let session = self.issue(&account, state.token_lifetime);
            state.session = Some((account.email.clone(), session.clone()));
            self.emit(AuthEvent::SignedIn(session.clone()));
            Some(session)
        } else {
            None
        };

        Ok(SignUpOutcome {
            user: account.provider_user(),
            session,
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.calls.sign_out += 1;
        state.session = None;
        self.emit(AuthEvent::SignedOut);
        match state.sign_out_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn get_session(&self) -> Result<Option<ProviderSession>, ProviderError> {
        let mut state = self.state();
        state.calls.get_session += 1;
        Ok(state.session.as_ref().map(|(_, s)| s.clone()))
    }

    async fn refresh_session(&self) -> Result<ProviderSession, ProviderError> {
        let mut state = self.state();
        state.calls.refresh += 1;
        if let Some(error) = state.refresh_failure.clone() {
            return Err(error);
        }

        let email = match &state.session {
            Some((email, _)) => email.clone(),
            None => return Err(ProviderError::NoSession),
        };
        let account = state
            .accounts
            .get(&email)
            .cloned()
            .ok_or(ProviderError::NoSession)?;
        let session = self.issue(&account, state.token_lifetime);
        state.session = Some((email, session.clone()));
        self.emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.calls.reset_password += 1;
        if let Some(error) = state.reset_failure.clone() {
            return Err(error);
        }
        state
            .reset_requests
            .push((email.to_string(), redirect_to.map(str::to_string)));
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<ProviderUser, ProviderError> {
        let mut state = self.state();
        state.calls.update_password += 1;

        let email = match &state.session {
            Some((email, _)) => email.clone(),
            None => return Err(ProviderError::NoSession),
        };
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or(ProviderError::NoSession)?;
        account.password = new_password.to_string();
        let user = account.provider_user();
        self.emit(AuthEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token;

    fn provider() -> FakeIdentityProvider {
        FakeIdentityProvider::new()
            .with_account(FakeAccount::new("u1", "ana@example.com", "Secret1!").claim("user_role", "manager"))
    }

    #[tokio::test]
    async fn sign_in_checks_password() {
        let provider = provider();

        let err = provider
            .sign_in_with_password(&Credentials::new("ana@example.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::InvalidCredentials);

        let session = provider
            .sign_in_with_password(&Credentials::new("ana@example.com", "Secret1!"))
            .await
            .expect("sign in");
        let claims = token::decode(&session.access_token).expect("decode");
        assert_eq!(claims.claim_str("user_role"), Some("manager"));
        assert!(!session.is_expired());
        assert_eq!(provider.calls().sign_in, 2);
    }

    #[tokio::test]
    async fn refresh_issues_distinct_tokens() {
        let provider = provider();
        let first = provider.seed_session("ana@example.com").expect("seed");

        let second = provider.refresh_session().await.expect("refresh");
        assert_ne!(first.access_token, second.access_token);
        assert_eq!(provider.calls().refresh, 1);
        assert_eq!(provider.calls().sign_in, 0);
    }

    #[tokio::test]
    async fn refresh_without_session_fails() {
        let err = provider().refresh_session().await.unwrap_err();
        assert_eq!(err, ProviderError::NoSession);
    }

    #[tokio::test]
    async fn contract_calls_announce_themselves() {
        let provider = provider();
        let mut events = provider.subscribe();

        let session = provider
            .sign_in_with_password(&Credentials::new("ana@example.com", "Secret1!"))
            .await
            .expect("sign in");
        match events.recv().await {
            Ok(AuthEvent::SignedIn(announced)) => assert_eq!(announced.access_token, session.access_token),
            other => panic!("expected SignedIn, got {other:?}"),
        }

        provider.refresh_session().await.expect("refresh");
        assert!(matches!(events.recv().await, Ok(AuthEvent::TokenRefreshed(_))));

        provider.fail_sign_out(Some(ProviderError::Unavailable {
            reason: "offline".to_string(),
        }));
        assert!(provider.sign_out().await.is_err());
        assert!(matches!(events.recv().await, Ok(AuthEvent::SignedOut)));
        assert!(provider.current_session().is_none());
    }

    #[tokio::test]
    async fn emitted_events_reach_subscribers() {
        let provider = provider();
        let mut events = provider.subscribe();
        provider.emit(AuthEvent::SignedOut);
        assert!(matches!(events.recv().await, Ok(AuthEvent::SignedOut)));
    }
}
