//! Identity provider over the hosted auth service.
//!
//! Speaks the `/auth/v1` REST dialect: password and refresh-token grants on
//! `/token`, `/signup`, `/logout`, `/recover` and `/user`. The provider keeps
//! the current session in memory, saves it through a [`SessionPersistence`]
//! when one is configured, and announces every change on its event channel,
//! the way the hosted client library does.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fieldcheck_platform_access::{
    AuthEvent, Credentials, IdentityProvider, ProviderError, ProviderSession, ProviderUser,
    Registration, SignUpOutcome,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::http::HttpClient;
use crate::persist::SessionPersistence;

const EVENT_CAPACITY: usize = 16;

/// Token-grant response body.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> ProviderSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        ProviderSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up answers with a session when accounts are confirmed automatically,
/// otherwise with the bare account.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    Account(ProviderUser),
}

pub struct RestIdentityProvider {
    client: HttpClient,
    session: Mutex<Option<ProviderSession>>,
    persistence: Option<Arc<dyn SessionPersistence>>,
    events: broadcast::Sender<AuthEvent>,
}

impl std::fmt::Debug for RestIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestIdentityProvider")
            .field("client", &self.client)
            .field("persistent", &self.persistence.is_some())
            .finish_non_exhaustive()
    }
}

impl RestIdentityProvider {
    /// # Errors
    ///
    /// `BackendError::InvalidConfig` if the settings cannot be used.
    pub fn new(config: &BackendConfig) -> fieldcheck_core::Result<Self, BackendError> {
        let client = HttpClient::new(config)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            client,
            session: Mutex::new(None),
            persistence: None,
            events,
        })
    }

    /// A provider that saves its session through `persistence` and starts
    /// from whatever an earlier run saved there.
    ///
    /// An unreadable saved session is logged and discarded.
    ///
    /// # Errors
    ///
    /// `BackendError::InvalidConfig` if the settings cannot be used.
    pub fn with_persistence(
        config: &BackendConfig,
        persistence: Arc<dyn SessionPersistence>,
    ) -> fieldcheck_core::Result<Self, BackendError> {
        let saved = persistence.load().unwrap_or_else(|e| {
            warn!(error = %e, "discarding saved session");
            None
        });
        let mut provider = Self::new(config)?;
        provider.session = Mutex::new(saved);
        provider.persistence = Some(persistence);
        Ok(provider)
    }

    fn held(&self) -> MutexGuard<'_, Option<ProviderSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn held_tokens(&self) -> Option<(String, String)> {
        self.held()
            .as_ref()
            .map(|s| (s.access_token.clone(), s.refresh_token.clone()))
    }

    fn store(&self, session: &ProviderSession) {
        *self.held() = Some(session.clone());
        self.persist(Some(session));
    }

    fn forget(&self) -> Option<ProviderSession> {
        let held = self.held().take();
        self.persist(None);
        held
    }

    fn persist(&self, session: Option<&ProviderSession>) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = persistence.save(session) {
            warn!(error = %e, "could not save session");
        }
    }

    fn emit(&self, event: AuthEvent) {
        debug!(event = event.name(), "emitting auth event");
        let _ = self.events.send(event);
    }

    async fn grant(&self, grant_type: &str, body: serde_json::Value) -> Result<ProviderSession, BackendError> {
        let endpoint = "/auth/v1/token";
        let request = self
            .client
            .request(Method::POST, endpoint, None)
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let response: TokenResponse = self.client.json(endpoint, request).await?;
        Ok(response.into_session(Utc::now()))
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderSession, ProviderError> {
        let body = json!({"email": credentials.email, "password": credentials.password});
        let session = self.grant("password", body).await.map_err(|e| {
            if e.is_client_error() {
                ProviderError::InvalidCredentials
            } else {
                ProviderError::from(e)
            }
        })?;
        self.store(&session);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    #[instrument(skip(self, registration), fields(email = %registration.email))]
    async fn sign_up(&self, registration: &Registration) -> Result<SignUpOutcome, ProviderError> {
        let endpoint = "/auth/v1/signup";
        let request = self.client.request(Method::POST, endpoint, None).json(&json!({
            "email": registration.email,
            "password": registration.password,
            "data": registration.metadata(),
        }));
        let response: SignUpResponse = self.client.json(endpoint, request).await?;

        match response {
            SignUpResponse::Session(tokens) => {
                let session = tokens.into_session(Utc::now());
                self.store(&session);
                self.emit(AuthEvent::SignedIn(session.clone()));
                Ok(SignUpOutcome {
                    user: session.user.clone(),
                    session: Some(session),
                })
            }
            SignUpResponse::Account(user) => {
                info!(account_id = %user.id, "account awaits email confirmation");
                Ok(SignUpOutcome { user, session: None })
            }
        }
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(session) = self.forget() else {
            self.emit(AuthEvent::SignedOut);
            return Ok(());
        };

        let endpoint = "/auth/v1/logout";
        let request = self
            .client
            .request(Method::POST, endpoint, Some(&session.access_token));
        let result = self.client.send(endpoint, request).await;
        self.emit(AuthEvent::SignedOut);
        result.map(|_| ()).map_err(ProviderError::from)
    }

    async fn get_session(&self) -> Result<Option<ProviderSession>, ProviderError> {
        Ok(self.held().clone())
    }

    #[instrument(skip(self))]
    async fn refresh_session(&self) -> Result<ProviderSession, ProviderError> {
        let Some((_, refresh_token)) = self.held_tokens() else {
            return Err(ProviderError::NoSession);
        };
        let session = self
            .grant("refresh_token", json!({"refresh_token": refresh_token}))
            .await
            .map_err(|e| {
                if e.is_client_error() {
                    ProviderError::NoSession
                } else {
                    ProviderError::from(e)
                }
            })?;
        self.store(&session);
        self.emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    #[instrument(skip(self, email))]
    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), ProviderError> {
        let endpoint = "/auth/v1/recover";
        let mut request = self
            .client
            .request(Method::POST, endpoint, None)
            .json(&json!({"email": email}));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        self.client.send(endpoint, request).await?;
        Ok(())
    }

    #[instrument(skip(self, new_password))]
    async fn update_password(&self, new_password: &str) -> Result<ProviderUser, ProviderError> {
        let Some((access_token, _)) = self.held_tokens() else {
            return Err(ProviderError::NoSession);
        };
        let endpoint = "/auth/v1/user";
        let request = self
            .client
            .request(Method::PUT, endpoint, Some(&access_token))
            .json(&json!({"password": new_password}));
        let user: ProviderUser = self.client.json(endpoint, request).await?;

        let updated = self.held().as_mut().map(|session| {
            session.user = user.clone();
            session.clone()
        });
        if let Some(session) = updated {
            self.persist(Some(&session));
        }
        self.emit(AuthEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
