//! The session manager.
//!
//! `SessionManager` is the only writer of [`SessionState`]. It owns the timers
//! of the active session, keyed by a locally generated [`SessionId`], so a
//! timer that outlives its session finds a different id and does nothing.

use std::collections::VecDeque;
use std::sync::{Arc, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fieldcheck_authz::{AuthorizationContext, AuthzError};
use fieldcheck_core::SessionId;
use fieldcheck_platform_access::{
    AuthenticationError, Credentials, IdentityConfig, IdentityProvider, ProviderError,
    ProviderSession, Registration, SessionState, User, UserMapper, validate_password_strength,
};
use fieldcheck_scheduler::{
    ActivityEvent, ActivityFeed, DEFAULT_INACTIVITY_TIMEOUT, TimerHandle,
    schedule_inactivity_timeout, schedule_refresh,
};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

/// Shown after the inactivity timer signs the user out.
pub const INACTIVITY_MESSAGE: &str = "You were signed out after a period of inactivity.";

/// How many self-started provider sessions are remembered for echo detection.
const RECENT_SIGN_INS: usize = 8;

/// Timers belonging to the signed-in session.
pub(crate) struct ActiveSession {
    pub(crate) id: SessionId,
    pub(crate) refresh: Option<TimerHandle>,
    pub(crate) inactivity: TimerHandle,
}

impl ActiveSession {
    fn cancel(&self) {
        if let Some(refresh) = &self.refresh {
            refresh.cancel();
        }
        self.inactivity.cancel();
    }
}

/// Provider sign-ins started by this manager: calls still in flight, and
/// the access tokens they produced.
#[derive(Default)]
pub(crate) struct OwnSignIns {
    in_flight: usize,
    recent: VecDeque<String>,
}

/// Marks one provider sign-in call as ours for as long as it is held.
struct SignInGuard<'a> {
    inner: &'a Inner,
}

impl SignInGuard<'_> {
    fn record(&self, session: &ProviderSession) {
        let mut own = self.inner.own_sign_ins();
        if own.recent.len() == RECENT_SIGN_INS {
            own.recent.pop_front();
        }
        own.recent.push_back(session.access_token.clone());
    }
}

impl Drop for SignInGuard<'_> {
    fn drop(&mut self) {
        let mut own = self.inner.own_sign_ins();
        own.in_flight = own.in_flight.saturating_sub(1);
    }
}

pub(crate) struct Inner {
    pub(crate) provider: Arc<dyn IdentityProvider>,
    pub(crate) mapper: UserMapper,
    password_reset_redirect: Option<String>,
    activity: ActivityFeed,
    inactivity_timeout: Duration,
    pub(crate) state: watch::Sender<SessionState>,
    pub(crate) active: Mutex<Option<ActiveSession>>,
    own_sign_ins: std::sync::Mutex<OwnSignIns>,
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    provider: Arc<dyn IdentityProvider>,
    identity: IdentityConfig,
    inactivity_timeout: Duration,
    activity: ActivityFeed,
}

impl SessionManagerBuilder {
    #[must_use]
    pub fn identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Uses an existing activity feed instead of a fresh one.
    #[must_use]
    pub fn activity_feed(mut self, activity: ActivityFeed) -> Self {
        self.activity = activity;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionManager {
        let (state, _) = watch::channel(SessionState::initializing());
        SessionManager {
            inner: Arc::new(Inner {
                provider: self.provider,
                password_reset_redirect: self.identity.password_reset_redirect().map(str::to_string),
                mapper: UserMapper::new(self.identity),
                activity: self.activity,
                inactivity_timeout: self.inactivity_timeout,
                state,
                active: Mutex::new(None),
                own_sign_ins: std::sync::Mutex::new(OwnSignIns::default()),
            }),
        }
    }
}

/// Owns the authenticated-user lifecycle.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn builder(provider: Arc<dyn IdentityProvider>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            provider,
            identity: IdentityConfig::default(),
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            activity: ActivityFeed::new(),
        }
    }

    /// Current session snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every published state.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    /// Authorization context for the signed-in user.
    ///
    /// # Errors
    ///
    /// `AuthzError::NotAuthenticated` when nobody is signed in.
    pub fn authorization_context(&self) -> Result<AuthorizationContext, AuthzError> {
        self.inner
            .state
            .borrow()
            .user
            .as_ref()
            .map(AuthorizationContext::for_user)
            .ok_or(AuthzError::NotAuthenticated)
    }

    /// The feed the UI publishes interaction events to.
    #[must_use]
    pub fn activity(&self) -> &ActivityFeed {
        &self.inner.activity
    }

    /// Records a user interaction, resetting the inactivity timer.
    pub fn record_activity(&self, event: ActivityEvent) {
        self.inner.activity.record(event);
    }

    /// Signs in with email and password.
    ///
    /// Any session already active is ended locally first.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` if the provider rejects the pair, `SessionExpired`
    /// if the issued token is already expired, `MappingFailure` if the account
    /// cannot be turned into a user. The published state is anonymous with a
    /// user-facing message in every failure case.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<User, AuthenticationError> {
        self.inner.clear_local(None).await;
        self.inner.publish_loading();

        let own = self.inner.begin_sign_in();
        let session = match self.inner.provider.sign_in_with_password(credentials).await {
            Ok(session) => session,
            Err(e) => return Err(self.inner.fail_login(AuthenticationError::from(e))),
        };
        own.record(&session);
        drop(own);

        match self.inner.adopt(&session).await {
            Ok(user) => {
                info!(user_id = %user.id(), role = %user.role(), "signed in");
                Ok(user)
            }
            Err(e) => {
                self.inner.sign_out_provider().await;
                Err(self.inner.fail_login(e))
            }
        }
    }

    /// Signs out. Never fails; calling it while signed out is harmless.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let ended = self.inner.clear_local(None).await;
        self.inner.sign_out_provider().await;
        info!(ended, "signed out");
    }

    /// Ends the session locally but leaves the provider signed in, so a later
    /// [`restore`](Self::restore) can pick it up again.
    #[instrument(skip(self))]
    pub async fn suspend(&self) {
        let ended = self.inner.clear_local(None).await;
        info!(ended, "session suspended");
    }

    /// Creates an account. The new user is returned but not signed in;
    /// no timers are armed until they log in, even when the provider
    /// confirms the account and announces a session straight away.
    ///
    /// # Errors
    ///
    /// `WeakPassword` before contacting the provider if the password fails the
    /// policy, `SignupRejected` if the provider refuses the account.
    #[instrument(skip(self, registration), fields(email = %registration.email, role = %registration.role))]
    pub async fn register(&self, registration: &Registration) -> Result<User, AuthenticationError> {
        let check = validate_password_strength(&registration.password);
        if !check.is_valid() {
            return Err(AuthenticationError::WeakPassword {
                violations: check.violations().to_vec(),
            });
        }

        let own = self.inner.begin_sign_in();
        let outcome = self
            .inner
            .provider
            .sign_up(registration)
            .await
            .map_err(|e| match e {
                ProviderError::Rejected { reason } => AuthenticationError::SignupRejected { reason },
                other => AuthenticationError::from(other),
            })?;
        if let Some(session) = &outcome.session {
            own.record(session);
        }
        drop(own);

        let user = self
            .inner
            .mapper
            .map(&outcome.user, outcome.session.as_ref())?;
        info!(user_id = %user.id(), confirmed = outcome.session.is_some(), "account registered");
        Ok(user)
    }

    /// Asks the provider to email a password-reset link.
    ///
    /// Returns `false` without contacting the provider for a blank email.
    ///
    /// # Errors
    ///
    /// `Provider` if the request fails.
    #[instrument(skip(self, email))]
    pub async fn reset_password(&self, email: &str) -> Result<bool, AuthenticationError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(false);
        }
        self.inner
            .provider
            .reset_password_for_email(email, self.inner.password_reset_redirect.as_deref())
            .await
            .map_err(|e| AuthenticationError::Provider {
                reason: e.to_string(),
            })?;
        info!("password reset requested");
        Ok(true)
    }

    /// Changes the signed-in user's password.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when signed out, `WeakPassword` if the new password
    /// fails the policy, `Provider` if the provider refuses.
    #[instrument(skip(self, new_password))]
    pub async fn change_password(&self, new_password: &str) -> Result<(), AuthenticationError> {
        if self.inner.active.lock().await.is_none() {
            return Err(AuthenticationError::NotAuthenticated);
        }
        let check = validate_password_strength(new_password);
        if !check.is_valid() {
            return Err(AuthenticationError::WeakPassword {
                violations: check.violations().to_vec(),
            });
        }
        self.inner.provider.update_password(new_password).await?;
        info!("password changed");
        Ok(())
    }

    /// Forces a token refresh and re-arms the refresh timer.
    ///
    /// Returns `false` on any failure; the user stays signed in so the caller
    /// can decide what to do.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self) -> bool {
        let Some(id) = self.inner.active_id().await else {
            debug!("refresh requested without a session");
            return false;
        };

        match self.inner.apply_refresh(id).await {
            Ok(Some(expires_at)) => {
                self.inner.rearm_refresh(id, expires_at).await;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "manual refresh failed");
                false
            }
        }
    }

    /// Restores a session the provider kept from a previous run.
    ///
    /// An expired session gets one refresh attempt; if that fails the
    /// provider is signed out. Returns the restored user, if any.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Option<User> {
        self.inner.publish_loading();

        let session = match self.inner.provider.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("no session to restore");
                self.inner.state.send_replace(SessionState::anonymous(None));
                return None;
            }
            Err(e) => {
                warn!(error = %e, "could not query provider session");
                self.inner.state.send_replace(SessionState::anonymous(None));
                return None;
            }
        };

        let session = if session.is_expired() {
            info!("stored session expired; refreshing");
            match self.inner.provider.refresh_session().await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    warn!(error = %e, "refresh of stored session failed");
                    self.inner.sign_out_provider().await;
                    self.inner.state.send_replace(SessionState::anonymous(None));
                    return None;
                }
            }
        } else {
            session
        };

        match self.inner.adopt(&session).await {
            Ok(user) => {
                info!(user_id = %user.id(), "session restored");
                Some(user)
            }
            Err(e) => {
                warn!(error = %e, "stored session unusable");
                self.inner.sign_out_provider().await;
                self.inner.state.send_replace(SessionState::anonymous(None));
                None
            }
        }
    }
}

impl Inner {
    fn fail_login(&self, error: AuthenticationError) -> AuthenticationError {
        warn!(error = %error, "sign-in failed");
        self.state
            .send_replace(SessionState::anonymous(Some(error.user_message())));
        error
    }

    fn publish_loading(&self) {
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
    }

    fn own_sign_ins(&self) -> MutexGuard<'_, OwnSignIns> {
        self.own_sign_ins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_sign_in(&self) -> SignInGuard<'_> {
        self.own_sign_ins().in_flight += 1;
        SignInGuard { inner: self }
    }

    /// True if `session` came from one of this manager's own sign-in calls.
    pub(crate) fn started_here(&self, session: &ProviderSession) -> bool {
        let own = self.own_sign_ins();
        own.in_flight > 0 || own.recent.iter().any(|t| *t == session.access_token)
    }

    pub(crate) async fn active_id(&self) -> Option<SessionId> {
        self.active.lock().await.as_ref().map(|s| s.id)
    }

    /// Validates, maps and activates a provider session.
    pub(crate) async fn adopt(
        self: &Arc<Self>,
        session: &ProviderSession,
    ) -> Result<User, AuthenticationError> {
        if session.is_expired() {
            return Err(AuthenticationError::SessionExpired);
        }
        let user = self.mapper.map(&session.user, Some(session))?;
        let expires_at = user
            .token_expires_at()
            .ok_or(AuthenticationError::SessionExpired)?;

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.cancel();
        }
        let id = SessionId::new();
        *active = Some(ActiveSession {
            id,
            refresh: Some(self.arm_refresh(id, expires_at)),
            inactivity: self.arm_inactivity(id),
        });
        self.state
            .send_replace(SessionState::authenticated(user.clone()));
        debug!(session_id = %id, %expires_at, "session activated");
        Ok(user)
    }

    /// Cancels timers and publishes the anonymous state. Returns true if a
    /// session was active.
    pub(crate) async fn clear_local(&self, error: Option<String>) -> bool {
        let mut active = self.active.lock().await;
        let ended = match active.take() {
            Some(session) => {
                session.cancel();
                true
            }
            None => false,
        };
        self.state.send_replace(SessionState::anonymous(error));
        ended
    }

    pub(crate) async fn sign_out_provider(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "provider sign-out failed; local session cleared anyway");
        }
    }

    /// Ends session `id` if it is still the active one.
    async fn end_session(self: Arc<Self>, id: SessionId, message: String) {
        {
            let mut active = self.active.lock().await;
            if active.as_ref().map(|s| s.id) != Some(id) {
                return;
            }
            if let Some(session) = active.take() {
                session.cancel();
            }
            self.state
                .send_replace(SessionState::anonymous(Some(message)));
        }
        self.sign_out_provider().await;
        info!(session_id = %id, "session ended");
    }

    /// Refreshes tokens for session `id` and republishes the user.
    ///
    /// `Ok(None)` if `id` stopped being the active session meanwhile.
    async fn apply_refresh(
        &self,
        id: SessionId,
    ) -> Result<Option<DateTime<Utc>>, AuthenticationError> {
        self.state.send_modify(|state| {
            if state.user.is_some() {
                state.loading = true;
            }
        });

        let fetched = match self.provider.refresh_session().await {
            Ok(session) if session.is_expired() => Err(AuthenticationError::SessionExpired),
            Ok(session) => self.mapper.map(&session.user, Some(&session)),
            Err(e) => Err(AuthenticationError::from(e)),
        };

        let active = self.active.lock().await;
        if active.as_ref().map(|s| s.id) != Some(id) {
            debug!(session_id = %id, "discarding refresh for ended session");
            return Ok(None);
        }

        let fresh = match fetched {
            Ok(fresh) => fresh,
            Err(e) => {
                self.state.send_modify(|state| state.loading = false);
                return Err(e);
            }
        };

        let current = self.state.borrow().user.clone();
        let (Some(mut user), Some(tokens), Some(expires_at)) =
            (current, fresh.tokens().cloned(), fresh.token_expires_at())
        else {
            self.state.send_modify(|state| state.loading = false);
            return Err(AuthenticationError::SessionExpired);
        };
        if !user.same_identity(&fresh) {
            self.state.send_modify(|state| state.loading = false);
            return Err(AuthenticationError::MappingFailure {
                reason: "refreshed session belongs to another account".to_string(),
            });
        }

        user.update_profile(&fresh);
        user.refresh_tokens(tokens);
        self.state.send_replace(SessionState::authenticated(user));
        drop(active);

        info!(session_id = %id, %expires_at, "tokens refreshed");
        Ok(Some(expires_at))
    }

    /// Replaces the refresh timer of session `id`.
    pub(crate) async fn rearm_refresh(self: &Arc<Self>, id: SessionId, expires_at: DateTime<Utc>) {
        let mut active = self.active.lock().await;
        if let Some(session) = active.as_mut().filter(|s| s.id == id) {
            if let Some(old) = session.refresh.take() {
                old.cancel();
            }
            session.refresh = Some(self.arm_refresh(id, expires_at));
        }
    }

    fn arm_refresh(self: &Arc<Self>, id: SessionId, expires_at: DateTime<Utc>) -> TimerHandle {
        let weak = Arc::downgrade(self);
        schedule_refresh(expires_at, move || refresh_fired(weak.clone(), id))
    }

    fn arm_inactivity(self: &Arc<Self>, id: SessionId) -> TimerHandle {
        let weak = Arc::downgrade(self);
        schedule_inactivity_timeout(&self.activity, self.inactivity_timeout, move || async move {
            if let Some(inner) = weak.upgrade() {
                tokio::spawn(inner.end_session(id, INACTIVITY_MESSAGE.to_string()));
            }
        })
    }
}

async fn refresh_fired(weak: Weak<Inner>, id: SessionId) -> Option<DateTime<Utc>> {
    let inner = weak.upgrade()?;
    match inner.apply_refresh(id).await {
        Ok(expires_at) => expires_at,
        Err(e) => {
            warn!(session_id = %id, error = %e, "scheduled refresh failed; signing out");
            let message = AuthenticationError::SessionExpired.user_message();
            tokio::spawn(inner.end_session(id, message));
            None
        }
    }
}
