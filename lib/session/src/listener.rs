//! Reconciliation of provider auth events.
//!
//! The provider can change the session behind the manager's back: another
//! tab signs out, a background refresh lands, the profile is edited. The
//! listener folds those events into the published state.

use std::sync::Arc;

use fieldcheck_platform_access::{AuthEvent, ProviderSession, ProviderUser, SessionState};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::manager::{Inner, SessionManager};

impl SessionManager {
    /// Starts following the provider's auth events.
    ///
    /// The subscription is taken before this returns, so no event emitted
    /// afterwards is missed. The task ends when the provider closes the
    /// channel or every clone of the manager is dropped.
    #[must_use = "dropping the handle detaches the listener; keep it to abort on shutdown"]
    pub fn listen(&self) -> JoinHandle<()> {
        let mut events = self.inner.provider.subscribe();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth event listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                debug!(event = event.name(), "auth event");
                inner.reconcile(event).await;
            }
            debug!("auth event listener stopped");
        })
    }
}

impl Inner {
    async fn reconcile(self: &Arc<Self>, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) => self.on_signed_in(&session).await,
            AuthEvent::TokenRefreshed(session) => self.on_token_refreshed(&session).await,
            AuthEvent::SignedOut => {
                // Echo of our own sign-out: keep whatever message is published.
                if self.active_id().await.is_some() && self.clear_local(None).await {
                    info!("provider signed out; local session cleared");
                }
            }
            AuthEvent::UserUpdated(account) => self.on_user_updated(&account).await,
        }
    }

    async fn on_signed_in(self: &Arc<Self>, session: &ProviderSession) {
        // Login adopts its own session; registration never signs in.
        if self.started_here(session) {
            debug!("sign-in started by this manager; not adopting");
            return;
        }
        if self.active_id().await.is_some() {
            return;
        }
        match self.adopt(session).await {
            Ok(user) => info!(user_id = %user.id(), "adopted provider session"),
            Err(e) => warn!(error = %e, "ignoring unusable provider session"),
        }
    }

    async fn on_token_refreshed(self: &Arc<Self>, session: &ProviderSession) {
        let Some(id) = self.active_id().await else {
            return;
        };
        let current = self.state.borrow().user.clone();
        let Some(mut user) = current else { return };
        if user.access_token() == Some(session.access_token.as_str()) {
            return;
        }

        let fresh = match self.mapper.map(&session.user, Some(session)) {
            Ok(fresh) if fresh.same_identity(&user) => fresh,
            Ok(_) => {
                warn!("refreshed tokens belong to another account; ignoring");
                return;
            }
            Err(e) => {
                warn!(error = %e, "ignoring unusable refreshed session");
                return;
            }
        };
        let (Some(tokens), Some(expires_at)) = (fresh.tokens().cloned(), fresh.token_expires_at())
        else {
            return;
        };

        {
            let active = self.active.lock().await;
            if active.as_ref().map(|s| s.id) != Some(id) {
                return;
            }
            user.update_profile(&fresh);
            user.refresh_tokens(tokens);
            self.state.send_replace(SessionState::authenticated(user));
        }
        self.rearm_refresh(id, expires_at).await;
        debug!(%expires_at, "adopted provider token refresh");
    }

    async fn on_user_updated(&self, account: &ProviderUser) {
        let tokens = self.state.borrow().user.as_ref().and_then(|u| u.tokens().cloned());
        let Some(tokens) = tokens else { return };
        // Map against the current token so a claim-derived role survives.
        let session = ProviderSession {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: Some(tokens.expires_at),
            user: account.clone(),
        };
        let fresh = match self.mapper.map(account, Some(&session)) {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, "ignoring unusable profile update");
                return;
            }
        };

        let active = self.active.lock().await;
        if active.is_none() {
            return;
        }
        let changed = self.state.send_if_modified(|state| match state.user.as_mut() {
            Some(user) if user.same_identity(&fresh) => {
                user.update_profile(&fresh);
                true
            }
            _ => false,
        });
        if changed {
            debug!("profile update applied");
        }
    }
}
