use std::sync::Arc;
use std::time::Duration;

use fieldcheck_authz::AuthzError;
use fieldcheck_core::{TeamId, UserId};
use fieldcheck_platform_access::testing::{FakeAccount, FakeIdentityProvider};
use fieldcheck_platform_access::{
    AuthEvent, AuthenticationError, Credentials, IdentityConfig, IdentityProvider, Plan,
    ProviderError, ProviderUser, Registration, Role, SessionPhase, SessionState,
};
use fieldcheck_scheduler::ActivityEvent;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::time::{Instant, sleep};

use crate::{INACTIVITY_MESSAGE, SessionManager};

const EMAIL: &str = "ana@example.com";
const PASSWORD: &str = "Secret1!";

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

fn provider() -> Arc<FakeIdentityProvider> {
    Arc::new(
        FakeIdentityProvider::new()
            .with_account(
                FakeAccount::new("u1", EMAIL, PASSWORD)
                    .claim("user_role", "manager")
                    .metadata("full_name", "Ana Souza")
                    .metadata("team_id", "team-a")
                    .metadata("plan", "professional"),
            )
            .with_account(
                FakeAccount::new("u2", "bo@example.com", PASSWORD).metadata("role", "admin"),
            ),
    )
}

fn manager(provider: &Arc<FakeIdentityProvider>) -> SessionManager {
    SessionManager::builder(provider.clone()).build()
}

fn quiet_manager(provider: &Arc<FakeIdentityProvider>) -> SessionManager {
    SessionManager::builder(provider.clone())
        .inactivity_timeout(Duration::from_secs(10 * 60 * 60))
        .build()
}

async fn login(sessions: &SessionManager) {
    sessions
        .login(&Credentials::new(EMAIL, PASSWORD))
        .await
        .expect("login");
}

async fn wait_until(
    rx: &mut watch::Receiver<SessionState>,
    done: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    rx.wait_for(done).await.expect("state channel open").clone()
}

/// Lets spawned tasks finish without moving far on the clock.
async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn login_publishes_mapped_user_and_arms_timers() {
    let provider = provider();
    let sessions = manager(&provider);

    let user = sessions
        .login(&Credentials::new(EMAIL, PASSWORD))
        .await
        .expect("login");

    assert_eq!(user.id(), &UserId::from("u1"));
    assert_eq!(user.role(), Role::Manager);
    assert_eq!(user.plan(), Plan::Professional);
    assert_eq!(user.display_name(), "Ana Souza");
    assert_eq!(user.team_id(), Some(&TeamId::from("team-a")));

    let state = sessions.state();
    assert_eq!(state.phase(), SessionPhase::Authenticated);
    assert!(!state.loading);
    assert_eq!(state.error, None);
    assert_eq!(sessions.activity().listener_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn role_falls_back_to_metadata_without_claim() {
    let provider = provider();
    let sessions = manager(&provider);

    let user = sessions
        .login(&Credentials::new("bo@example.com", PASSWORD))
        .await
        .expect("login");
    assert_eq!(user.role(), Role::Admin);
    assert_eq!(user.display_name(), "bo");
}

#[tokio::test(start_paused = true)]
async fn bad_credentials_leave_anonymous_state_with_message() {
    let provider = provider();
    let sessions = manager(&provider);

    let err = sessions
        .login(&Credentials::new(EMAIL, "nope"))
        .await
        .unwrap_err();

    assert_eq!(err, AuthenticationError::InvalidCredentials);
    let state = sessions.state();
    assert_eq!(state.phase(), SessionPhase::Anonymous);
    assert_eq!(state.error.as_deref(), Some("Invalid email or password"));
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn already_expired_token_is_refused_and_signed_out() {
    let provider = provider();
    provider.set_token_lifetime(chrono::Duration::minutes(-1));
    let sessions = manager(&provider);

    let err = sessions
        .login(&Credentials::new(EMAIL, PASSWORD))
        .await
        .unwrap_err();

    assert_eq!(err, AuthenticationError::SessionExpired);
    assert!(!sessions.state().is_authenticated());
    assert_eq!(provider.calls().sign_out, 1);
    assert!(provider.current_session().is_none());
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn second_login_replaces_the_first_session_timers() {
    let provider = provider();
    let sessions = manager(&provider);

    login(&sessions).await;
    login(&sessions).await;

    assert_eq!(sessions.activity().listener_count(), 1);
    assert!(sessions.state().is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn logout_cancels_timers_and_is_repeatable() {
    let provider = provider();
    let sessions = manager(&provider);
    login(&sessions).await;

    sessions.logout().await;
    assert_eq!(sessions.activity().listener_count(), 0);
    assert_eq!(sessions.state(), SessionState::anonymous(None));
    assert_eq!(provider.calls().sign_out, 1);

    sessions.logout().await;
    assert_eq!(provider.calls().sign_out, 2);
    assert_eq!(sessions.state(), SessionState::anonymous(None));

    sleep(Duration::from_secs(3 * 60 * 60)).await;
    assert_eq!(provider.calls().refresh, 0);
    assert_eq!(provider.calls().sign_out, 2);
    assert_eq!(sessions.state().error, None);
}

#[tokio::test(start_paused = true)]
async fn logout_survives_provider_failure() {
    let provider = provider();
    let sessions = manager(&provider);
    login(&sessions).await;
    provider.fail_sign_out(Some(ProviderError::Unavailable {
        reason: "offline".to_string(),
    }));

    sessions.logout().await;
    assert!(!sessions.state().is_authenticated());
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn idle_session_is_signed_out_after_thirty_minutes() {
    let provider = provider();
    let sessions = manager(&provider);
    login(&sessions).await;

    let started = Instant::now();
    let mut rx = sessions.subscribe_state();
    let state = wait_until(&mut rx, |s| !s.is_authenticated()).await;

    assert!(started.elapsed() >= minutes(30));
    assert!(started.elapsed() < minutes(31));
    assert_eq!(state.error.as_deref(), Some(INACTIVITY_MESSAGE));
    settle().await;
    assert_eq!(provider.calls().sign_out, 1);
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn activity_keeps_the_session_alive() {
    let provider = provider();
    let sessions = manager(&provider);
    login(&sessions).await;

    for _ in 0..4 {
        sleep(minutes(20)).await;
        sessions.record_activity(ActivityEvent::KeyPress);
    }
    settle().await;
    assert!(sessions.state().is_authenticated());

    sleep(minutes(31)).await;
    settle().await;
    assert!(!sessions.state().is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn refresh_timer_fires_five_minutes_before_expiry() {
    let provider = provider();
    let sessions = quiet_manager(&provider);
    login(&sessions).await;
    let first = sessions.state().access_token().map(str::to_string);

    let started = Instant::now();
    let mut rx = sessions.subscribe_state();
    let state = wait_until(&mut rx, |s| {
        !s.loading && s.access_token().map(str::to_string) != first
    })
    .await;

    assert!(started.elapsed() >= minutes(54));
    assert!(started.elapsed() <= minutes(55));
    assert!(state.is_authenticated());
    assert_eq!(provider.calls().refresh, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_scheduled_refresh_signs_out() {
    let provider = provider();
    let sessions = quiet_manager(&provider);
    login(&sessions).await;
    provider.fail_refresh(Some(ProviderError::Rejected {
        reason: "refresh token revoked".to_string(),
    }));

    let mut rx = sessions.subscribe_state();
    let state = wait_until(&mut rx, |s| s.user.is_none()).await;

    assert_eq!(
        state.error,
        Some(AuthenticationError::SessionExpired.user_message())
    );
    settle().await;
    assert_eq!(provider.calls().sign_out, 1);
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_reports_outcome() {
    let provider = provider();
    let sessions = quiet_manager(&provider);

    assert!(!sessions.refresh_session().await);
    assert_eq!(provider.calls().refresh, 0);

    login(&sessions).await;
    let before = sessions.state().access_token().map(str::to_string);
    assert!(sessions.refresh_session().await);
    let state = sessions.state();
    assert_ne!(state.access_token().map(str::to_string), before);
    assert!(!state.loading);

    provider.fail_refresh(Some(ProviderError::Unavailable {
        reason: "timeout".to_string(),
    }));
    assert!(!sessions.refresh_session().await);
    let state = sessions.state();
    assert!(state.is_authenticated());
    assert!(!state.loading);
}

fn registration(email: &str, password: &str) -> Registration {
    Registration {
        email: email.to_string(),
        password: password.to_string(),
        full_name: "Cy Doe".to_string(),
        role: Role::Inspector,
        plan: Plan::Enterprise,
        team_id: Some(TeamId::from("team-b")),
        client_id: None,
    }
}

#[tokio::test]
async fn weak_password_is_rejected_before_the_provider() {
    let provider = provider();
    let sessions = manager(&provider);

    let err = sessions
        .register(&registration("cy@example.com", "short"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthenticationError::WeakPassword { .. }));
    assert_eq!(provider.calls().sign_up, 0);
}

#[tokio::test]
async fn registration_returns_user_without_signing_in() {
    let provider = provider();
    let sessions = manager(&provider);

    let user = sessions
        .register(&registration("cy@example.com", "Str0ng!Pass"))
        .await
        .expect("register");

    assert_eq!(user.email(), "cy@example.com");
    assert_eq!(user.display_name(), "Cy Doe");
    assert_eq!(user.role(), Role::Inspector);
    assert_eq!(user.plan(), Plan::Enterprise);
    assert_eq!(user.team_id(), Some(&TeamId::from("team-b")));
    assert!(!sessions.state().is_authenticated());
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let provider = provider();
    let sessions = manager(&provider);

    let err = sessions
        .register(&registration(EMAIL, "Str0ng!Pass"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthenticationError::SignupRejected {
            reason: "User already registered".to_string()
        }
    );
}

#[tokio::test]
async fn reset_password_uses_configured_redirect() {
    let provider = provider();
    let sessions = SessionManager::builder(provider.clone())
        .identity(
            IdentityConfig::builder()
                .password_reset_redirect("https://app.example.com/reset")
                .build(),
        )
        .build();

    assert_eq!(sessions.reset_password("   ").await, Ok(false));
    assert_eq!(provider.calls().reset_password, 0);

    assert_eq!(sessions.reset_password(EMAIL).await, Ok(true));
    assert_eq!(
        provider.reset_requests(),
        vec![(
            EMAIL.to_string(),
            Some("https://app.example.com/reset".to_string())
        )]
    );

    provider.fail_reset(Some(ProviderError::Unavailable {
        reason: "smtp".to_string(),
    }));
    assert!(matches!(
        sessions.reset_password(EMAIL).await,
        Err(AuthenticationError::Provider { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn change_password_requires_a_session_and_a_strong_password() {
    let provider = provider();
    let sessions = manager(&provider);

    assert_eq!(
        sessions.change_password("N3w!Secret").await,
        Err(AuthenticationError::NotAuthenticated)
    );

    login(&sessions).await;
    assert!(matches!(
        sessions.change_password("weak").await,
        Err(AuthenticationError::WeakPassword { .. })
    ));
    assert_eq!(provider.calls().update_password, 0);

    sessions
        .change_password("N3w!Secret")
        .await
        .expect("change password");
    assert_eq!(provider.password_of(EMAIL).as_deref(), Some("N3w!Secret"));
}

#[tokio::test(start_paused = true)]
async fn restore_adopts_a_live_session() {
    let provider = provider();
    provider.seed_session(EMAIL).expect("seed");
    let sessions = manager(&provider);

    let user = sessions.restore().await.expect("restored");
    assert_eq!(user.id(), &UserId::from("u1"));
    assert!(sessions.state().is_authenticated());
    assert_eq!(provider.calls().refresh, 0);
    assert_eq!(sessions.activity().listener_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn restore_refreshes_an_expired_session() {
    let provider = provider();
    provider.set_token_lifetime(chrono::Duration::minutes(-5));
    provider.seed_session(EMAIL).expect("seed");
    provider.set_token_lifetime(chrono::Duration::hours(1));
    let sessions = manager(&provider);

    assert!(sessions.restore().await.is_some());
    assert_eq!(provider.calls().refresh, 1);
    assert!(sessions.state().is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn restore_signs_out_when_refresh_fails() {
    let provider = provider();
    provider.set_token_lifetime(chrono::Duration::minutes(-5));
    provider.seed_session(EMAIL).expect("seed");
    provider.fail_refresh(Some(ProviderError::NoSession));
    let sessions = manager(&provider);

    assert!(sessions.restore().await.is_none());
    assert_eq!(provider.calls().sign_out, 1);
    assert_eq!(sessions.state(), SessionState::anonymous(None));
}

#[tokio::test(start_paused = true)]
async fn restore_without_session_ends_loading() {
    let provider = provider();
    let sessions = manager(&provider);
    assert!(sessions.state().loading);

    assert!(sessions.restore().await.is_none());
    assert_eq!(sessions.state(), SessionState::anonymous(None));
}

#[tokio::test(start_paused = true)]
async fn authorization_context_follows_the_session() {
    let provider = provider();
    let sessions = manager(&provider);
    assert_eq!(
        sessions.authorization_context(),
        Err(AuthzError::NotAuthenticated)
    );

    login(&sessions).await;
    let context = sessions.authorization_context().expect("context");
    assert_eq!(context.user_id, UserId::from("u1"));
    assert_eq!(context.role, Role::Manager);
    assert_eq!(context.team_id, Some(TeamId::from("team-a")));
    assert_eq!(context.resource_id, None);
}

#[tokio::test(start_paused = true)]
async fn provider_sign_out_clears_local_session() {
    let provider = provider();
    let sessions = manager(&provider);
    login(&sessions).await;
    let _events = sessions.listen();

    let mut rx = sessions.subscribe_state();
    provider.emit(AuthEvent::SignedOut);
    let state = wait_until(&mut rx, |s| s.user.is_none()).await;

    assert_eq!(state.error, None);
    assert_eq!(sessions.activity().listener_count(), 0);
    assert_eq!(provider.calls().sign_out, 0);
}

#[tokio::test(start_paused = true)]
async fn provider_sign_in_is_adopted() {
    let provider = provider();
    let sessions = manager(&provider);
    let _events = sessions.listen();

    let session = provider.seed_session(EMAIL).expect("seed");
    let mut rx = sessions.subscribe_state();
    provider.emit(AuthEvent::SignedIn(session));
    let state = wait_until(&mut rx, SessionState::is_authenticated).await;

    assert_eq!(state.user.map(|u| u.role()), Some(Role::Manager));
    assert_eq!(sessions.activity().listener_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn provider_token_refresh_replaces_tokens() {
    let provider = provider();
    let sessions = quiet_manager(&provider);
    login(&sessions).await;
    let _events = sessions.listen();

    let refreshed = provider.refresh_session().await.expect("refresh");
    let mut rx = sessions.subscribe_state();
    provider.emit(AuthEvent::TokenRefreshed(refreshed.clone()));
    let state = wait_until(&mut rx, |s| {
        s.access_token() == Some(refreshed.access_token.as_str())
    })
    .await;

    assert!(state.is_authenticated());
    assert_eq!(sessions.activity().listener_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn provider_profile_update_keeps_token_role() {
    let provider = provider();
    let sessions = manager(&provider);
    login(&sessions).await;
    let _events = sessions.listen();

    let mut metadata = Map::new();
    metadata.insert("full_name".to_string(), Value::from("Ana Lima"));
    metadata.insert("team_id".to_string(), Value::from("team-a"));
    let account = ProviderUser {
        id: "u1".to_string(),
        email: Some(EMAIL.to_string()),
        created_at: None,
        user_metadata: metadata,
        app_metadata: Map::new(),
    };

    let mut rx = sessions.subscribe_state();
    provider.emit(AuthEvent::UserUpdated(account));
    let state = wait_until(&mut rx, |s| {
        s.user.as_ref().map(|u| u.display_name()) == Some("Ana Lima")
    })
    .await;

    assert_eq!(state.user.map(|u| u.role()), Some(Role::Manager));
}

#[tokio::test(start_paused = true)]
async fn confirmed_registration_is_not_adopted_by_the_listener() {
    let provider = provider();
    provider.set_auto_confirm(true);
    let sessions = manager(&provider);
    let _events = sessions.listen();

    let user = sessions
        .register(&registration("cy@example.com", "Str0ng!Pass"))
        .await
        .expect("register");
    settle().await;

    assert_eq!(user.email(), "cy@example.com");
    assert!(provider.current_session().is_some());
    assert!(!sessions.state().is_authenticated());
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn login_while_listening_arms_one_session() {
    let provider = provider();
    let sessions = manager(&provider);
    let _events = sessions.listen();

    login(&sessions).await;
    let token = sessions.state().access_token().map(str::to_string);
    settle().await;

    let state = sessions.state();
    assert!(state.is_authenticated());
    assert_eq!(state.access_token().map(str::to_string), token);
    assert_eq!(sessions.activity().listener_count(), 1);

    sessions.logout().await;
    settle().await;
    assert_eq!(sessions.state(), SessionState::anonymous(None));
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_login_while_listening_keeps_the_message() {
    let provider = provider();
    provider.set_token_lifetime(chrono::Duration::minutes(-1));
    let sessions = manager(&provider);
    let _events = sessions.listen();

    let err = sessions
        .login(&Credentials::new(EMAIL, PASSWORD))
        .await
        .unwrap_err();
    settle().await;

    let state = sessions.state();
    assert!(!state.is_authenticated());
    assert_eq!(state.error, Some(err.user_message()));
    assert_eq!(sessions.activity().listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_while_listening_keeps_one_session() {
    let provider = provider();
    let sessions = quiet_manager(&provider);
    let _events = sessions.listen();
    login(&sessions).await;

    assert!(sessions.refresh_session().await);
    let refreshed = provider.current_session().map(|s| s.access_token);
    settle().await;

    let state = sessions.state();
    assert!(state.is_authenticated());
    assert_eq!(state.access_token().map(str::to_string), refreshed);
    assert_eq!(sessions.activity().listener_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn suspended_session_is_restored_by_the_next_manager() {
    let provider = provider();
    let first = manager(&provider);
    login(&first).await;

    first.suspend().await;
    assert_eq!(first.state(), SessionState::anonymous(None));
    assert_eq!(first.activity().listener_count(), 0);
    assert_eq!(provider.calls().sign_out, 0);
    assert!(provider.current_session().is_some());

    let second = manager(&provider);
    let user = second.restore().await.expect("restored");
    assert_eq!(user.id(), &UserId::from("u1"));
    assert_eq!(provider.calls().sign_in, 1);
}
