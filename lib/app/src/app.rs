//! Wiring of provider, session manager, store and services.

use std::sync::Arc;

use fieldcheck_backend::{BackendError, FileSessionStore, RestIdentityProvider, RestStore};
use fieldcheck_data::{ServiceError, Services, Store};
use fieldcheck_platform_access::{IdentityConfig, IdentityProvider, User};
use fieldcheck_session::SessionManager;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::config::AppConfig;

/// The running application core.
///
/// Holds the one [`SessionManager`] and the data [`Services`]. Must be
/// created inside a tokio runtime: it starts the provider event listener.
pub struct App {
    sessions: SessionManager,
    services: Services,
    listener: JoinHandle<()>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("state", &self.sessions.state().phase())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Connects to the hosted backend described by `config`.
    ///
    /// With `backend.session_file` set, the provider starts from the session
    /// a previous run saved there, ready for [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// `BackendError::InvalidConfig` if the backend settings cannot be used.
    #[instrument(skip(config), fields(backend = %config.backend.url))]
    pub fn connect(config: &AppConfig) -> fieldcheck_core::Result<Self, BackendError> {
        let provider = Arc::new(match &config.backend.session_file {
            Some(path) => RestIdentityProvider::with_persistence(
                &config.backend,
                Arc::new(FileSessionStore::new(path)),
            )?,
            None => RestIdentityProvider::new(&config.backend)?,
        });
        let sessions = SessionManager::builder(provider)
            .identity(config.identity.clone())
            .build();
        let store = Arc::new(RestStore::new(&config.backend, sessions.subscribe_state())?);
        Ok(Self::with_sessions(sessions, store))
    }

    /// Assembles the core from an already-built provider and store.
    #[must_use]
    pub fn from_parts(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn Store>,
        identity: IdentityConfig,
    ) -> Self {
        let sessions = SessionManager::builder(provider).identity(identity).build();
        Self::with_sessions(sessions, store)
    }

    fn with_sessions(sessions: SessionManager, store: Arc<dyn Store>) -> Self {
        let listener = sessions.listen();
        Self {
            services: Services::new(store),
            sessions,
            listener,
        }
    }

    /// Restores a persisted session, if the provider still holds one.
    pub async fn start(&self) -> Option<User> {
        let user = self.sessions.restore().await;
        info!(restored = user.is_some(), "application core started");
        user
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// The signed-in user, for passing to the data services.
    ///
    /// # Errors
    ///
    /// `ServiceError::NotAuthenticated` when nobody is signed in.
    pub fn signed_in(&self) -> Result<User, ServiceError> {
        self.sessions
            .current_user()
            .ok_or(ServiceError::NotAuthenticated)
    }

    /// Stops timers and provider events. The provider stays signed in, so
    /// the next run can restore the session; sign out through
    /// [`SessionManager::logout`] to end it for good.
    pub async fn shutdown(self) {
        self.sessions.suspend().await;
        self.listener.abort();
        info!("application core stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldcheck_authz::{InspectionStatus, Permission};
    use fieldcheck_backend::BackendConfig;
    use fieldcheck_data::{MemoryStore, NewInspection, Table};
    use fieldcheck_platform_access::testing::{FakeAccount, FakeIdentityProvider, unsigned_token};
    use fieldcheck_platform_access::{Credentials, ProviderSession, SessionState};
    use std::time::{SystemTime, UNIX_EPOCH};
    use serde_json::json;

    const EMAIL: &str = "ana@example.com";
    const PASSWORD: &str = "Secret1!";

    /// Unix seconds one hour from now.
    fn an_hour_from_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600
    }

    fn provider() -> Arc<FakeIdentityProvider> {
        Arc::new(
            FakeIdentityProvider::new()
                .with_account(
                    FakeAccount::new("M1", EMAIL, PASSWORD)
                        .claim("user_role", "manager")
                        .metadata("team_id", "team-a"),
                )
                .with_account(FakeAccount::new("U1", "ivo@example.com", PASSWORD)),
        )
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new().with_row(
            Table::Inspections,
            json!({
                "id": "i1",
                "title": "Switchboard upgrade",
                "status": "in_progress",
                "inspector_id": "U1",
                "created_by": "M1",
                "team_id": "team-a",
                "created_at": "2020-01-01T00:00:00Z",
            }),
        ))
    }

    #[tokio::test]
    async fn data_access_requires_a_session() {
        let app = App::from_parts(provider(), store(), IdentityConfig::default());
        assert_eq!(app.start().await, None);
        assert_eq!(app.signed_in(), Err(ServiceError::NotAuthenticated));
    }

    #[tokio::test]
    async fn signed_in_manager_reaches_team_data() {
        let store = store();
        let app = App::from_parts(provider(), store.clone(), IdentityConfig::default());
        app.sessions()
            .login(&Credentials::new(EMAIL, PASSWORD))
            .await
            .expect("login");

        let user = app.signed_in().expect("signed in");
        let listed = app
            .services()
            .inspections()
            .list(&user, Some(InspectionStatus::InProgress))
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);

        let created = app
            .services()
            .inspections()
            .create(
                &user,
                NewInspection {
                    title: "Rooftop array".to_string(),
                    ..NewInspection::default()
                },
            )
            .await
            .expect("create");
        assert_eq!(created.status, InspectionStatus::Draft);
        assert_eq!(store.rows(Table::Inspections).len(), 2);

        app.shutdown().await;
    }

    #[tokio::test]
    async fn inspector_is_gated_by_role() {
        let app = App::from_parts(provider(), store(), IdentityConfig::default());
        app.sessions()
            .login(&Credentials::new("ivo@example.com", PASSWORD))
            .await
            .expect("login");

        let user = app.signed_in().expect("signed in");
        let err = app
            .services()
            .templates()
            .create(&user, fieldcheck_data::NewTemplate::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Unauthorized {
                permission: Permission::ManageTemplates,
                resource_type: None,
                resource_id: None,
            }
        );
    }

    #[tokio::test]
    async fn connect_builds_the_core_without_network() {
        let config = AppConfig {
            backend: BackendConfig::new("https://abc.example.co", "anon-key"),
            identity: IdentityConfig::default(),
            log_filter: "info".to_string(),
        };
        let app = App::connect(&config).expect("connect");
        assert_eq!(app.sessions().state(), SessionState::initializing());
    }

    #[tokio::test]
    async fn saved_session_is_restored_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let expires = an_hour_from_now();
        let saved = ProviderSession {
            access_token: unsigned_token(&json!({
                "sub": "M1",
                "exp": expires,
                "user_role": "manager",
            })),
            refresh_token: "r".to_string(),
            expires_at: None,
            user: serde_json::from_value(json!({
                "id": "M1",
                "email": EMAIL,
                "user_metadata": {"team_id": "team-a"},
            }))
            .unwrap(),
        };
        std::fs::write(&path, serde_json::to_vec(&saved).unwrap()).unwrap();

        let mut backend = BackendConfig::new("https://abc.example.co", "anon-key");
        backend.session_file = Some(path.clone());
        let config = AppConfig {
            backend,
            identity: IdentityConfig::default(),
            log_filter: "info".to_string(),
        };

        let app = App::connect(&config).expect("connect");
        let user = app.start().await.expect("restored");
        assert_eq!(user.id().as_str(), "M1");
        assert_eq!(app.signed_in().map(|u| u.id().clone()), Ok(user.id().clone()));

        app.shutdown().await;
        assert!(path.exists());

        let again = App::connect(&config).expect("connect");
        assert!(again.start().await.is_some());
    }

    #[tokio::test]
    async fn unusable_backend_url_fails_to_connect() {
        let config = AppConfig {
            backend: BackendConfig::new("abc.example.co", "anon-key"),
            identity: IdentityConfig::default(),
            log_filter: "info".to_string(),
        };
        assert!(App::connect(&config).is_err());
    }
}
