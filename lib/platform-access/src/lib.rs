//! Platform access for fieldcheck.
//!
//! This crate provides:
//! - The `User` record and its `Role` and `Plan`
//! - The published `SessionState`
//! - Bearer-token decoding and expiry checks (`token`)
//! - The password strength policy
//! - The `IdentityProvider` contract and the claims-to-user mapping
//!
//! # Example
//!
//! ```
//! use fieldcheck_platform_access::{Role, SessionPhase, SessionState, User};
//! use fieldcheck_core::UserId;
//!
//! let user = User::new(
//!     UserId::from("user-1"),
//!     "ana@example.com".to_string(),
//!     "Ana".to_string(),
//! )
//! .with_role(Role::Manager);
//!
//! let state = SessionState::authenticated(user);
//! assert_eq!(state.phase(), SessionPhase::Authenticated);
//! assert!(Role::Manager.has_role_or_higher(Role::Inspector));
//! ```

pub mod config;
pub mod error;
pub mod mapping;
pub mod password;
pub mod provider;
pub mod role;
pub mod session;
pub mod token;
pub mod user;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{IdentityConfig, IdentityConfigBuilder};
pub use error::{AuthenticationError, ProviderError};
pub use mapping::UserMapper;
pub use password::{MIN_PASSWORD_LENGTH, PasswordCheck, PasswordViolation, validate_password_strength};
pub use provider::{
    AuthEvent, Credentials, IdentityProvider, ProviderSession, ProviderUser, Registration,
    SignUpOutcome,
};
pub use role::{Plan, Role, UnknownVariant};
pub use session::{SessionPhase, SessionState};
pub use token::{TokenClaims, TokenError};
pub use user::{SessionTokens, User};
