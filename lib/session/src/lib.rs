//! Session orchestration for fieldcheck.
//!
//! [`SessionManager`] drives login, logout, registration, password flows,
//! token refresh and startup restore against an
//! [`IdentityProvider`](fieldcheck_platform_access::IdentityProvider), arms the
//! session timers, and publishes [`SessionState`](fieldcheck_platform_access::SessionState)
//! over a `watch` channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fieldcheck_platform_access::{Credentials, IdentityProvider};
//! use fieldcheck_session::SessionManager;
//!
//! async fn sign_in(provider: Arc<dyn IdentityProvider>) {
//!     let sessions = SessionManager::builder(provider).build();
//!     let _events = sessions.listen();
//!     sessions.restore().await;
//!
//!     if sessions.current_user().is_none() {
//!         let credentials = Credentials::new("ana@example.com", "Secret1!");
//!         if let Err(e) = sessions.login(&credentials).await {
//!             eprintln!("{}", e.user_message());
//!         }
//!     }
//! }
//! ```

mod listener;
mod manager;

pub use manager::{INACTIVITY_MESSAGE, SessionManager, SessionManagerBuilder};

#[cfg(test)]
mod tests;
