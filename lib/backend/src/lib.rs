//! HTTP adapters for the hosted backend.
//!
//! This crate provides:
//! - [`RestIdentityProvider`]: the `IdentityProvider` contract over the
//!   hosted auth service
//! - [`RestStore`]: the `Store` contract over the hosted table API,
//!   authorised with the signed-in user's token
//! - [`FileSessionStore`]: keeps the signed-in session between runs
//!
//! Both adapters are built from one [`BackendConfig`].

mod config;
mod error;
mod http;
mod identity;
mod persist;
mod rest;

pub use config::BackendConfig;
pub use error::BackendError;
pub use identity::RestIdentityProvider;
pub use persist::{FileSessionStore, SessionPersistence};
pub use rest::RestStore;
