//! Application configuration.
//!
//! Loaded via the `config` crate from `FIELDCHECK__`-prefixed environment
//! variables, with `__` separating nested keys:
//!
//! ```text
//! FIELDCHECK__BACKEND__URL=https://abc.example.co
//! FIELDCHECK__BACKEND__API_KEY=...
//! FIELDCHECK__IDENTITY__ROLE_CLAIM=user_role
//! FIELDCHECK__LOG_FILTER=info,fieldcheck_session=debug
//! ```

use std::collections::HashMap;

use fieldcheck_backend::BackendConfig;
use fieldcheck_platform_access::IdentityConfig;
use serde::Deserialize;

const ENV_PREFIX: &str = "FIELDCHECK";

/// Configuration composed from the library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Hosted backend connection.
    pub backend: BackendConfig,

    /// How identity claims map onto users.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Fallback tracing directive when `RUST_LOG` is unset.
    /// Default: "info"
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(environment())
    }

    /// Loads configuration from an explicit variable map, as if it were the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_sources(vars: HashMap<String, String>) -> Result<Self, config::ConfigError> {
        Self::load(environment().source(Some(vars)))
    }

    fn load(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
