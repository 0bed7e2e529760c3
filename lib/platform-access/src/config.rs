//! Identity configuration.
//!
//! Tells the claims mapper where to find the role and where password-reset
//! emails should send the user back to.

use serde::{Deserialize, Serialize};

/// Configuration for interpreting identity-provider claims.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Name of the access-token claim carrying the application role.
    /// Default: "user_role"
    #[serde(default = "default_role_claim")]
    role_claim: String,
    /// Metadata key carrying the role when the token has none.
    /// Default: "role"
    #[serde(default = "default_metadata_role_key")]
    metadata_role_key: String,
    /// Where the password-reset email links back to.
    #[serde(default)]
    password_reset_redirect: Option<String>,
}

fn default_role_claim() -> String {
    "user_role".to_string()
}

fn default_metadata_role_key() -> String {
    "role".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            role_claim: default_role_claim(),
            metadata_role_key: default_metadata_role_key(),
            password_reset_redirect: None,
        }
    }
}

impl IdentityConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> IdentityConfigBuilder {
        IdentityConfigBuilder::new()
    }

    #[must_use]
    pub fn role_claim(&self) -> &str {
        &self.role_claim
    }

    #[must_use]
    pub fn metadata_role_key(&self) -> &str {
        &self.metadata_role_key
    }

    #[must_use]
    pub fn password_reset_redirect(&self) -> Option<&str> {
        self.password_reset_redirect.as_deref()
    }
}

/// Builder for `IdentityConfig`.
#[derive(Debug, Default)]
pub struct IdentityConfigBuilder {
    config: IdentityConfig,
}

impl IdentityConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn role_claim(mut self, claim: impl Into<String>) -> Self {
        self.config.role_claim = claim.into();
        self
    }

    #[must_use]
    pub fn metadata_role_key(mut self, key: impl Into<String>) -> Self {
        self.config.metadata_role_key = key.into();
        self
    }

    #[must_use]
    pub fn password_reset_redirect(mut self, url: impl Into<String>) -> Self {
        self.config.password_reset_redirect = Some(url.into());
        self
    }

    #[must_use]
    pub fn build(self) -> IdentityConfig {
        self.config
    }
}
