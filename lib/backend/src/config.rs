//! Backend connection settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Where the hosted backend lives and how to reach it.
#[derive(Clone, Deserialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://abc.example.co`.
    pub url: String,
    /// Public API key sent with every request.
    pub api_key: String,
    /// Per-request timeout.
    /// Default: 30
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// File the signed-in session is kept in between runs. Without one the
    /// session lives only as long as the process.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl BackendConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            request_timeout_seconds: default_request_timeout_seconds(),
            session_file: None,
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("api_key", &"[redacted]")
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("session_file", &self.session_file)
            .finish()
    }
}
