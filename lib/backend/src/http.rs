//! Shared HTTP plumbing for both adapters.

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::BackendError;

#[derive(Clone)]
pub(crate) struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub(crate) fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = config.url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(BackendError::InvalidConfig {
                reason: format!("backend url '{base_url}' is not an http(s) url"),
            });
        }
        if config.api_key.trim().is_empty() {
            return Err(BackendError::InvalidConfig {
                reason: "backend api key is empty".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BackendError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A request carrying the API key, authorised as `bearer` or, when no
    /// user is signed in, as the anonymous key.
    pub(crate) fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer.unwrap_or(self.api_key.as_str()))
    }

    /// Sends `request`, turning transport failures and non-success statuses
    /// into [`BackendError`].
    pub(crate) async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, endpoint, "backend request failed");
            if e.is_timeout() {
                BackendError::Timeout {
                    endpoint: endpoint.to_string(),
                }
            } else {
                BackendError::Transport {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(endpoint, status = status.as_u16(), "backend request succeeded");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(endpoint, status = status.as_u16(), "backend returned an error status");
        Err(BackendError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    /// Sends `request` and decodes the JSON body.
    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = self.send(endpoint, request).await?;
        response.json().await.map_err(|e| BackendError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Pulls the human-readable message out of an error body. Both services use
/// a handful of field names for it; anything else is returned as is.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map_or_else(|| body.trim().to_string(), str::to_string)
}
