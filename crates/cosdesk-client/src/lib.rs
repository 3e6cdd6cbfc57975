//! HTTP client for the backend-as-a-service behind the console.
//!
//! Provides the shared client (API key plus the signed-in user's bearer
//! token), a typed row-query builder, the [`RequestGateway`] every screen
//! goes through, the auth backend, and the console's domain queries.

pub mod api;
pub mod auth;
pub mod gateway;
pub mod notify;
pub mod query;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use cosdesk_core::{AppError, AppResult, Config};
use reqwest::Client;

pub use api::ConsoleApi;
pub use auth::{AuthBackend, AuthClient, ProfileSource};
pub use gateway::RequestGateway;
pub use notify::{ChannelNotifier, Notifier, Toast, ToastLevel, TracingNotifier};
pub use query::{Query, QueryResult, Table};
pub use tokio_util::sync::CancellationToken;

/// HTTP client for the backend with `apikey` + bearer auth.
///
/// Clones share the access token, so signing in through [`AuthClient`]
/// authorizes every query built from the same client.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            config.backend_url(),
            config.anon_key(),
            Duration::from_secs(config.request_timeout_secs()),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    /// Start a typed query against a table under `/rest/v1`.
    pub fn table<Row>(&self, name: &str) -> Table<Row> {
        Table::new(self.clone(), name)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// Anonymous requests authenticate with the API key itself.
    pub(crate) fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.access_token().unwrap_or_else(|| self.api_key.clone());
        request.header("apikey", &self.api_key).bearer_auth(token)
    }

    pub(crate) fn apply_api_key(
        &self,
        request: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

/// Map a reqwest failure into the console taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Transport(format!("request timed out: {}", err))
    } else {
        AppError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_shared_between_clones() {
        let client = ApiClient::new("http://localhost:54321/", "anon", Duration::from_secs(1))
            .unwrap();
        let other = client.clone();
        client.set_access_token(Some("jwt".to_string()));
        assert_eq!(other.access_token().as_deref(), Some("jwt"));
        assert_eq!(other.build_url("/rest/v1/users"), "http://localhost:54321/rest/v1/users");
    }
}
