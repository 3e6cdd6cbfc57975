//! RequestGateway: the single path every backend call takes.
//!
//! The gateway binds an optional cancellation token to the query, resolves
//! the `{data, error}` result, reports any non-cancellation failure to the
//! [`Notifier`] exactly once, and hands the original failure back to the
//! caller.

use std::future::Future;
use std::sync::Arc;

use cosdesk_core::{AppError, AppResult, ErrorMetadata, LogLevel};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::notify::Notifier;
use crate::query::Query;

#[derive(Clone)]
pub struct RequestGateway {
    notifier: Arc<dyn Notifier>,
}

impl RequestGateway {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Execute the query produced by `make_query`.
    ///
    /// The result type is fixed by the query builder, so callers never
    /// annotate it.
    pub async fn request<R, F>(
        &self,
        make_query: F,
        signal: Option<&CancellationToken>,
    ) -> AppResult<R>
    where
        F: FnOnce() -> Query<R>,
        R: DeserializeOwned,
    {
        let mut query = make_query();
        if let Some(token) = signal {
            query = query.abort_signal(token.clone());
        }
        let table = query.table().to_string();

        let result = query.execute().await.into_result();
        if let Err(err) = &result {
            self.log(&table, err);
            self.report(err);
        }
        result
    }

    /// Run an arbitrary backend operation under the same reporting rule.
    pub async fn run<T, Fut>(&self, operation: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        let result = operation.await;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Toast a failure unless it is a cancellation or purely local.
    pub fn report(&self, err: &AppError) {
        if err.is_cancelled() || !err.is_user_visible() {
            return;
        }
        self.notifier.error(&err.client_message());
    }

    fn log(&self, table: &str, err: &AppError) {
        match err.log_level() {
            LogLevel::Debug => {
                tracing::debug!(table = %table, error_code = err.error_code(), error = %err, "Request failed")
            }
            LogLevel::Warn => {
                tracing::warn!(table = %table, error_code = err.error_code(), error = %err, "Request failed")
            }
            LogLevel::Error => {
                tracing::error!(table = %table, error_code = err.error_code(), error = %err, "Request failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelNotifier, ToastLevel};
    use crate::ApiClient;
    use mockito::Matcher;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct Row {
        #[allow(dead_code)]
        id: i64,
    }

    fn setup(url: &str) -> (ApiClient, RequestGateway, tokio::sync::mpsc::UnboundedReceiver<crate::Toast>) {
        let client = ApiClient::new(url, "anon", Duration::from_secs(5)).unwrap();
        let (notifier, rx) = ChannelNotifier::channel();
        (client, RequestGateway::new(Arc::new(notifier)), rx)
    }

    #[tokio::test]
    async fn success_returns_data_without_toast() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/buckets")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"id":1},{"id":2}]"#)
            .create_async()
            .await;
        let (client, gateway, mut rx) = setup(&server.url());

        let rows = gateway
            .request(|| client.table::<Row>("buckets").select("*"), None)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn backend_error_is_toasted_once_and_rethrown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/buckets")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"code":"PGRST301","message":"JWT expired"}"#)
            .create_async()
            .await;
        let (client, gateway, mut rx) = setup(&server.url());

        let err = gateway
            .request(|| client.table::<Row>("buckets").select("*"), None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "JWT expired");
        let toast = rx.try_recv().unwrap();
        assert_eq!(toast.level, ToastLevel::Error);
        assert_eq!(toast.message, "JWT expired");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancellation_is_rethrown_silently() {
        let (client, gateway, mut rx) = setup("http://127.0.0.1:9");
        let token = CancellationToken::new();
        token.cancel();

        let result = gateway
            .request(|| client.table::<Row>("buckets").select("*"), Some(&token))
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn run_reports_auth_failures() {
        let (_, gateway, mut rx) = setup("http://127.0.0.1:9");

        let result: AppResult<()> = gateway
            .run(async { Err(AppError::Auth("Invalid login credentials".to_string())) })
            .await;

        assert!(result.is_err());
        assert_eq!(rx.try_recv().unwrap().message, "Invalid login credentials");
    }

    #[tokio::test]
    async fn validation_failures_are_not_toasted() {
        let (_, gateway, mut rx) = setup("http://127.0.0.1:9");
        gateway.report(&AppError::Validation(validator::ValidationErrors::new()));
        assert!(rx.try_recv().is_err());
    }
}
