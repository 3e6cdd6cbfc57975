use std::sync::Mutex;

use cosdesk_client::ConsoleApi;
use cosdesk_core::models::{bucket_labels, Bucket, UserFilters, UserProfile};
use cosdesk_core::AppResult;

use super::LatestFetch;

/// A user row with bucket names resolved for display.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user: UserProfile,
    pub buckets: Vec<String>,
}

/// User management table (admins only).
pub struct UsersScreen {
    api: ConsoleApi,
    fetch: LatestFetch<UserProfile>,
    buckets: Mutex<Vec<Bucket>>,
    filters: Mutex<UserFilters>,
}

impl UsersScreen {
    pub fn new(api: ConsoleApi) -> Self {
        Self {
            api,
            fetch: LatestFetch::new(),
            buckets: Mutex::new(Vec::new()),
            filters: Mutex::new(UserFilters::default()),
        }
    }

    /// Load the bucket labels once, then the unfiltered user list.
    ///
    /// A failed bucket lookup is already reported; ids are then shown verbatim.
    pub async fn open(&self) -> AppResult<()> {
        self.load_buckets().await;
        self.search(UserFilters::default()).await
    }

    /// Refresh the bucket list used to label rows.
    pub async fn load_buckets(&self) {
        if let Ok(buckets) = self.api.fetch_buckets(None).await {
            *self.buckets.lock().unwrap_or_else(|e| e.into_inner()) = buckets;
        }
    }

    pub async fn search(&self, filters: UserFilters) -> AppResult<()> {
        *self.filters.lock().unwrap_or_else(|e| e.into_inner()) = filters.clone();
        let api = &self.api;
        self.fetch
            .issue(|token| async move { api.fetch_users(&filters, Some(&token)).await })
            .await?;
        Ok(())
    }

    pub async fn reset(&self) -> AppResult<()> {
        self.search(UserFilters::default()).await
    }

    /// Flip enabled/disabled with a single mutation, then refetch the list.
    pub async fn toggle_status(&self, user: &UserProfile) -> AppResult<UserProfile> {
        let next = user.status.toggled();
        let updated = self.api.update_user_status(user.id, next, None).await?;
        tracing::info!(user_id = %updated.id, status = %updated.status, "User status changed");

        if let Err(e) = self.search(self.filters()).await {
            tracing::debug!(error = %e, "Refresh after status change failed");
        }
        Ok(updated)
    }

    pub fn buckets(&self) -> Vec<Bucket> {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn filters(&self) -> UserFilters {
        self.filters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn rows(&self) -> Vec<UserRow> {
        let buckets = self.buckets();
        self.fetch
            .rows()
            .into_iter()
            .map(|user| UserRow {
                buckets: bucket_labels(&user.bucket_ids, &buckets),
                user,
            })
            .collect()
    }

    pub fn is_loading(&self) -> bool {
        self.fetch.is_loading()
    }

    pub fn close(&self) {
        self.fetch.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosdesk_client::{ApiClient, ChannelNotifier, RequestGateway};
    use cosdesk_core::models::UserStatus;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const USER_ID: &str = "6f1c2b3a-4d5e-4f60-8a7b-9c0d1e2f3a4b";

    fn user(status: &str) -> serde_json::Value {
        json!({
            "id": USER_ID,
            "email": "dev@example.com",
            "name": "Dev",
            "status": status,
            "role": "normal",
            "bucket_ids": ["b1", "b9"],
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    fn screen(url: &str) -> UsersScreen {
        let client = ApiClient::new(url, "anon", Duration::from_secs(5)).unwrap();
        let (notifier, _rx) = ChannelNotifier::channel();
        UsersScreen::new(ConsoleApi::new(
            client,
            RequestGateway::new(Arc::new(notifier)),
        ))
    }

    #[tokio::test]
    async fn open_labels_buckets_and_toggle_refetches() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/buckets")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"id":"b1","bucket":"firmware","domain":null}]"#)
            .create_async()
            .await;
        let initial = server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([user("enabled")]).to_string())
            .create_async()
            .await;
        server
            .mock("PATCH", "/rest/v1/users")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({ "status": "disabled" })))
            .with_status(200)
            .with_body(json!([user("disabled")]).to_string())
            .create_async()
            .await;

        let screen = screen(&server.url());
        screen.open().await.unwrap();

        let rows = screen.rows();
        assert_eq!(rows[0].buckets, vec!["firmware".to_string(), "b9".to_string()]);

        initial.remove_async().await;
        let refetch = server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([user("disabled")]).to_string())
            .create_async()
            .await;

        let updated = screen.toggle_status(&rows[0].user).await.unwrap();
        refetch.assert_async().await;
        assert_eq!(updated.status, UserStatus::Disabled);
        assert_eq!(screen.rows()[0].user.status, UserStatus::Disabled);
    }

    #[tokio::test]
    async fn bucket_failure_still_lists_users() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/buckets")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"message":"boom"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([user("enabled")]).to_string())
            .create_async()
            .await;

        let screen = screen(&server.url());
        screen.open().await.unwrap();

        assert!(screen.buckets().is_empty());
        assert_eq!(screen.rows()[0].buckets, vec!["b1".to_string(), "b9".to_string()]);
    }
}
