//! Domain queries of the console.
//!
//! Each method is a thin specialisation of [`RequestGateway::request`], so
//! every failure is reported once and returned.

use async_trait::async_trait;
use chrono::Utc;
use cosdesk_core::models::{
    AuditDecision, AuditUpdate, Bucket, NewUploadRecord, RecordFilters, RecordStatus, UploadRecord,
    UserFilters, UserProfile, UserStatus,
};
use cosdesk_core::{AppError, AppResult};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::ProfileSource;
use crate::gateway::RequestGateway;
use crate::ApiClient;

pub const USERS_TABLE: &str = "users";
pub const RECORDS_TABLE: &str = "files";
pub const BUCKETS_TABLE: &str = "buckets";

/// `%v%` pattern for an optional free-text filter; blank input means no filter.
fn contains_pattern(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| format!("%{}%", v))
}

#[derive(Clone)]
pub struct ConsoleApi {
    client: ApiClient,
    gateway: RequestGateway,
}

impl ConsoleApi {
    pub fn new(client: ApiClient, gateway: RequestGateway) -> Self {
        Self { client, gateway }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    /// Users matching the filters, newest first.
    pub async fn fetch_users(
        &self,
        filters: &UserFilters,
        signal: Option<&CancellationToken>,
    ) -> AppResult<Vec<UserProfile>> {
        self.gateway
            .request(
                || {
                    let mut query = self.client.table::<UserProfile>(USERS_TABLE).select("*");
                    if let Some(pattern) = contains_pattern(filters.name.as_deref()) {
                        query = query.ilike("name", &pattern);
                    }
                    if let Some(pattern) = contains_pattern(filters.email.as_deref()) {
                        query = query.ilike("email", &pattern);
                    }
                    if let Some(role) = filters.role {
                        query = query.eq("role", role);
                    }
                    if let Some(status) = filters.status {
                        query = query.eq("status", status);
                    }
                    query.order("created_at", false)
                },
                signal,
            )
            .await
    }

    pub async fn update_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
        signal: Option<&CancellationToken>,
    ) -> AppResult<UserProfile> {
        let patch = json!({ "status": status, "updated_at": Utc::now() });
        let query = self
            .client
            .table::<UserProfile>(USERS_TABLE)
            .update(&patch)?
            .eq("id", id);
        let rows = self.gateway.request(|| query, signal).await?;
        self.single_row(rows, || format!("user {}", id))
    }

    pub async fn fetch_buckets(
        &self,
        signal: Option<&CancellationToken>,
    ) -> AppResult<Vec<Bucket>> {
        self.gateway
            .request(
                || self.client.table::<Bucket>(BUCKETS_TABLE).select("*"),
                signal,
            )
            .await
    }

    /// Upload records matching the filters, newest upload first.
    pub async fn fetch_records(
        &self,
        filters: &RecordFilters,
        signal: Option<&CancellationToken>,
    ) -> AppResult<Vec<UploadRecord>> {
        self.gateway
            .request(
                || {
                    let mut query = self.client.table::<UploadRecord>(RECORDS_TABLE).select("*");
                    if let Some(version) = filters.version.as_deref().map(str::trim) {
                        if !version.is_empty() {
                            query = query.eq("version", version);
                        }
                    }
                    if let Some(pattern) = contains_pattern(filters.upload_user.as_deref()) {
                        query = query.ilike("uploadUser", &pattern);
                    }
                    if let Some(status) = filters.status {
                        query = query.eq("status", status);
                    }
                    if let Some(from) = filters.uploaded_from {
                        query = query.gte("uploadTime", from.to_rfc3339());
                    }
                    if let Some(to) = filters.uploaded_to {
                        query = query.lte("uploadTime", to.to_rfc3339());
                    }
                    query.order("uploadTime", false)
                },
                signal,
            )
            .await
    }

    /// Move a pending record to approved or rejected.
    ///
    /// The update is conditioned on `status = pending`, so a record decided
    /// elsewhere in the meantime is left untouched and reported.
    pub async fn audit_record(
        &self,
        id: Uuid,
        decision: AuditDecision,
        auditor: &str,
        signal: Option<&CancellationToken>,
    ) -> AppResult<UploadRecord> {
        let update = AuditUpdate {
            status: decision.target_status(),
            audit_user: auditor.to_string(),
            audit_time: Utc::now(),
        };
        let query = self
            .client
            .table::<UploadRecord>(RECORDS_TABLE)
            .update(&update)?
            .eq("id", id)
            .eq("status", RecordStatus::Pending);
        let rows = self.gateway.request(|| query, signal).await?;

        match rows.into_iter().next() {
            Some(record) => {
                tracing::info!(record_id = %id, status = %record.status, auditor = %auditor, "Record audited");
                Ok(record)
            }
            None => {
                let err = AppError::InvalidInput(format!("record {} is no longer pending", id));
                self.gateway.report(&err);
                Err(err)
            }
        }
    }

    pub async fn fetch_profile(
        &self,
        email: &str,
        signal: Option<&CancellationToken>,
    ) -> AppResult<Option<UserProfile>> {
        let rows = self
            .gateway
            .request(
                || {
                    self.client
                        .table::<UserProfile>(USERS_TABLE)
                        .select("*")
                        .eq("email", email)
                        .limit(1)
                },
                signal,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert_records(
        &self,
        rows: &[NewUploadRecord],
        signal: Option<&CancellationToken>,
    ) -> AppResult<Vec<UploadRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let query = self
            .client
            .table::<UploadRecord>(RECORDS_TABLE)
            .insert(rows)?;
        self.gateway.request(|| query, signal).await
    }

    fn single_row<T>(&self, rows: Vec<T>, what: impl FnOnce() -> String) -> AppResult<T> {
        rows.into_iter().next().ok_or_else(|| {
            let err = AppError::NotFound(what());
            self.gateway.report(&err);
            err
        })
    }
}

#[async_trait]
impl ProfileSource for ConsoleApi {
    async fn fetch_profile(
        &self,
        email: &str,
        signal: &CancellationToken,
    ) -> AppResult<Option<UserProfile>> {
        ConsoleApi::fetch_profile(self, email, Some(signal)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelNotifier;
    use crate::Toast;
    use mockito::Matcher;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    const RECORD_ID: &str = "0d7f8a8e-2c55-4a7e-9d1b-5a2f7d4e1c3b";
    const USER_ID: &str = "6f1c2b3a-4d5e-4f60-8a7b-9c0d1e2f3a4b";

    fn api(url: &str) -> (ConsoleApi, UnboundedReceiver<Toast>) {
        let client = ApiClient::new(url, "anon", Duration::from_secs(5)).unwrap();
        let (notifier, rx) = ChannelNotifier::channel();
        (
            ConsoleApi::new(client, RequestGateway::new(Arc::new(notifier))),
            rx,
        )
    }

    fn record_json(status: &str) -> serde_json::Value {
        json!({
            "id": RECORD_ID,
            "version": "v1.0.0",
            "fileName": "fw.bin",
            "fileType": "application/octet-stream",
            "fileSize": 2048,
            "fileUrl": null,
            "status": status,
            "uploadUser": "dev@example.com",
            "uploadTime": "2024-06-01T10:00:00Z",
            "auditUser": null,
            "auditTime": null
        })
    }

    fn user_json(status: &str) -> serde_json::Value {
        json!({
            "id": USER_ID,
            "email": "dev@example.com",
            "name": "Dev",
            "status": status,
            "role": "normal",
            "bucket_ids": ["b1"],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": null
        })
    }

    #[tokio::test]
    async fn fetch_users_applies_filters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "ilike.%dev%".into()),
                Matcher::UrlEncoded("status".into(), "eq.enabled".into()),
                Matcher::UrlEncoded("order".into(), "created_at.desc".into()),
            ]))
            .with_status(200)
            .with_body(json!([user_json("enabled")]).to_string())
            .create_async()
            .await;
        let (api, _rx) = api(&server.url());

        let filters = UserFilters {
            name: Some(" dev ".to_string()),
            email: Some("   ".to_string()),
            status: Some(UserStatus::Enabled),
            ..Default::default()
        };
        let users = api.fetch_users(&filters, None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].bucket_ids, vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn fetch_records_orders_by_upload_time() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "eq.pending".into()),
                Matcher::UrlEncoded("uploadUser".into(), "ilike.%dev%".into()),
                Matcher::UrlEncoded("order".into(), "uploadTime.desc".into()),
            ]))
            .with_status(200)
            .with_body(json!([record_json("pending")]).to_string())
            .create_async()
            .await;
        let (api, _rx) = api(&server.url());

        let filters = RecordFilters {
            status: Some(RecordStatus::Pending),
            upload_user: Some("dev".to_string()),
            ..Default::default()
        };
        let records = api.fetch_records(&filters, None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records[0].file_name, "fw.bin");
    }

    #[tokio::test]
    async fn audit_is_conditioned_on_pending() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), format!("eq.{}", RECORD_ID)),
                Matcher::UrlEncoded("status".into(), "eq.pending".into()),
            ]))
            .match_body(Matcher::PartialJson(json!({
                "status": "approved",
                "auditUser": "admin@example.com"
            })))
            .with_status(200)
            .with_body(json!([record_json("approved")]).to_string())
            .create_async()
            .await;
        let (api, _rx) = api(&server.url());

        let record = api
            .audit_record(
                RECORD_ID.parse().unwrap(),
                AuditDecision::Approve,
                "admin@example.com",
                None,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(record.status, RecordStatus::Approved);
    }

    #[tokio::test]
    async fn audit_of_decided_record_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/rest/v1/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let (api, mut rx) = api(&server.url());

        let err = api
            .audit_record(
                RECORD_ID.parse().unwrap(),
                AuditDecision::Reject,
                "admin@example.com",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(rx.try_recv().unwrap().message.contains("no longer pending"));
    }

    #[tokio::test]
    async fn update_user_status_returns_row() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/rest/v1/users")
            .match_query(Matcher::UrlEncoded("id".into(), format!("eq.{}", USER_ID)))
            .match_body(Matcher::PartialJson(json!({ "status": "disabled" })))
            .with_status(200)
            .with_body(json!([user_json("disabled")]).to_string())
            .create_async()
            .await;
        let (api, _rx) = api(&server.url());

        let user = api
            .update_user_status(USER_ID.parse().unwrap(), UserStatus::Disabled, None)
            .await
            .unwrap();

        assert!(!user.is_enabled());
    }

    #[tokio::test]
    async fn profile_lookup_takes_first_row() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("email".into(), "eq.dev@example.com".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(json!([user_json("enabled")]).to_string())
            .create_async()
            .await;
        let (api, _rx) = api(&server.url());

        let profile = api.fetch_profile("dev@example.com", None).await.unwrap();
        assert_eq!(profile.map(|p| p.email), Some("dev@example.com".to_string()));
    }

    #[tokio::test]
    async fn empty_insert_skips_network() {
        let (api, _rx) = api("http://127.0.0.1:9");
        assert!(api.insert_records(&[], None).await.unwrap().is_empty());
    }
}
