use std::sync::Mutex;

use cosdesk_client::ConsoleApi;
use cosdesk_core::models::{AuditDecision, RecordFilters, UploadRecord, UserProfile};
use cosdesk_core::{AppError, AppResult};
use uuid::Uuid;

use super::LatestFetch;

/// Upload records table with the audit actions.
pub struct RecordsScreen {
    api: ConsoleApi,
    fetch: LatestFetch<UploadRecord>,
    filters: Mutex<RecordFilters>,
}

impl RecordsScreen {
    pub fn new(api: ConsoleApi) -> Self {
        Self {
            api,
            fetch: LatestFetch::new(),
            filters: Mutex::new(RecordFilters::default()),
        }
    }

    /// Initial load without criteria.
    pub async fn open(&self) -> AppResult<()> {
        self.search(RecordFilters::default()).await
    }

    /// Fetch with new criteria; a superseded fetch ends quietly.
    pub async fn search(&self, filters: RecordFilters) -> AppResult<()> {
        *self.filters.lock().unwrap_or_else(|e| e.into_inner()) = filters.clone();
        let api = &self.api;
        self.fetch
            .issue(|token| async move { api.fetch_records(&filters, Some(&token)).await })
            .await?;
        Ok(())
    }

    pub async fn reset(&self) -> AppResult<()> {
        self.search(RecordFilters::default()).await
    }

    pub async fn approve(&self, id: Uuid, auditor: &UserProfile) -> AppResult<UploadRecord> {
        self.audit(id, AuditDecision::Approve, auditor).await
    }

    pub async fn reject(&self, id: Uuid, auditor: &UserProfile) -> AppResult<UploadRecord> {
        self.audit(id, AuditDecision::Reject, auditor).await
    }

    /// Single audit mutation followed by a refetch of the list.
    ///
    /// A row already known to be decided is refused locally.
    async fn audit(
        &self,
        id: Uuid,
        decision: AuditDecision,
        auditor: &UserProfile,
    ) -> AppResult<UploadRecord> {
        if !auditor.is_admin() {
            let err = AppError::Forbidden("only admins can audit uploads".to_string());
            self.api.gateway().report(&err);
            return Err(err);
        }

        let target = decision.target_status();
        let current = self
            .fetch
            .rows()
            .into_iter()
            .find(|r| r.id == id)
            .map(|r| r.status);
        if let Some(current) = current {
            if !current.can_transition_to(target) {
                let err = AppError::InvalidInput(format!("record {} is already {}", id, current));
                self.api.gateway().report(&err);
                return Err(err);
            }
        }

        let updated = self
            .api
            .audit_record(id, decision, &auditor.email, None)
            .await?;

        self.refresh().await;
        Ok(updated)
    }

    /// Re-issue the fetch with the current criteria after a mutation.
    async fn refresh(&self) {
        if let Err(e) = self.search(self.filters()).await {
            tracing::debug!(error = %e, "Refresh after audit failed");
        }
    }

    pub fn filters(&self) -> RecordFilters {
        self.filters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn rows(&self) -> Vec<UploadRecord> {
        self.fetch.rows()
    }

    pub fn is_loading(&self) -> bool {
        self.fetch.is_loading()
    }

    /// Teardown: the in-flight fetch is cancelled and its result dropped.
    pub fn close(&self) {
        self.fetch.cancel();
    }
}
