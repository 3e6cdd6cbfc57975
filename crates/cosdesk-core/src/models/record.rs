use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit status of an upload record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Approved,
    Pending,
    Rejected,
}

impl RecordStatus {
    /// Only `pending` records can be audited; approved and rejected are terminal.
    pub fn can_transition_to(self, next: RecordStatus) -> bool {
        matches!(
            (self, next),
            (RecordStatus::Pending, RecordStatus::Approved)
                | (RecordStatus::Pending, RecordStatus::Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        self != RecordStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Approved => "approved",
            RecordStatus::Pending => "pending",
            RecordStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approved" => Ok(RecordStatus::Approved),
            "pending" => Ok(RecordStatus::Pending),
            "rejected" => Ok(RecordStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid record status: {}", s)),
        }
    }
}

impl Display for RecordStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Admin decision on a pending record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditDecision {
    Approve,
    Reject,
}

impl AuditDecision {
    pub fn target_status(self) -> RecordStatus {
        match self {
            AuditDecision::Approve => RecordStatus::Approved,
            AuditDecision::Reject => RecordStatus::Rejected,
        }
    }
}

/// Persisted record of an uploaded file (row of the `files` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: Uuid,
    pub version: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_url: Option<String>,
    pub status: RecordStatus,
    pub upload_user: String,
    pub upload_time: DateTime<Utc>,
    #[serde(default)]
    pub audit_user: Option<String>,
    #[serde(default)]
    pub audit_time: Option<DateTime<Utc>>,
}

impl UploadRecord {
    pub fn can_audit(&self) -> bool {
        self.status == RecordStatus::Pending
    }
}

/// Insert payload for a freshly uploaded file. Records always start `pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUploadRecord {
    pub version: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub file_url: Option<String>,
    pub status: RecordStatus,
    pub upload_user: String,
    pub upload_time: DateTime<Utc>,
}

/// Update payload written by an audit action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditUpdate {
    pub status: RecordStatus,
    pub audit_user: String,
    pub audit_time: DateTime<Utc>,
}

/// One entry of the flat list handed to the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub path: String,
}

/// Criteria emitted by the records search form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilters {
    pub version: Option<String>,
    pub upload_user: Option<String>,
    pub status: Option<RecordStatus>,
    pub uploaded_from: Option<DateTime<Utc>>,
    pub uploaded_to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_transitions() {
        assert!(RecordStatus::Pending.can_transition_to(RecordStatus::Approved));
        assert!(RecordStatus::Pending.can_transition_to(RecordStatus::Rejected));
        assert!(!RecordStatus::Approved.can_transition_to(RecordStatus::Rejected));
        assert!(!RecordStatus::Rejected.can_transition_to(RecordStatus::Approved));
        assert!(!RecordStatus::Pending.can_transition_to(RecordStatus::Pending));
        assert!(RecordStatus::Approved.is_terminal());
        assert!(!RecordStatus::Pending.is_terminal());
    }

    #[test]
    fn record_uses_camel_case_columns() {
        let json = serde_json::json!({
            "id": "0d7f8a8e-2c55-4a7e-9d1b-5a2f7d4e1c3b",
            "version": "v1.0.0",
            "fileName": "fw.bin",
            "fileType": "application/octet-stream",
            "fileSize": 2048,
            "fileUrl": null,
            "status": "pending",
            "uploadUser": "dev@example.com",
            "uploadTime": "2024-06-01T10:00:00Z",
            "auditUser": null,
            "auditTime": null
        });
        let record: UploadRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.file_name, "fw.bin");
        assert!(record.can_audit());

        let audit = AuditUpdate {
            status: AuditDecision::Approve.target_status(),
            audit_user: "admin@example.com".to_string(),
            audit_time: record.upload_time,
        };
        let value = serde_json::to_value(&audit).unwrap();
        assert_eq!(value["status"], "approved");
        assert_eq!(value["auditUser"], "admin@example.com");
    }

    #[test]
    fn upload_entry_serializes_type_field() {
        let entry = UploadEntry {
            name: "a.png".to_string(),
            size: 10,
            content_type: "image/png".to_string(),
            path: "/".to_string(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "image/png");
    }
}
