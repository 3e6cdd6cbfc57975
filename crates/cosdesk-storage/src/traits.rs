//! Storage abstraction trait
//!
//! This module defines the ObjectStorage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use cosdesk_core::AppError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(key),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::ConfigError(msg) => AppError::Config(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Where an uploaded object ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object key inside the bucket
    pub key: String,
    /// Publicly reachable URL for the object
    pub url: String,
}

/// Storage abstraction trait
///
/// All storage backends (backend buckets, local filesystem) must implement
/// this trait so the uploader works without coupling to either of them.
///
/// **Key format:** see the crate root documentation and [`crate::keys`].
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload `data` under `key`. Existing objects are not overwritten.
    async fn upload(&self, key: &str, content_type: &str, data: Bytes)
        -> StorageResult<StoredObject>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Access token of the signed-in user. Backends without auth ignore it.
    fn set_access_token(&self, _token: Option<String>) {}

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
