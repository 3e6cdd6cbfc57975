use crate::keys::{encode_key, validate_key};
use crate::traits::{ObjectStorage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;

/// Error body returned by the storage API
#[derive(Debug, Deserialize)]
struct StorageApiError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Bucket storage of the backend-as-a-service (`/storage/v1`)
pub struct BucketStorage {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
    access_token: RwLock<Option<String>>,
}

impl BucketStorage {
    /// Create a new BucketStorage instance
    ///
    /// # Arguments
    /// * `base_url` - Project URL (e.g., "https://xyz.supabase.co")
    /// * `api_key` - Public API key sent as `apikey`
    /// * `bucket` - Bucket name
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(StorageError::ConfigError(
                "storage bucket name must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(BucketStorage {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket,
            access_token: RwLock::new(None),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Public URL of an object, whether or not it exists yet.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            encode_key(key)
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            encode_key(key)
        )
    }

    /// Authenticated requests use the user's token, anonymous ones the API key.
    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| self.api_key.clone());
        request
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    async fn error_message(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<StorageApiError>(&body) {
            Ok(StorageApiError {
                message: Some(message),
                ..
            }) => message,
            Ok(StorageApiError {
                error: Some(error), ..
            }) => error,
            _ if body.is_empty() => format!("status {}", status),
            _ => format!("status {}: {}", status, body),
        }
    }
}

#[async_trait]
impl ObjectStorage for BucketStorage {
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<StoredObject> {
        validate_key(key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        let response = self
            .apply_auth(self.client.post(self.object_url(key)))
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        if !response.status().is_success() {
            let message = Self::error_message(response).await;
            tracing::error!(
                error = %message,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Bucket upload failed"
            );
            return Err(StorageError::UploadFailed(message));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Bucket upload successful"
        );

        Ok(StoredObject {
            key: key.to_string(),
            url: self.public_url(key),
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;

        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let response = self
            .apply_auth(self.client.delete(url))
            .json(&serde_json::json!({ "prefixes": [key] }))
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::DeleteFailed(Self::error_message(response).await));
        }

        tracing::info!(bucket = %self.bucket, key = %key, "Bucket delete successful");
        Ok(())
    }

    fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn storage(url: &str) -> BucketStorage {
        BucketStorage::new(url, "anon", "uploads", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn upload_posts_object_with_user_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/storage/v1/object/uploads/a/b/fw-v1.bin")
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer user-token")
            .match_header("content-type", "application/octet-stream")
            .match_body("firmware")
            .with_status(200)
            .with_body(r#"{"Key":"uploads/a/b/fw-v1.bin"}"#)
            .create_async()
            .await;

        let storage = storage(&server.url());
        storage.set_access_token(Some("user-token".to_string()));
        let stored = storage
            .upload(
                "a/b/fw-v1.bin",
                "application/octet-stream",
                Bytes::from_static(b"firmware"),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(stored.key, "a/b/fw-v1.bin");
        assert_eq!(
            stored.url,
            format!(
                "{}/storage/v1/object/public/uploads/a/b/fw-v1.bin",
                server.url()
            )
        );
    }

    #[tokio::test]
    async fn upload_failure_carries_backend_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/storage/v1/object/uploads/fw.bin")
            .with_status(409)
            .with_body(r#"{"statusCode":"409","error":"Duplicate","message":"The resource already exists"}"#)
            .create_async()
            .await;

        let result = storage(&server.url())
            .upload("fw.bin", "application/octet-stream", Bytes::from_static(b"x"))
            .await;

        match result {
            Err(StorageError::UploadFailed(message)) => {
                assert_eq!(message, "The resource already exists")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn delete_removes_prefix_with_api_key_when_anonymous() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/storage/v1/object/uploads")
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer anon")
            .match_body(Matcher::Json(serde_json::json!({ "prefixes": ["a/fw.bin"] })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        storage(&server.url()).delete("a/fw.bin").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_failure_carries_backend_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/storage/v1/object/uploads")
            .with_status(403)
            .with_body(r#"{"error":"Unauthorized","message":"new row violates row-level security policy"}"#)
            .create_async()
            .await;

        let result = storage(&server.url()).delete("fw.bin").await;

        match result {
            Err(StorageError::DeleteFailed(message)) => {
                assert_eq!(message, "new row violates row-level security policy")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn traversal_never_reaches_the_network() {
        let storage = storage("http://127.0.0.1:9");
        let result = storage.delete("../secrets").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn empty_bucket_rejected() {
        assert!(BucketStorage::new("http://x", "anon", " ", Duration::from_secs(1)).is_err());
    }
}
