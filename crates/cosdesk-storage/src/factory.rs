#[cfg(feature = "storage-bucket")]
use crate::BucketStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
use crate::{ObjectStorage, StorageBackend, StorageError, StorageResult};
use cosdesk_core::Config;
use std::sync::Arc;
use std::time::Duration;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn ObjectStorage>> {
    match config.storage_backend() {
        #[cfg(feature = "storage-bucket")]
        StorageBackend::Bucket => {
            let storage = BucketStorage::new(
                config.backend_url(),
                config.anon_key(),
                config.storage_bucket(),
                Duration::from_secs(config.request_timeout_secs()),
            )?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-bucket"))]
        StorageBackend::Bucket => Err(StorageError::ConfigError(
            "Bucket storage backend not available (storage-bucket feature not enabled)"
                .to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config
                .local_storage_path()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError(
                        "COSDESK_LOCAL_STORAGE_PATH not configured".to_string(),
                    )
                })?;
            let base_url = config
                .local_storage_base_url()
                .map(String::from)
                .unwrap_or_else(|| format!("file://{}", base_path.trim_end_matches('/')));

            let storage = LocalStorage::new(base_path, base_url).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

#[cfg(all(test, feature = "storage-local", feature = "storage-bucket"))]
mod tests {
    use super::*;

    fn config(extra: &[(&str, &str)]) -> Config {
        let mut pairs = vec![
            (
                "COSDESK_BACKEND_URL".to_string(),
                "https://demo.example.co".to_string(),
            ),
            ("COSDESK_ANON_KEY".to_string(), "anon".to_string()),
        ];
        pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Config::from_pairs(pairs).unwrap()
    }

    #[tokio::test]
    async fn bucket_backend_by_default() {
        let storage = create_storage(&config(&[])).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Bucket);
    }

    #[tokio::test]
    async fn local_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let storage = create_storage(&config(&[
            ("COSDESK_STORAGE_BACKEND", "local"),
            ("COSDESK_LOCAL_STORAGE_PATH", path.as_str()),
        ]))
        .await
        .unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Local);
        let stored = storage
            .upload("fw.bin", "application/octet-stream", bytes::Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(stored.url, format!("file://{}/fw.bin", path.trim_end_matches('/')));
    }
}
