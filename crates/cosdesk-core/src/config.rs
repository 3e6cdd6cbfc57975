//! Configuration module
//!
//! Settings are read from `COSDESK_`-prefixed environment variables (a `.env`
//! file is loaded first when present).

use std::path::PathBuf;

use serde::Deserialize;

use crate::storage_types::StorageBackend;

const ENV_PREFIX: &str = "COSDESK_";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BUCKET: &str = "uploads";
const DEFAULT_QUICK_PATH: &str = "/a/b/c";
const SESSION_DIR: &str = ".cosdesk";
const SESSION_FILE: &str = "session.json";

fn default_timeout() -> u64 {
    REQUEST_TIMEOUT_SECS
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Bucket
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_quick_paths() -> Vec<String> {
    vec![DEFAULT_QUICK_PATH.to_string()]
}

fn default_environment() -> String {
    "development".to_string()
}

/// Console configuration
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Root URL of the backend-as-a-service project (auth, rest and storage live under it)
    pub backend_url: String,
    /// Public (anon) API key sent as `apikey` on every request
    pub anon_key: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,
    #[serde(default = "default_bucket")]
    pub storage_bucket: String,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    /// Destination paths offered as one-click choices on the upload screen
    #[serde(default = "default_quick_paths")]
    pub quick_paths: Vec<String>,
    pub session_file: Option<PathBuf>,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config = envy::prefixed(ENV_PREFIX)
            .from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to read configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from explicit `(NAME, value)` pairs (names include the prefix).
    pub fn from_pairs<I>(pairs: I) -> Result<Self, anyhow::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed(ENV_PREFIX)
            .from_iter::<_, Config>(pairs)
            .map_err(|e| anyhow::anyhow!("Failed to read configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let url = self.backend_url.trim();
        if url.is_empty() {
            return Err(anyhow::anyhow!("COSDESK_BACKEND_URL must not be empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "COSDESK_BACKEND_URL must be an http(s) URL, got {}",
                url
            ));
        }
        if self.anon_key.trim().is_empty() {
            return Err(anyhow::anyhow!("COSDESK_ANON_KEY must not be empty"));
        }
        if self.storage_backend == StorageBackend::Local && self.local_storage_path.is_none() {
            return Err(anyhow::anyhow!(
                "COSDESK_LOCAL_STORAGE_PATH is required when COSDESK_STORAGE_BACKEND=local"
            ));
        }
        Ok(())
    }

    /// Check if the console is running against a production project
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn backend_url(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    pub fn storage_bucket(&self) -> &str {
        &self.storage_bucket
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.local_storage_base_url.as_deref()
    }

    pub fn quick_paths(&self) -> &[String] {
        &self.quick_paths
    }

    /// Where the CLI persists the session between invocations.
    pub fn session_file(&self) -> PathBuf {
        if let Some(path) = &self.session_file {
            return path.clone();
        }
        home::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SESSION_DIR)
            .join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut v = vec![
            (
                "COSDESK_BACKEND_URL".to_string(),
                "https://demo.example.co/".to_string(),
            ),
            ("COSDESK_ANON_KEY".to_string(), "anon".to_string()),
        ];
        v.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        v
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_pairs(pairs(&[])).unwrap();
        assert_eq!(config.backend_url(), "https://demo.example.co");
        assert_eq!(config.request_timeout_secs(), 30);
        assert_eq!(config.storage_backend(), StorageBackend::Bucket);
        assert_eq!(config.storage_bucket(), "uploads");
        assert_eq!(config.quick_paths(), &["/a/b/c".to_string()]);
        assert!(!config.is_production());
        assert!(config.session_file().ends_with(".cosdesk/session.json"));
    }

    #[test]
    fn test_quick_paths_are_comma_separated() {
        let config =
            Config::from_pairs(pairs(&[("COSDESK_QUICK_PATHS", "/fw,/fw/beta")])).unwrap();
        assert_eq!(
            config.quick_paths(),
            &["/fw".to_string(), "/fw/beta".to_string()]
        );
    }

    #[test]
    fn test_missing_key_rejected() {
        let result = Config::from_pairs(vec![(
            "COSDESK_BACKEND_URL".to_string(),
            "https://demo.example.co".to_string(),
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_http_url_rejected() {
        let result = Config::from_pairs(vec![
            ("COSDESK_BACKEND_URL".to_string(), "ftp://demo".to_string()),
            ("COSDESK_ANON_KEY".to_string(), "anon".to_string()),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_local_storage_requires_path() {
        let result = Config::from_pairs(pairs(&[("COSDESK_STORAGE_BACKEND", "local")]));
        assert!(result.is_err());

        let config = Config::from_pairs(pairs(&[
            ("COSDESK_STORAGE_BACKEND", "local"),
            ("COSDESK_LOCAL_STORAGE_PATH", "/tmp/cosdesk"),
        ]))
        .unwrap();
        assert_eq!(config.local_storage_path(), Some("/tmp/cosdesk"));
    }
}
