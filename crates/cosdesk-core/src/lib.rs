//! cosdesk core library
//!
//! Domain models, the error taxonomy, configuration and form validation shared
//! by the storage, client, console and CLI crates.

pub mod config;
pub mod error;
pub mod files;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult, ErrorMetadata, LogLevel};
pub use files::{content_type_for, format_file_size, format_timestamp, FileIcon, PreviewKind};
pub use storage_types::StorageBackend;
