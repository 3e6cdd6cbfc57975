//! cosdesk storage library
//!
//! Object storage collaborator used by the upload screen. It includes the
//! `ObjectStorage` trait and implementations for backend buckets and the local
//! filesystem.
//!
//! # Object key format
//!
//! Keys mirror the destination path chosen on the upload screen:
//!
//! - **Root path** (`/`): `{file_name}`
//! - **Nested path** (`/a/b/c`): `a/b/c/{file_name}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in
//! the `keys` module so all backends stay consistent.

#[cfg(feature = "storage-bucket")]
pub mod bucket;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "storage-bucket")]
pub use bucket::BucketStorage;
pub use cosdesk_core::StorageBackend;
pub use factory::create_storage;
pub use keys::object_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use traits::{ObjectStorage, StorageError, StorageResult, StoredObject};
