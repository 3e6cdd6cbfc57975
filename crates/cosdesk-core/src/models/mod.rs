//! Data models for the console
//!
//! Row shapes of the backend tables (`users`, `files`, `buckets`), the auth
//! session, and the filter/criteria objects emitted by the search forms.

mod bucket;
mod record;
mod session;
mod user;

// Re-export all models for convenient imports
pub use bucket::*;
pub use record::*;
pub use session::*;
pub use user::*;
