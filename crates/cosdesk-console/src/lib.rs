//! cosdesk console layer
//!
//! Front-end independent state of the admin console: the session store, the
//! route guard, upload staging and submission, and the records and users
//! table screens.

pub mod context;
pub mod guard;
pub mod screens;
pub mod session;
pub mod upload;

pub use context::ConsoleContext;
pub use guard::{resolve, settle, Navigation, Route, Router};
pub use screens::{LatestFetch, RecordsScreen, UserRow, UsersScreen};
pub use session::{SessionState, SessionStore};
pub use upload::{
    FileHandle, FileItem, PreviewHandle, PreviewRegistry, StagedFiles, UploadProgress,
    UploadReport, UploadRequest, Uploader,
};
