//! Validation modules
//!
//! Form validation runs locally and never touches the network: a failing form
//! produces `AppError::Validation` with per-field messages.

pub mod auth;
pub mod upload;

pub use auth::{ChangePasswordForm, LoginForm, RegisterForm, ResetForm};
pub use upload::{is_valid_version, UploadForm, VERSION_PATTERN};

use validator::Validate;

use crate::error::AppResult;

/// Validate a form, mapping failures into `AppError::Validation`.
pub fn check<T: Validate>(form: &T) -> AppResult<()> {
    form.validate()?;
    Ok(())
}
