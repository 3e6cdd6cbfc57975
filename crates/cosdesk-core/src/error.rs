//! Error types module
//!
//! All failures surfaced by the console are unified under `AppError`. The
//! variants follow the console's error taxonomy:
//!
//! - validation errors are local and field-scoped, they never reach the network;
//! - backend errors come from the row/storage API and are reported as toasts;
//! - cancellations are silent;
//! - authentication errors are reported and block navigation.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures or cancellations
    Debug,
    /// Warning level - for recoverable issues reported to the user
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Describes how an error should be presented to the operator.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "BACKEND_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether the failure is worth retrying by re-issuing the action
    fn is_recoverable(&self) -> bool;

    /// Whether the error should be pushed to the toast surface
    fn is_user_visible(&self) -> bool;

    /// Message shown to the operator
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// `{error}` half of a `{data, error}` response from the backend.
    #[error("{message}")]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    #[error("{0}")]
    Auth(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Build a backend error carrying only a status and message.
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        AppError::Backend {
            status,
            code: None,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// Per-field messages for a validation failure, sorted by field name.
    ///
    /// Returns an empty list for every other variant.
    pub fn field_messages(&self) -> Vec<(String, String)> {
        let AppError::Validation(errors) = self else {
            return Vec::new();
        };

        let mut out: Vec<(String, String)> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    (field.to_string(), message)
                })
            })
            .collect();
        out.sort();
        out
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, user_visible, log_level).
fn app_error_static_metadata(err: &AppError) -> (&'static str, bool, bool, LogLevel) {
    match err {
        AppError::Validation(_) => ("VALIDATION_ERROR", false, false, LogLevel::Debug),
        AppError::Backend { status, .. } if *status >= 500 => {
            ("BACKEND_ERROR", true, true, LogLevel::Error)
        }
        AppError::Backend { .. } => ("BACKEND_ERROR", false, true, LogLevel::Warn),
        AppError::Auth(_) => ("AUTH_ERROR", false, true, LogLevel::Warn),
        AppError::Cancelled => ("CANCELLED", false, false, LogLevel::Debug),
        AppError::Unauthorized(_) => ("UNAUTHORIZED", false, true, LogLevel::Warn),
        AppError::Forbidden(_) => ("FORBIDDEN", false, true, LogLevel::Warn),
        AppError::NotFound(_) => ("NOT_FOUND", false, true, LogLevel::Debug),
        AppError::Transport(_) => ("NETWORK_ERROR", true, true, LogLevel::Warn),
        AppError::Storage(_) => ("STORAGE_ERROR", true, true, LogLevel::Error),
        AppError::Config(_) => ("CONFIG_ERROR", false, true, LogLevel::Error),
        AppError::InvalidInput(_) => ("INVALID_INPUT", false, true, LogLevel::Debug),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            ("INTERNAL_ERROR", false, true, LogLevel::Error)
        }
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn is_user_visible(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Backend { message, .. } => message.clone(),
            AppError::Auth(msg) => msg.clone(),
            AppError::InternalWithSource { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "name is required"))]
        name: String,
    }

    #[test]
    fn test_backend_error_metadata() {
        let err = AppError::Backend {
            status: 400,
            code: Some("22P02".to_string()),
            message: "invalid input syntax for type uuid".to_string(),
            details: None,
            hint: None,
        };
        assert_eq!(err.error_code(), "BACKEND_ERROR");
        assert!(err.is_user_visible());
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "invalid input syntax for type uuid");
        assert_eq!(err.to_string(), "invalid input syntax for type uuid");
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_server_side_backend_error_is_recoverable() {
        let err = AppError::backend(503, "upstream unavailable");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_cancellation_is_silent() {
        let err = AppError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_user_visible());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_validation_field_messages() {
        let probe = Probe {
            name: String::new(),
        };
        let err = AppError::from(probe.validate().unwrap_err());
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!err.is_user_visible());
        assert_eq!(
            err.field_messages(),
            vec![("name".to_string(), "name is required".to_string())]
        );
    }

    #[test]
    fn test_field_messages_empty_for_other_variants() {
        assert!(AppError::Auth("bad password".into())
            .field_messages()
            .is_empty());
    }
}
