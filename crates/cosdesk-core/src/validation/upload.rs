use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::UploadEntry;

/// Versions start with `v` followed by word characters, dots or dashes.
pub const VERSION_PATTERN: &str = r"^v[A-Za-z0-9_.-]+$";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(VERSION_PATTERN).expect("version pattern is valid"));

pub fn is_valid_version(version: &str) -> bool {
    VERSION_RE.is_match(version)
}

/// Upload form submitted from the home screen.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UploadForm {
    #[validate(
        length(min = 1, message = "version is required"),
        regex(
            path = *VERSION_RE,
            message = "version must start with 'v' and may use '.' and '-' separators"
        )
    )]
    pub version: String,
    #[serde(default)]
    pub remark: Option<String>,
    #[validate(length(min = 1, message = "select at least one file"))]
    pub files: Vec<UploadEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn entry() -> UploadEntry {
        UploadEntry {
            name: "fw.bin".to_string(),
            size: 1,
            content_type: "application/octet-stream".to_string(),
            path: "/".to_string(),
        }
    }

    fn form(version: &str, files: Vec<UploadEntry>) -> UploadForm {
        UploadForm {
            version: version.to_string(),
            remark: None,
            files,
        }
    }

    #[test]
    fn accepts_prefixed_versions() {
        assert!(form("v1.0.0", vec![entry()]).validate().is_ok());
        assert!(form("v1.0-beta", vec![entry()]).validate().is_ok());
        assert!(form("v2_rc", vec![entry()]).validate().is_ok());
    }

    #[test]
    fn rejects_missing_prefix_and_empty() {
        let err = AppError::from(form("1.0.0", vec![entry()]).validate().unwrap_err());
        let fields: Vec<String> = err.field_messages().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["version".to_string()]);

        assert!(form("", vec![entry()]).validate().is_err());
        assert!(form("v", vec![entry()]).validate().is_err());
        assert!(form("v1 0", vec![entry()]).validate().is_err());
    }

    #[test]
    fn rejects_non_ascii_word_characters() {
        assert!(!is_valid_version("v1.0.é"));
    }

    #[test]
    fn requires_at_least_one_file() {
        let err = AppError::from(form("v1.0.0", vec![]).validate().unwrap_err());
        assert_eq!(
            err.field_messages(),
            vec![("files".to_string(), "select at least one file".to_string())]
        );
    }
}
