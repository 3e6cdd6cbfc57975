//! File kind detection and display helpers.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// How a staged file can be previewed, decided once from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Image,
    Video,
    Audio,
    Unsupported,
}

impl PreviewKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            PreviewKind::Image
        } else if mime.starts_with("video/") {
            PreviewKind::Video
        } else if mime.starts_with("audio/") {
            PreviewKind::Audio
        } else {
            PreviewKind::Unsupported
        }
    }

    /// Whether a local preview resource should be created for this kind.
    pub fn has_preview(self) -> bool {
        !matches!(self, PreviewKind::Unsupported)
    }
}

/// Icon fallback shown when no preview is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileIcon {
    Image,
    Video,
    Audio,
    Pdf,
    Generic,
}

impl FileIcon {
    pub fn from_mime(mime: &str) -> Self {
        match PreviewKind::from_mime(mime) {
            PreviewKind::Image => FileIcon::Image,
            PreviewKind::Video => FileIcon::Video,
            PreviewKind::Audio => FileIcon::Audio,
            PreviewKind::Unsupported if mime.eq_ignore_ascii_case("application/pdf") => {
                FileIcon::Pdf
            }
            PreviewKind::Unsupported => FileIcon::Generic,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileIcon::Image => "image",
            FileIcon::Video => "video",
            FileIcon::Audio => "audio",
            FileIcon::Pdf => "pdf",
            FileIcon::Generic => "file",
        }
    }
}

/// Human readable size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut scaled = bytes as f64;
    let mut exp = 0;
    while scaled >= 1024.0 && exp < SIZE_UNITS.len() - 1 {
        scaled /= 1024.0;
        exp += 1;
    }
    let rounded = format!("{:.2}", scaled);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[exp])
}

/// MIME type guessed from the file extension; unknown extensions are sent as
/// `application/octet-stream`.
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        // Videos
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        // Documents and archives
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

/// Table timestamp format; absent values render as `-`.
pub fn format_timestamp(value: Option<&DateTime<Utc>>) -> String {
    value
        .map(|v| v.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
