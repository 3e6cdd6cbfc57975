//! Helpers shared by the `cosdesk` binary: tracing setup, the toast printer,
//! session persistence and table rendering.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use cosdesk_client::{Notifier, Toast, ToastLevel};
use cosdesk_console::UserRow;
use cosdesk_core::models::{Session, UploadRecord};
use cosdesk_core::{format_file_size, format_timestamp};

const PASSWORD_ENV: &str = "COSDESK_PASSWORD";

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Initialize tracing for the CLI. Logs go to stderr so table output on stdout stays clean.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

/// Prints toasts to stderr and records them in the log.
///
/// Clones share the record of the last error toast, so the binary can tell
/// whether a failure has already been shown.
#[derive(Debug, Clone, Default)]
pub struct StderrNotifier {
    last_error: Arc<Mutex<Option<String>>>,
}

impl StderrNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message of the most recent error toast.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Print `message` as an error toast unless it is the one shown last.
    /// Returns whether anything was printed.
    pub fn ensure_shown(&self, message: &str) -> bool {
        if self.last_error().as_deref() == Some(message) {
            return false;
        }
        self.error(message);
        true
    }
}

impl Notifier for StderrNotifier {
    fn notify(&self, toast: Toast) {
        let tag = match toast.level {
            ToastLevel::Error => "error",
            ToastLevel::Success => "ok",
            ToastLevel::Info => "info",
        };
        tracing::debug!(level = tag, message = %toast.message, "toast");
        eprintln!("[{}] {}", tag, toast.message);
        if toast.level == ToastLevel::Error {
            *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(toast.message);
        }
    }
}

pub fn load_session(path: &Path) -> anyhow::Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file {}", path.display()))?;
    match serde_json::from_str::<Session>(&raw) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
            Ok(None)
        }
    }
}

/// Write the session, or remove the file when signed out.
pub fn save_session(path: &Path, session: Option<&Session>) -> anyhow::Result<()> {
    let Some(session) = session else {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove session file {}", path.display()))?;
        }
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(session).context("Serialize session")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write session file {}", path.display()))?;
    Ok(())
}

/// Password from `COSDESK_PASSWORD`, else one line of stdin.
pub fn read_password(prompt: &str) -> anyhow::Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    read_secret(prompt)
}

pub fn read_secret(prompt: &str) -> anyhow::Result<String> {
    eprint!("{}: ", prompt);
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn render(header: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |cells: Vec<String>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(header.iter().map(|h| h.to_string()).collect())];
    out.extend(rows.into_iter().map(line));
    out.join("\n")
}

pub fn records_table(records: &[UploadRecord]) -> String {
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.version.clone(),
                truncate_string(&r.file_name, 32),
                format_file_size(r.file_size),
                r.status.to_string(),
                r.upload_user.clone(),
                format_timestamp(Some(&r.upload_time)),
                r.audit_user.clone().unwrap_or_else(|| "-".to_string()),
                format_timestamp(r.audit_time.as_ref()),
            ]
        })
        .collect();
    render(
        &[
            "ID", "VERSION", "FILE", "SIZE", "STATUS", "UPLOADER", "UPLOADED", "AUDITOR",
            "AUDITED",
        ],
        rows,
    )
}

pub fn users_table(users: &[UserRow]) -> String {
    let rows = users
        .iter()
        .map(|row| {
            let buckets = if row.buckets.is_empty() {
                "-".to_string()
            } else {
                row.buckets.join(",")
            };
            vec![
                row.user.id.to_string(),
                row.user.name.clone().unwrap_or_else(|| "-".to_string()),
                row.user.email.clone(),
                row.user.role.to_string(),
                row.user.status.to_string(),
                truncate_string(&buckets, 40),
                format_timestamp(Some(&row.user.created_at)),
            ]
        })
        .collect();
    render(
        &["ID", "NAME", "EMAIL", "ROLE", "STATUS", "BUCKETS", "CREATED"],
        rows,
    )
}
