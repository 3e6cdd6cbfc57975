//! Upload staging and submission.
//!
//! [`StagedFiles`] owns the files picked on the upload screen together with
//! their destination paths and previews. Previews are owned handles released
//! exactly once when dropped, whether by removal, successful submission or
//! teardown of the staging area. [`Uploader`] pushes a validated
//! [`UploadRequest`] to object storage and records each stored file as a
//! pending [`UploadRecord`].

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use cosdesk_client::ConsoleApi;
use cosdesk_core::models::{NewUploadRecord, RecordStatus, UploadEntry, UploadRecord};
use cosdesk_core::validation::{self, UploadForm};
use cosdesk_core::{content_type_for, AppError, AppResult, ErrorMetadata, FileIcon, PreviewKind};
use cosdesk_storage::{object_key, ObjectStorage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_PATH: &str = "/";

/// File picked by the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub data: Bytes,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            size: data.len() as u64,
            content_type: content_type.into(),
            data,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> AppResult<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::InvalidInput(format!("not a file: {}", path.display())))?
            .to_string();
        let data = tokio::fs::read(path).await.map_err(|e| {
            AppError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let content_type = content_type_for(&name);
        Ok(Self::new(name, content_type, Bytes::from(data)))
    }
}

#[derive(Debug, Default)]
struct PreviewCounters {
    next_id: AtomicU64,
    live: AtomicUsize,
    released: AtomicUsize,
}

/// Issues preview handles and counts the ones still alive.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    counters: Arc<PreviewCounters>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a preview when the file kind supports one.
    pub fn create(&self, file: &FileHandle) -> Option<PreviewHandle> {
        let kind = PreviewKind::from_mime(&file.content_type);
        if !kind.has_preview() {
            return None;
        }
        let id = self.counters.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Some(PreviewHandle {
            id,
            kind,
            url: format!("preview://{}/{}", id, file.name),
            counters: Arc::clone(&self.counters),
        })
    }

    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }
}

/// Local preview resource; released when dropped.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    kind: PreviewKind,
    url: String,
    counters: Arc<PreviewCounters>,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> PreviewKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(preview = self.id, "Preview released");
    }
}

/// A staged file with its destination path.
#[derive(Debug)]
pub struct FileItem {
    pub id: Uuid,
    pub file: FileHandle,
    pub path: String,
    pub preview: Option<PreviewHandle>,
}

impl FileItem {
    pub fn preview_kind(&self) -> PreviewKind {
        PreviewKind::from_mime(&self.file.content_type)
    }

    pub fn icon(&self) -> FileIcon {
        FileIcon::from_mime(&self.file.content_type)
    }

    fn entry(&self) -> UploadEntry {
        UploadEntry {
            name: self.file.name.clone(),
            size: self.file.size,
            content_type: self.file.content_type.clone(),
            path: self.path.clone(),
        }
    }
}

/// Validated payload handed to the uploader.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub version: String,
    pub remark: Option<String>,
    pub entries: Vec<UploadEntry>,
    pub files: Vec<FileHandle>,
}

/// Files staged on the upload screen.
#[derive(Debug)]
pub struct StagedFiles {
    items: Vec<FileItem>,
    previews: PreviewRegistry,
    quick_paths: Vec<String>,
}

impl StagedFiles {
    pub fn new(previews: PreviewRegistry, quick_paths: Vec<String>) -> Self {
        Self {
            items: Vec::new(),
            previews,
            quick_paths,
        }
    }

    /// Stage files at the default path; returns the new item ids.
    pub fn stage(&mut self, files: Vec<FileHandle>) -> Vec<Uuid> {
        files
            .into_iter()
            .map(|file| {
                let id = Uuid::new_v4();
                let preview = self.previews.create(&file);
                tracing::debug!(file = %file.name, size = file.size, "File staged");
                self.items.push(FileItem {
                    id,
                    file,
                    path: DEFAULT_PATH.to_string(),
                    preview,
                });
                id
            })
            .collect()
    }

    /// Remove an item, releasing its preview. Unknown ids are ignored.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        before != self.items.len()
    }

    pub fn set_path(&mut self, id: Uuid, path: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.path = path.to_string();
                true
            }
            None => false,
        }
    }

    /// Point every staged item at `path`.
    pub fn apply_quick_path(&mut self, path: &str) {
        for item in &mut self.items {
            item.path = path.to_string();
        }
    }

    pub fn quick_paths(&self) -> &[String] {
        &self.quick_paths
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[FileItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.items.iter().map(|item| item.file.size).sum()
    }

    /// Validate the form and hand over the staged files.
    ///
    /// On failure nothing is consumed; on success every preview is released.
    pub fn submit(&mut self, version: &str, remark: Option<&str>) -> AppResult<UploadRequest> {
        let form = UploadForm {
            version: version.trim().to_string(),
            remark: remark
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            files: self.items.iter().map(FileItem::entry).collect(),
        };
        validation::check(&form)?;

        let files = self.items.drain(..).map(|item| item.file).collect();
        Ok(UploadRequest {
            version: form.version,
            remark: form.remark,
            entries: form.files,
            files,
        })
    }
}

/// Per-file progress of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadProgress {
    Started { name: String, key: String },
    Finished { name: String, url: String },
    Failed { name: String, error: String },
}

/// Outcome of a submission: recorded files and per-file failures.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub records: Vec<UploadRecord>,
    pub failed: Vec<(String, String)>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Uploader {
    storage: Arc<dyn ObjectStorage>,
    api: ConsoleApi,
}

impl Uploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, api: ConsoleApi) -> Self {
        Self { storage, api }
    }

    /// Store every file, then record the stored ones as pending uploads by `uploader`.
    ///
    /// Failed files are reported and listed in the report, not retried. When the
    /// records cannot be inserted, or the upload is cancelled, the objects
    /// already stored are deleted again before the error is returned.
    pub async fn upload(
        &self,
        request: UploadRequest,
        uploader: &str,
        progress: Option<mpsc::UnboundedSender<UploadProgress>>,
        signal: Option<&CancellationToken>,
    ) -> AppResult<UploadReport> {
        let emit = |event: UploadProgress| {
            if let Some(tx) = &progress {
                // The listener may have gone away.
                let _ = tx.send(event);
            }
        };

        if let Some(token) = self.api.client().access_token() {
            self.storage.set_access_token(Some(token));
        }

        let mut report = UploadReport::default();
        let mut stored = Vec::new();
        let mut stored_keys = Vec::new();

        for (entry, file) in request.entries.iter().zip(request.files) {
            if signal.map(CancellationToken::is_cancelled).unwrap_or(false) {
                self.discard(&stored_keys).await;
                return Err(AppError::Cancelled);
            }

            let key = match object_key(&entry.path, &entry.name) {
                Ok(key) => key,
                Err(e) => {
                    self.fail(&mut report, &emit, &entry.name, AppError::from(e));
                    continue;
                }
            };
            emit(UploadProgress::Started {
                name: entry.name.clone(),
                key: key.clone(),
            });

            let upload = self.storage.upload(&key, &entry.content_type, file.data);
            let result = match signal {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        self.discard(&stored_keys).await;
                        return Err(AppError::Cancelled);
                    }
                    result = upload => result,
                },
                None => upload.await,
            };

            match result {
                Ok(object) => {
                    stored_keys.push(object.key.clone());
                    emit(UploadProgress::Finished {
                        name: entry.name.clone(),
                        url: object.url.clone(),
                    });
                    stored.push(NewUploadRecord {
                        version: request.version.clone(),
                        file_name: entry.name.clone(),
                        file_type: entry.content_type.clone(),
                        file_size: entry.size,
                        file_url: Some(object.url),
                        status: RecordStatus::Pending,
                        upload_user: uploader.to_string(),
                        upload_time: Utc::now(),
                    });
                }
                Err(e) => self.fail(&mut report, &emit, &entry.name, AppError::from(e)),
            }
        }

        report.records = match self.api.insert_records(&stored, signal).await {
            Ok(records) => records,
            Err(err) => {
                self.discard(&stored_keys).await;
                return Err(err);
            }
        };
        tracing::info!(
            version = %request.version,
            remark = request.remark.as_deref().unwrap_or(""),
            stored = report.records.len(),
            failed = report.failed.len(),
            "Upload finished"
        );
        Ok(report)
    }

    /// Remove objects stored by an attempt that produced no records, so a
    /// retry does not collide with them.
    async fn discard(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(key = %key, error = %e, "Failed to remove unrecorded object");
            }
        }
        if !keys.is_empty() {
            tracing::info!(objects = keys.len(), "Removed objects of an unrecorded upload");
        }
    }

    fn fail(
        &self,
        report: &mut UploadReport,
        emit: &impl Fn(UploadProgress),
        name: &str,
        err: AppError,
    ) {
        tracing::warn!(file = %name, error = %err, "File upload failed");
        self.api.gateway().report(&err);
        emit(UploadProgress::Failed {
            name: name.to_string(),
            error: err.client_message(),
        });
        report.failed.push((name.to_string(), err.client_message()));
    }
}
