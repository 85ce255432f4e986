//! # upload: walk the output tree and put every regular file in the object store
//!
//! Traversal is an explicit stack of pending directories, each carrying the
//! forward-slash relative prefix of its files. Every regular file becomes a
//! [`FileEntry`] whose destination key is a pure function of the key prefix, the
//! project id and its relative path.
//!
//! Puts run with bounded parallelism. A failed read or put is recorded against that
//! file and the rest of the batch carries on; only a directory that cannot be listed
//! aborts the upload, because the tree can then no longer be covered exhaustively.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::UploadSettings;
use crate::contract::{PutObject, Uploader};

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
pub const NON_UTF8_NAME_REASON: &str = "non-UTF-8 file name";

/// A regular file discovered under the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Forward-slash separated, relative to the output directory root.
    pub relative_path: String,
    /// Some path segment is not valid UTF-8. `relative_path` is then only a lossy
    /// display form and cannot serve as a key.
    pub non_utf8_name: bool,
}

#[derive(Debug, Error)]
#[error("failed to list directory {}: {source}", path.display())]
pub struct WalkError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Joins key segments with `/` whatever the host separator is.
pub fn join_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// `{key_prefix}/{project_id}/{relative_path}`
pub fn destination_key(key_prefix: &str, project_id: &str, relative_path: &str) -> String {
    let project_root = join_key(key_prefix.trim_end_matches('/'), project_id);
    join_key(&project_root, relative_path)
}

/// Content type guessed from the file extension.
pub fn content_type_for(relative_path: &str) -> String {
    mime_guess::from_path(relative_path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

/// Every regular file under `root`, sorted by relative path.
///
/// Symlinks to files are uploaded as files; symlinked directories are not descended
/// into, so the walk is a strict parent-to-child traversal. Names that are not valid
/// UTF-8 are flagged rather than converted, so two such files never share a key.
pub fn collect_entries(root: &Path) -> Result<Vec<FileEntry>, WalkError> {
    let mut entries = Vec::new();
    let mut pending: Vec<(PathBuf, String, bool)> = vec![(root.to_path_buf(), String::new(), false)];

    while let Some((dir, prefix, parent_non_utf8)) = pending.pop() {
        let listing = fs::read_dir(&dir).map_err(|source| {
            error!(error = ?source, path = %dir.display(), "[UPLOAD][ERROR] Failed to list directory");
            WalkError {
                path: dir.clone(),
                source,
            }
        })?;

        for item in listing {
            let item = item.map_err(|source| WalkError {
                path: dir.clone(),
                source,
            })?;
            let path = item.path();
            let (name, non_utf8_name) = match item.file_name().into_string() {
                Ok(name) => (name, parent_non_utf8),
                Err(raw) => {
                    warn!(path = %path.display(), "[UPLOAD] File name is not valid UTF-8");
                    (raw.to_string_lossy().into_owned(), true)
                }
            };
            let relative = join_key(&prefix, &name);

            let file_type = match item.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    warn!(error = ?e, path = %path.display(), "[UPLOAD] Could not stat entry, skipping");
                    continue;
                }
            };

            if file_type.is_dir() {
                pending.push((path, relative, non_utf8_name));
            } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
                entries.push(FileEntry {
                    path,
                    relative_path: relative,
                    non_utf8_name,
                });
            } else {
                debug!(path = %path.display(), "[UPLOAD] Not a regular file, skipping");
            }
        }
    }

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(entries)
}

/// Terminal state of one file's upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    pub relative_path: String,
    pub key: String,
    pub content_type: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub relative_path: String,
    pub key: String,
    pub reason: String,
}

/// One record per file entry, sorted by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub records: Vec<UploadRecord>,
}

impl UploadReport {
    pub fn all_succeeded(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.outcome == FileOutcome::Succeeded)
    }

    pub fn succeeded_keys(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.outcome == FileOutcome::Succeeded)
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn failed(&self) -> Vec<FailedUpload> {
        self.records
            .iter()
            .filter_map(|r| match &r.outcome {
                FileOutcome::Failed { reason } => Some(FailedUpload {
                    relative_path: r.relative_path.clone(),
                    key: r.key.clone(),
                    reason: reason.clone(),
                }),
                FileOutcome::Succeeded => None,
            })
            .collect()
    }
}

/// Uploads every regular file under `output_dir` to `bucket`.
///
/// Returns only after every entry has reached a terminal outcome.
pub async fn upload_tree<U>(
    uploader: &U,
    bucket: &str,
    output_dir: &Path,
    project_id: &str,
    settings: &UploadSettings,
) -> Result<UploadReport, WalkError>
where
    U: Uploader + ?Sized,
{
    let root = output_dir.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || collect_entries(&root))
        .await
        .map_err(|e| WalkError {
            path: output_dir.to_path_buf(),
            source: std::io::Error::other(e),
        })??;
    let concurrency = settings.concurrency.max(1);
    info!(
        files = entries.len(),
        concurrency,
        root = %output_dir.display(),
        "[UPLOAD] Starting tree upload"
    );

    let mut records: Vec<UploadRecord> = stream::iter(entries)
        .map(|entry| upload_entry(uploader, bucket, project_id, &settings.key_prefix, entry))
        .buffer_unordered(concurrency)
        .collect()
        .await;
    records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let report = UploadReport { records };
    let failed = report.failed().len();
    if failed == 0 {
        info!(files = report.records.len(), "[UPLOAD] All files uploaded");
    } else {
        error!(
            files = report.records.len(),
            failed,
            "[UPLOAD][ERROR] Tree upload finished with failures"
        );
    }
    Ok(report)
}

async fn upload_entry<U>(
    uploader: &U,
    bucket: &str,
    project_id: &str,
    key_prefix: &str,
    entry: FileEntry,
) -> UploadRecord
where
    U: Uploader + ?Sized,
{
    let key = destination_key(key_prefix, project_id, &entry.relative_path);
    let content_type = content_type_for(&entry.relative_path);

    if entry.non_utf8_name {
        error!(path = %entry.path.display(), "[UPLOAD][ERROR] Refusing to derive a key from a non-UTF-8 name");
        return UploadRecord {
            relative_path: entry.relative_path,
            key,
            content_type,
            outcome: FileOutcome::Failed {
                reason: NON_UTF8_NAME_REASON.to_string(),
            },
        };
    }

    let outcome = match tokio::fs::read(&entry.path).await {
        Ok(content) => {
            let size = content.len();
            let object = PutObject {
                bucket: bucket.to_string(),
                key: key.clone(),
                content: Bytes::from(content),
                content_type: content_type.clone(),
            };
            match uploader.put(object).await {
                Ok(()) => {
                    info!(key = %key, content_type = %content_type, size, "[UPLOAD] Uploaded file");
                    FileOutcome::Succeeded
                }
                Err(e) => {
                    error!(key = %key, error = %e, "[UPLOAD][ERROR] Put failed");
                    FileOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        }
        Err(e) => {
            error!(path = %entry.path.display(), error = ?e, "[UPLOAD][ERROR] Failed to read file");
            FileOutcome::Failed {
                reason: format!("failed to read {}: {e}", entry.path.display()),
            }
        }
    };

    UploadRecord {
        relative_path: entry.relative_path,
        key,
        content_type,
        outcome,
    }
}
