//! Artifact reconciler: removes non-media files from a download target
//!
//! Runs once after the fetcher has finished writing. Only direct entries of
//! the target directory are considered; subdirectories are never entered.
//! A file that cannot be deleted is recorded and the scan moves on.

use crate::error::{Error, ReconciliationFileError, Result};
use crate::fs::Filesystem;
use crate::types::{DownloadTarget, Event};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Ordered set of filename suffixes that mark a file as disposable
///
/// Matching is exact and case-sensitive against the whole file name, so
/// `.json.xz` matches `post.json.xz` but not `post.JSON.XZ`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionPolicy {
    suffixes: Vec<String>,
}

impl RetentionPolicy {
    /// Build a policy from suffixes, keeping their order
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suffixes: suffixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Configured suffixes in policy order
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// First suffix that `file_name` ends with, if any
    pub fn matching_suffix(&self, file_name: &str) -> Option<&str> {
        self.suffixes
            .iter()
            .find(|suffix| !suffix.is_empty() && file_name.ends_with(suffix.as_str()))
            .map(String::as_str)
    }

    /// Whether `file_name` should be removed
    pub fn is_unwanted(&self, file_name: &str) -> bool {
        self.matching_suffix(file_name).is_some()
    }
}

impl Default for RetentionPolicy {
    /// Captions, archives and compressed metadata
    fn default() -> Self {
        Self::new([".txt", ".zip", ".json.xz"])
    }
}

/// What one reconcile pass did
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Files that were deleted, in name order
    pub removed: Vec<PathBuf>,
    /// Files that matched but could not be deleted
    pub failed: Vec<ReconciliationFileError>,
}

impl ReconcileReport {
    /// True when every matching file was deleted
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every regular file directly inside `target` whose name matches `policy`
///
/// Fails with [`Error::NotADirectory`] if `target` is missing or not a
/// directory, and with [`Error::Io`] if it cannot be listed. Per-file delete
/// failures are collected in [`ReconcileReport::failed`] and never abort the pass.
pub async fn reconcile(
    fs: &dyn Filesystem,
    target: &DownloadTarget,
    policy: &RetentionPolicy,
    event_tx: &broadcast::Sender<Event>,
) -> Result<ReconcileReport> {
    let dir = target.path();

    if !fs.is_directory(dir).await {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }

    debug!(?dir, suffixes = ?policy.suffixes(), "reconciling download target");

    let mut entries = fs.list_directory_entries(dir).await?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut report = ReconcileReport::default();

    for entry in entries {
        if !entry.is_file || !policy.is_unwanted(&entry.name) {
            continue;
        }

        match fs.delete_file(&entry.path).await {
            Ok(()) => {
                debug!(path = ?entry.path, "removed non-media file");
                event_tx
                    .send(Event::FileRemoved {
                        path: entry.path.clone(),
                    })
                    .ok();
                report.removed.push(entry.path);
            }
            Err(e) => {
                warn!(path = ?entry.path, error = %e, "failed to remove file");
                event_tx
                    .send(Event::FileRemovalFailed {
                        path: entry.path.clone(),
                        error: e.to_string(),
                    })
                    .ok();
                report
                    .failed
                    .push(ReconciliationFileError::from_io(entry.path, &e));
            }
        }
    }

    info!(
        ?dir,
        removed = report.removed.len(),
        failed = report.failed.len(),
        "reconcile complete"
    );
    event_tx
        .send(Event::CleanupComplete {
            removed: report.removed.len(),
            failed: report.failed.len(),
        })
        .ok();

    Ok(report)
}
