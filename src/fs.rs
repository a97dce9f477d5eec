//! Filesystem boundary used by the fetcher and the reconciler

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

/// A direct entry of a directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// File name (last path component)
    pub name: String,
    /// Full path of the entry
    pub path: PathBuf,
    /// True for regular files, false for directories, symlinks and others
    pub is_file: bool,
}

/// Directory and file operations the pipeline needs
///
/// [`LocalFilesystem`] is the real implementation; the seam exists so callers
/// can observe or fail individual operations.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Create `path` and its parents if missing; succeeds if it already exists
    async fn ensure_directory(&self, path: &Path) -> io::Result<()>;

    /// Whether `path` exists and is a directory
    async fn is_directory(&self, path: &Path) -> bool;

    /// Direct entries of `path` (not recursive), in no particular order
    async fn list_directory_entries(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;

    /// Delete a single file
    async fn delete_file(&self, path: &Path) -> io::Result<()>;
}

/// [`Filesystem`] backed by `tokio::fs`
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFilesystem;

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn ensure_directory(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn is_directory(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn list_directory_entries(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut out = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            // file_type() does not follow symlinks
            let is_file = match entry.file_type().await {
                Ok(ft) => ft.is_file(),
                Err(_) => continue,
            };
            out.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                is_file,
            });
        }

        Ok(out)
    }

    async fn delete_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}
