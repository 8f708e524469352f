//! Local filesystem providers
//!
//! File-list and directory listers, a filesystem fetcher, and completion by
//! delete, move or keep.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LocalCompletionMode;
use crate::error::{Error, FetchReason, Result};
use crate::types::{DocumentReference, FetchedContent};

use super::source::{finalize_listing, CompletionMarker, ContentFetcher, SourceLister};

/// Lists the paths in a newline-delimited file, in file order
pub struct FileListSource {
    list_path: PathBuf,
}

impl FileListSource {
    pub fn new(list_path: impl Into<PathBuf>) -> Self {
        Self {
            list_path: list_path.into(),
        }
    }
}

#[async_trait]
impl SourceLister for FileListSource {
    async fn list(&self) -> Result<Vec<DocumentReference>> {
        let raw = tokio::fs::read_to_string(&self.list_path).await.map_err(|e| {
            Error::Listing(format!(
                "Cannot read file list {}: {}",
                self.list_path.display(),
                e
            ))
        })?;

        let references = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(DocumentReference::local)
            .collect();

        Ok(finalize_listing(references))
    }

    fn name(&self) -> &str {
        "file-list"
    }
}

/// Recursively lists files under a directory whose extension is accepted
pub struct DirectorySource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    fn scan(&self) -> Result<Vec<DocumentReference>> {
        if !self.root.is_dir() {
            return Err(Error::Listing(format!(
                "Source directory {} does not exist",
                self.root.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| {
                Error::Listing(format!("Failed to scan {}: {}", self.root.display(), e))
            })?;
            if entry.file_type().is_file() && self.accepts(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        Ok(finalize_listing(
            paths.into_iter().map(DocumentReference::local).collect(),
        ))
    }
}

#[async_trait]
impl SourceLister for DirectorySource {
    async fn list(&self) -> Result<Vec<DocumentReference>> {
        let source = DirectorySource {
            root: self.root.clone(),
            extensions: self.extensions.clone(),
        };
        tokio::task::spawn_blocking(move || source.scan())
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        "directory"
    }
}

/// Reads local references from disk
#[derive(Debug, Default)]
pub struct LocalFetcher;

#[async_trait]
impl ContentFetcher for LocalFetcher {
    async fn fetch(&self, reference: &DocumentReference) -> Result<FetchedContent> {
        let path = reference.local_path().ok_or_else(|| {
            Error::fetch(&reference.id, FetchReason::Other, "not a local reference")
        })?;

        let data = tokio::fs::read(path).await.map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::NotFound => FetchReason::NotFound,
                ErrorKind::PermissionDenied => FetchReason::PermissionDenied,
                _ => FetchReason::Other,
            };
            Error::fetch(&reference.id, reason, e.to_string())
        })?;

        Ok(FetchedContent::new(data, reference.kind()))
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Retires processed local files
pub struct LocalCompletion {
    mode: LocalCompletionMode,
    done_dir: Option<PathBuf>,
}

impl LocalCompletion {
    pub fn new(mode: LocalCompletionMode, done_dir: Option<PathBuf>) -> Self {
        Self { mode, done_dir }
    }

    async fn move_into_done(&self, path: &Path, id: &str) -> Result<()> {
        let done_dir = self
            .done_dir
            .as_ref()
            .ok_or_else(|| Error::completion_mark(id, "no done directory configured"))?;

        tokio::fs::create_dir_all(done_dir)
            .await
            .map_err(|e| Error::completion_mark(id, e))?;

        let file_name = path
            .file_name()
            .ok_or_else(|| Error::completion_mark(id, "path has no file name"))?;
        let target = done_dir.join(file_name);

        if tokio::fs::rename(path, &target).await.is_err() {
            // rename fails across filesystems
            tokio::fs::copy(path, &target)
                .await
                .map_err(|e| Error::completion_mark(id, e))?;
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| Error::completion_mark(id, e))?;
        }

        tracing::debug!("Moved {} to {}", path.display(), target.display());
        Ok(())
    }
}

#[async_trait]
impl CompletionMarker for LocalCompletion {
    async fn mark_done(&self, reference: &DocumentReference) -> Result<()> {
        let path = reference
            .local_path()
            .ok_or_else(|| Error::completion_mark(&reference.id, "not a local reference"))?;

        match self.mode {
            LocalCompletionMode::Keep => Ok(()),
            LocalCompletionMode::Delete => tokio::fs::remove_file(path)
                .await
                .map_err(|e| Error::completion_mark(&reference.id, e)),
            LocalCompletionMode::Move => self.move_into_done(path, &reference.id).await,
        }
    }

    fn name(&self) -> &str {
        match self.mode {
            LocalCompletionMode::Delete => "local-delete",
            LocalCompletionMode::Move => "local-move",
            LocalCompletionMode::Keep => "local-keep",
        }
    }
}
