//! Source-side traits: listing work items, fetching their bytes, marking them done

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::types::{DocumentReference, FetchedContent};

/// Produces the finite, ordered set of work items for a run
///
/// Implementations:
/// - `FileListSource`: newline-delimited list of paths
/// - `DirectorySource`: recursive scan filtered by extension
/// - `DriveStore`: files in a Google Drive folder
#[async_trait]
pub trait SourceLister: Send + Sync {
    /// List every reference to process
    ///
    /// An error here means the listing itself is unavailable and aborts the run.
    async fn list(&self) -> Result<Vec<DocumentReference>>;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Materializes the bytes behind a reference
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, reference: &DocumentReference) -> Result<FetchedContent>;

    fn name(&self) -> &str;
}

/// Transitions a fully processed source artifact into its done state
#[async_trait]
pub trait CompletionMarker: Send + Sync {
    /// Move, delete or otherwise retire the source artifact
    ///
    /// Only called after the item's row is durably written.
    async fn mark_done(&self, reference: &DocumentReference) -> Result<()>;

    fn name(&self) -> &str;
}

/// Drop editor lock files and repeated identifiers, keeping first occurrences
pub fn finalize_listing(references: Vec<DocumentReference>) -> Vec<DocumentReference> {
    let mut seen = HashSet::new();
    let before = references.len();

    let kept: Vec<DocumentReference> = references
        .into_iter()
        .filter(|r| !r.is_lock_file())
        .filter(|r| seen.insert(r.id.clone()))
        .collect();

    if kept.len() != before {
        tracing::debug!(
            "Listing reduced from {} to {} entries (lock files and duplicates)",
            before,
            kept.len()
        );
    }

    kept
}
