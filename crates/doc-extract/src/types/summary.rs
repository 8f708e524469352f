//! Per-item progress states and the run summary

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::ItemFailure;

/// Pipeline state of one item
///
/// Items advance `Listed → Fetched → Converted → Extracted → Recorded →
/// Completed`; any stage failure moves them to `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Listed,
    Fetched,
    Converted,
    Extracted,
    Recorded,
    Completed,
    Skipped,
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Listed => "listed",
            Self::Fetched => "fetched",
            Self::Converted => "converted",
            Self::Extracted => "extracted",
            Self::Recorded => "recorded",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// What happened to one item
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// Identifier of the originating reference
    pub id: String,
    /// Display name of the originating reference
    pub name: String,
    /// Terminal state
    pub state: ItemState,
    /// Last state reached before a skip
    pub failed_after: Option<ItemState>,
    /// Cause of a skip
    pub failure: Option<ItemFailure>,
    /// Completion marking failed after the row was recorded
    pub completion_warning: Option<ItemFailure>,
    /// Recorded JSON, for successful items
    pub record_json: Option<String>,
    /// Wall time spent on the item
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ItemReport {
    pub fn succeeded(&self) -> bool {
        self.state == ItemState::Completed
    }
}

/// Final counts of a run; built once and never changed afterwards
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    listed: usize,
    attempted: usize,
    succeeded: usize,
    failed: usize,
    completion_failures: usize,
    interrupted: bool,
    destination: Option<String>,
    items: Vec<ItemReport>,
}

impl RunSummary {
    /// Summary for a run with nothing to process
    pub fn empty() -> Self {
        Self::from_reports(0, Vec::new(), None, false)
    }

    /// Tally finished item reports
    pub fn from_reports(
        listed: usize,
        items: Vec<ItemReport>,
        destination: Option<String>,
        interrupted: bool,
    ) -> Self {
        let succeeded = items.iter().filter(|r| r.succeeded()).count();
        let failed = items
            .iter()
            .filter(|r| r.state == ItemState::Skipped)
            .count();
        let completion_failures = items
            .iter()
            .filter(|r| r.completion_warning.is_some())
            .count();

        Self {
            listed,
            attempted: items.len(),
            succeeded,
            failed,
            completion_failures,
            interrupted,
            destination,
            items,
        }
    }

    pub fn listed(&self) -> usize {
        self.listed
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Items recorded but not marked done
    pub fn completion_failures(&self) -> usize {
        self.completion_failures
    }

    /// The run stopped before every listed item was attempted
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Output destination, when anything was written
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn items(&self) -> &[ItemReport] {
        &self.items
    }

    /// Reports of skipped items
    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| r.state == ItemState::Skipped)
    }

    /// Reports of recorded items
    pub fn successes(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| r.succeeded())
    }
}
