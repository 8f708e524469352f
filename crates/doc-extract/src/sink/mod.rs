//! Durable output for extracted rows

pub mod csv_sink;
pub mod merge;

pub use csv_sink::CsvFileSink;
pub use merge::{collect_csv_files, merge_results, MergeReport};

use crate::error::{Error, Result};
use crate::types::ResultRow;

/// Append-only destination for result rows
///
/// The header is written exactly once per destination, when it is prepared
/// empty; every appended row is durable before `append` returns.
pub trait ResultSink: Send {
    /// Open the destination; called once, after a non-empty listing
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Durably append one row
    fn append(&mut self, row: &ResultRow) -> Result<()>;

    /// Human-readable destination
    fn destination(&self) -> String;

    /// Rows appended by this sink instance
    fn rows_written(&self) -> usize;
}

/// In-memory sink, mainly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Vec<ResultRow>,
    header_writes: usize,
    prepared: bool,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every append after `rows` successful ones
    pub fn failing_after(rows: usize) -> Self {
        Self {
            fail_after: Some(rows),
            ..Self::default()
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Number of times the header was emitted
    pub fn header_writes(&self) -> usize {
        self.header_writes
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }
}

impl ResultSink for MemorySink {
    fn prepare(&mut self) -> Result<()> {
        if !self.prepared {
            self.prepared = true;
            self.header_writes += 1;
        }
        Ok(())
    }

    fn append(&mut self, row: &ResultRow) -> Result<()> {
        self.prepare()?;
        if self.fail_after.is_some_and(|limit| self.rows.len() >= limit) {
            return Err(Error::sink_write(self.destination(), "write rejected"));
        }
        self.rows.push(row.clone());
        Ok(())
    }

    fn destination(&self) -> String {
        "memory".to_string()
    }

    fn rows_written(&self) -> usize {
        self.rows.len()
    }
}
