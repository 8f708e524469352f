//! doc-extract: batch document ingestion into structured records
//!
//! A run lists documents from a source (a file list, a directory, or a Google
//! Drive folder), fetches each one, converts it to text, asks an extraction
//! service for a record matching a JSON schema, appends the record to a CSV
//! file, and finally marks the source document as done. Failures are isolated
//! per document; only an unavailable listing or an unwritable output stops
//! the run.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod sink;
pub mod types;

pub use config::{Credentials, PipelineConfig};
pub use error::{Error, FailureKind, ItemFailure, Result};
pub use pipeline::{build_pipeline, Converter, NoopObserver, PipelineDriver, RunObserver};
pub use retry::RetryPolicy;
pub use sink::{CsvFileSink, MemorySink, ResultSink};
pub use types::{
    ContentKind, DocumentReference, ExtractedRecord, ExtractionSchema, FetchedContent,
    IntermediateText, ItemReport, ItemState, ResultRow, RunSummary,
};
