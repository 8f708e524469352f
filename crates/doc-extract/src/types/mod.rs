//! Core types for the extraction pipeline

pub mod document;
pub mod record;
pub mod summary;

pub use document::{
    ContentKind, DocumentReference, FetchedContent, IntermediateText, SourceLocation, TextFormat,
};
pub use record::{ExtractedRecord, ExtractionSchema, ResultRow};
pub use summary::{ItemReport, ItemState, RunSummary};
