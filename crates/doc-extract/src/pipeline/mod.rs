//! Batch run orchestration

pub mod driver;
pub mod setup;

pub use driver::{Converter, NoopObserver, PipelineDriver, RunObserver};
pub use setup::{build_pipeline, build_source, SourceParts};
