//! Service-side traits: remote parsing and schema-constrained extraction

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    DocumentReference, ExtractedRecord, ExtractionSchema, FetchedContent, IntermediateText,
};

/// Turns a fetched document into text through a remote service
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(
        &self,
        reference: &DocumentReference,
        content: &FetchedContent,
    ) -> Result<IntermediateText>;

    fn name(&self) -> &str;
}

/// Trait for schema-constrained structured extraction
///
/// Implementations:
/// - `LandingClient`: LandingAI extract endpoint
/// - `OpenAiClient`: chat completions with JSON output
///
/// Implementations retry rate-limited calls with the run's
/// [`RetryPolicy`](crate::retry::RetryPolicy) and return a record that already
/// passed [`ExtractionSchema::conform`].
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn extract(
        &self,
        text: &IntermediateText,
        schema: &ExtractionSchema,
    ) -> Result<ExtractedRecord>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
