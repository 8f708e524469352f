//! Test doubles for driving the pipeline without network or disk sources

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use doc_extract::error::FetchReason;
use doc_extract::ingestion::LocalConverter;
use doc_extract::providers::{
    CompletionMarker, ContentFetcher, ExtractionClient, SourceLister,
};
use doc_extract::{
    ContentKind, Converter, DocumentReference, Error, ExtractedRecord, ExtractionSchema,
    FetchedContent, IntermediateText, PipelineDriver, Result,
};

pub fn lab_schema() -> ExtractionSchema {
    ExtractionSchema::from_value(json!({
        "type": "object",
        "properties": {
            "patient_name": {"type": "string"},
            "test_date": {"type": "string"}
        },
        "required": ["patient_name"]
    }))
    .unwrap()
}

/// Fixed listing of in-memory text documents
pub struct MemorySource {
    pub documents: Vec<(String, String)>,
    pub missing: HashSet<String>,
    pub fetch_delay: Option<Duration>,
}

impl MemorySource {
    pub fn new(documents: &[(&str, &str)]) -> Self {
        Self {
            documents: documents
                .iter()
                .map(|(id, body)| (id.to_string(), body.to_string()))
                .collect(),
            missing: HashSet::new(),
            fetch_delay: None,
        }
    }

    pub fn with_missing(mut self, id: &str) -> Self {
        self.missing.insert(id.to_string());
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }
}

#[async_trait]
impl SourceLister for MemorySource {
    async fn list(&self) -> Result<Vec<DocumentReference>> {
        Ok(self
            .documents
            .iter()
            .map(|(id, _)| DocumentReference::local(id.as_str()))
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl ContentFetcher for MemorySource {
    async fn fetch(&self, reference: &DocumentReference) -> Result<FetchedContent> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.missing.contains(&reference.id) {
            return Err(Error::fetch(&reference.id, FetchReason::NotFound, "no such document"));
        }
        let body = self
            .documents
            .iter()
            .find(|(id, _)| *id == reference.id)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| Error::fetch(&reference.id, FetchReason::NotFound, "unknown"))?;
        Ok(FetchedContent::new(body.into_bytes(), ContentKind::Text))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Listing that is never available
pub struct BrokenSource;

#[async_trait]
impl SourceLister for BrokenSource {
    async fn list(&self) -> Result<Vec<DocumentReference>> {
        Err(Error::Listing("folder unreachable".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Extraction stub: reads `Patient: <name>` from the text
#[derive(Default)]
pub struct PatientExtractor {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ExtractionClient for PatientExtractor {
    async fn extract(
        &self,
        text: &IntermediateText,
        schema: &ExtractionSchema,
    ) -> Result<ExtractedRecord> {
        self.calls.lock().unwrap().push(text.content.clone());
        if text.content.contains("RATE") {
            return Err(Error::RateLimitExceeded {
                service: "stub".to_string(),
                retries: 3,
            });
        }
        let name = text
            .content
            .lines()
            .find_map(|l| l.strip_prefix("Patient: "))
            .map(|n| json!(n.trim()))
            .unwrap_or(serde_json::Value::Null);
        schema.conform(json!({"patient_name": name}))
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-1"
    }
}

/// Records which references were marked done; can refuse some
#[derive(Default)]
pub struct RecordingMarker {
    pub done: Mutex<Vec<String>>,
    pub refuse: HashSet<String>,
}

impl RecordingMarker {
    pub fn refusing(id: &str) -> Self {
        Self {
            refuse: [id.to_string()].into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn done(&self) -> Vec<String> {
        self.done.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionMarker for RecordingMarker {
    async fn mark_done(&self, reference: &DocumentReference) -> Result<()> {
        if self.refuse.contains(&reference.id) {
            return Err(Error::completion_mark(&reference.id, "permission denied"));
        }
        self.done.lock().unwrap().push(reference.id.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn driver(
    source: Arc<MemorySource>,
    extractor: Arc<PatientExtractor>,
    marker: Arc<RecordingMarker>,
) -> PipelineDriver {
    PipelineDriver::new(
        source.clone(),
        source,
        Converter::Local(Arc::new(LocalConverter::default())),
        extractor,
        marker,
        Arc::new(lab_schema()),
    )
}
