//! Pipeline driver: list, then fetch → convert → extract → record → mark done per item
//!
//! Items are isolated from each other: any per-item failure is recorded and
//! the run moves on. Only listing and sink failures abort the run. Rows are
//! recorded in listing order even when several items are prepared
//! concurrently, and an item is marked done only after its row is durable.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, FailureKind, ItemFailure, Result, StageError};
use crate::ingestion::FormatConverter;
use crate::providers::{
    CompletionMarker, ContentFetcher, DocumentParser, ExtractionClient, SourceLister,
};
use crate::sink::ResultSink;
use crate::types::{
    DocumentReference, ExtractedRecord, ExtractionSchema, ItemReport, ItemState, ResultRow,
    RunSummary,
};

/// How fetched bytes become text
#[derive(Clone)]
pub enum Converter {
    /// Convert in-process
    Local(Arc<dyn FormatConverter>),
    /// Let the extraction service parse the document
    Remote(Arc<dyn DocumentParser>),
}

impl Converter {
    fn label(&self) -> &str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(parser) => parser.name(),
        }
    }
}

/// Progress callbacks for a run
pub trait RunObserver: Send + Sync {
    /// The listing produced `total` items
    fn on_listed(&self, _total: usize) {}

    /// Item `position` (1-based) of `total` advanced to a non-skipped state
    fn on_state(
        &self,
        _position: usize,
        _total: usize,
        _reference: &DocumentReference,
        _state: ItemState,
    ) {
    }

    /// Item `position` (1-based) of `total` reached a terminal state
    fn on_item(&self, _position: usize, _total: usize, _report: &ItemReport) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Result of the concurrent part of an item: fetch, convert, extract
struct PreparedItem {
    position: usize,
    reference: DocumentReference,
    started: Instant,
    outcome: std::result::Result<ExtractedRecord, (ItemState, Error)>,
}

/// Drives one batch run over a source
pub struct PipelineDriver {
    lister: Arc<dyn SourceLister>,
    fetcher: Arc<dyn ContentFetcher>,
    converter: Converter,
    extractor: Arc<dyn ExtractionClient>,
    marker: Arc<dyn CompletionMarker>,
    schema: Arc<ExtractionSchema>,
    parallel_items: usize,
}

impl PipelineDriver {
    pub fn new(
        lister: Arc<dyn SourceLister>,
        fetcher: Arc<dyn ContentFetcher>,
        converter: Converter,
        extractor: Arc<dyn ExtractionClient>,
        marker: Arc<dyn CompletionMarker>,
        schema: Arc<ExtractionSchema>,
    ) -> Self {
        Self {
            lister,
            fetcher,
            converter,
            extractor,
            marker,
            schema,
            parallel_items: 1,
        }
    }

    /// Prepare up to `n` items concurrently; recording stays sequential
    pub fn with_parallel_items(mut self, n: usize) -> Self {
        self.parallel_items = n.max(1);
        self
    }

    pub fn lister(&self) -> &Arc<dyn SourceLister> {
        &self.lister
    }

    /// Process every listed item
    pub async fn run(
        &self,
        sink: &mut dyn ResultSink,
        observer: &dyn RunObserver,
    ) -> Result<RunSummary> {
        self.run_until(sink, observer, std::future::pending::<()>())
            .await
    }

    /// Process listed items until done or until `shutdown` resolves
    ///
    /// On shutdown, items not yet recorded are abandoned: no row is written and
    /// they are not marked done.
    pub async fn run_until<S>(
        &self,
        sink: &mut dyn ResultSink,
        observer: &dyn RunObserver,
        shutdown: S,
    ) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        let references = self.lister.list().await?;
        let total = references.len();
        observer.on_listed(total);

        if total == 0 {
            tracing::info!("Nothing to do: {} listed no documents", self.lister.name());
            return Ok(RunSummary::empty());
        }

        tracing::info!(
            "Processing {} document(s) from {} (convert: {}, extract: {} {})",
            total,
            self.lister.name(),
            self.converter.label(),
            self.extractor.name(),
            self.extractor.model()
        );

        sink.prepare()?;

        let mut prepared = stream::iter(references.into_iter().enumerate())
            .map(|(index, reference)| self.prepare_item(index + 1, total, reference, observer))
            .buffered(self.parallel_items);

        tokio::pin!(shutdown);
        let mut reports = Vec::with_capacity(total);
        let mut interrupted = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    interrupted = true;
                    break;
                }
                next = prepared.next() => next,
            };
            let Some(item) = next else { break };

            let position = item.position;
            let report = self.record_item(item, sink, total, observer).await?;
            observer.on_item(position, total, &report);
            reports.push(report);
        }

        if interrupted {
            tracing::warn!(
                "Interrupted after {} of {} document(s); the rest stay in the source",
                reports.len(),
                total
            );
        }

        let summary = RunSummary::from_reports(total, reports, Some(sink.destination()), interrupted);
        tracing::info!(
            "Run finished: {} listed, {} attempted, {} succeeded, {} failed",
            summary.listed(),
            summary.attempted(),
            summary.succeeded(),
            summary.failed()
        );
        Ok(summary)
    }

    async fn prepare_item(
        &self,
        position: usize,
        total: usize,
        reference: DocumentReference,
        observer: &dyn RunObserver,
    ) -> PreparedItem {
        tracing::info!("[{}/{}] Processing {}", position, total, reference.name);
        let started = Instant::now();
        let advance = |state: ItemState| {
            tracing::debug!("[{}/{}] {} {}", position, total, reference.name, state);
            observer.on_state(position, total, &reference, state);
        };
        let outcome = self.fetch_convert_extract(&reference, advance).await;
        PreparedItem {
            position,
            reference,
            started,
            outcome,
        }
    }

    /// Run the concurrent stages, reporting each state reached through `advance`
    ///
    /// A failure carries the last state the item reached.
    async fn fetch_convert_extract(
        &self,
        reference: &DocumentReference,
        advance: impl Fn(ItemState),
    ) -> std::result::Result<ExtractedRecord, (ItemState, Error)> {
        let content = self
            .fetcher
            .fetch(reference)
            .await
            .map_err(|e| (ItemState::Listed, e))?;
        tracing::debug!("[{}] Fetched {} bytes", reference.name, content.len());
        advance(ItemState::Fetched);

        let text = match &self.converter {
            Converter::Local(converter) => converter.convert(reference, &content).await,
            Converter::Remote(parser) => parser.parse(reference, &content).await,
        }
        .map_err(|e| (ItemState::Fetched, e))?;
        drop(content);
        advance(ItemState::Converted);

        if text.is_blank() {
            tracing::warn!("[{}] No text extracted; sending empty document", reference.name);
        } else {
            tracing::debug!("[{}] Converted to {} chars", reference.name, text.content.len());
        }

        let record = self
            .extractor
            .extract(&text, &self.schema)
            .await
            .map_err(|e| (ItemState::Converted, e))?;
        advance(ItemState::Extracted);
        Ok(record)
    }

    async fn record_item(
        &self,
        item: PreparedItem,
        sink: &mut dyn ResultSink,
        total: usize,
        observer: &dyn RunObserver,
    ) -> Result<ItemReport> {
        let PreparedItem {
            position,
            reference,
            started,
            outcome,
        } = item;

        let record = match outcome {
            Ok(record) => record,
            Err((failed_after, err)) => {
                let failure = match StageError::from(err) {
                    StageError::Fatal(err) => return Err(err),
                    StageError::Item(failure) => failure,
                };
                tracing::warn!(
                    "[{}/{}] {} skipped after {}: {}",
                    position,
                    total,
                    reference.name,
                    failed_after,
                    failure
                );
                return Ok(ItemReport {
                    id: reference.id,
                    name: reference.name,
                    state: ItemState::Skipped,
                    failed_after: Some(failed_after),
                    failure: Some(failure),
                    completion_warning: None,
                    record_json: None,
                    elapsed: started.elapsed(),
                });
            }
        };

        let row = ResultRow::new(&reference, &record);
        sink.append(&row).map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                Error::sink_write(sink.destination(), e)
            }
        })?;
        observer.on_state(position, total, &reference, ItemState::Recorded);

        let completion_warning = match self.marker.mark_done(&reference).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "[{}/{}] {} recorded but not marked done: {}",
                    position,
                    total,
                    reference.name,
                    e
                );
                Some(ItemFailure {
                    kind: FailureKind::CompletionMark,
                    detail: e.to_string(),
                })
            }
        };

        observer.on_state(position, total, &reference, ItemState::Completed);
        let elapsed = started.elapsed();
        tracing::info!(
            "[{}/{}] {} recorded in {:.1}s",
            position,
            total,
            reference.name,
            elapsed.as_secs_f64()
        );

        Ok(ItemReport {
            id: reference.id,
            name: reference.name,
            state: ItemState::Completed,
            failed_after: None,
            failure: None,
            completion_warning,
            record_json: Some(row.extracted_record_json),
            elapsed,
        })
    }
}
