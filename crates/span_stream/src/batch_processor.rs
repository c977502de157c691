//! Batch Processor - Pure Batching Abstraction
//!
//! Groups closed spans by trace id and decides when a batch is due, based on
//! size and age thresholds. It holds no `Arc`, no atomics and no exporter:
//! the exporter is passed to [`BatchProcessor::flush`], and the concurrent
//! poller lives in [`stream_exporter`](crate::stream_exporter).
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut processor = BatchProcessor::new(BatchConfig::default());
//! processor.add(span);
//!
//! if processor.should_flush() {
//!     processor.flush(exporter.as_ref(), &host).await?;
//! }
//! ```
//!
//! Spans of one trace stay adjacent in the emitted batch, in the order they
//! were closed.

use crate::exporter::{ExportError, SpanExporterBoxed};
use crate::span::{Host, Span, SpanBatch};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for batch processing
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of spans per batch
    pub batch_size_limit: usize,
    /// Maximum time to wait before flushing a batch
    pub batch_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size_limit: 1_000,
            batch_timeout: Duration::from_secs(1),
        }
    }
}

/// Batch processor that groups spans by trace id and decides when to flush.
pub struct BatchProcessor {
    /// Pending spans grouped by trace id
    pending: HashMap<u128, Vec<Span>>,
    /// Trace ids in first-seen order, so batches are deterministic
    order: Vec<u128>,
    /// Number of pending spans
    pending_count: usize,
    config: BatchConfig,
    /// Time of the last flush, or of creation
    last_flush: Instant,
}

impl BatchProcessor {
    /// Creates a new batch processor
    pub fn new(config: BatchConfig) -> Self {
        Self {
            pending: HashMap::new(),
            order: Vec::new(),
            pending_count: 0,
            config,
            last_flush: Instant::now(),
        }
    }

    /// Adds a span to the batch
    pub fn add(&mut self, span: Span) {
        let trace_id = span.trace_id();
        let trace_spans = self.pending.entry(trace_id).or_insert_with(|| {
            self.order.push(trace_id);
            Vec::new()
        });
        trace_spans.push(span);
        self.pending_count += 1;
    }

    /// Returns the total number of pending spans
    pub fn total_pending(&self) -> usize {
        self.pending_count
    }

    /// Returns true once the size limit is reached
    pub fn is_full(&self) -> bool {
        self.pending_count >= self.config.batch_size_limit
    }

    /// Checks if the batch should be flushed
    pub fn should_flush(&self) -> bool {
        self.pending_count > 0
            && (self.is_full() || self.last_flush.elapsed() >= self.config.batch_timeout)
    }

    /// Exports all pending spans and waits for the export to finish.
    ///
    /// Returns the number of spans handed to the exporter; `0` when nothing
    /// was pending. On failure the spans are dropped, not re-queued.
    pub async fn flush(&mut self, exporter: &dyn SpanExporterBoxed, host: &Host) -> Result<usize, ExportError> {
        let Some(batch) = self.take_batch(host) else {
            return Ok(0);
        };
        let span_count = batch.len();
        exporter.export_boxed(batch).await?;
        Ok(span_count)
    }

    /// Takes all pending spans as a batch stamped with `host`.
    ///
    /// Returns `None` if no spans are pending.
    pub fn take_batch(&mut self, host: &Host) -> Option<SpanBatch> {
        if self.pending_count == 0 {
            return None;
        }

        let mut spans = Vec::with_capacity(self.pending_count);
        for trace_id in self.order.drain(..) {
            if let Some(trace_spans) = self.pending.remove(&trace_id) {
                spans.extend(trace_spans);
            }
        }
        self.pending_count = 0;
        self.last_flush = Instant::now();
        Some(SpanBatch::with_spans(host.clone(), spans))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::TestExporter;
    use std::sync::Arc;

    fn host() -> Host {
        Host::local("batch-test")
    }

    #[tokio::test]
    async fn test_batch_processor_basic() {
        let exporter = Arc::new(TestExporter::new());
        let config = BatchConfig {
            batch_size_limit: 5,
            batch_timeout: Duration::from_secs(10),
        };
        let mut processor = BatchProcessor::new(config);

        for i in 0..3 {
            processor.add(Span::new(1, i, None, format!("op-{}", i)));
        }

        assert_eq!(processor.total_pending(), 3);
        assert!(!processor.should_flush()); // Below limit

        for i in 3..5 {
            processor.add(Span::new(1, i, None, format!("op-{}", i)));
        }

        assert!(processor.should_flush()); // At limit

        assert_eq!(processor.flush(exporter.as_ref(), &host()).await.unwrap(), 5);
        assert_eq!(processor.total_pending(), 0);
        assert_eq!(exporter.exported_count(), 5);

        // Nothing pending: nothing exported
        assert_eq!(processor.flush(exporter.as_ref(), &host()).await.unwrap(), 0);
        assert_eq!(exporter.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_traces_stay_adjacent() {
        let mut processor = BatchProcessor::new(BatchConfig::default());

        processor.add(Span::new(1, 1, None, "a1"));
        processor.add(Span::new(2, 2, None, "b1"));
        processor.add(Span::new(1, 3, Some(1), "a2"));
        processor.add(Span::new(3, 4, None, "c1"));

        let batch = processor.take_batch(&host()).unwrap();
        let names: Vec<&str> = batch.spans.iter().map(Span::name).collect();
        assert_eq!(names, vec!["a1", "a2", "b1", "c1"]);
        assert_eq!(batch.host, host());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggers_flush() {
        let config = BatchConfig {
            batch_size_limit: 100,
            batch_timeout: Duration::from_millis(50),
        };
        let mut processor = BatchProcessor::new(config);
        processor.add(Span::new(1, 1, None, "slow"));
        assert!(!processor.should_flush());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(processor.should_flush());
    }

    #[tokio::test]
    async fn test_take_batch() {
        let mut processor = BatchProcessor::new(BatchConfig::default());

        // Empty processor returns None
        assert!(processor.take_batch(&host()).is_none());

        for i in 0..5 {
            processor.add(Span::new(1, i, None, format!("op-{}", i)));
        }

        let batch = processor.take_batch(&host());
        assert_eq!(batch.map(|b| b.len()), Some(5));

        // Processor is now empty
        assert_eq!(processor.total_pending(), 0);
        assert!(processor.take_batch(&host()).is_none());
    }

    #[tokio::test]
    async fn test_failed_flush_drops_pending() {
        let exporter = TestExporter::failing();
        let mut processor = BatchProcessor::new(BatchConfig::default());
        processor.add(Span::new(1, 1, None, "x"));

        assert!(processor.flush(&exporter, &host()).await.is_err());
        assert_eq!(processor.total_pending(), 0);
    }
}
