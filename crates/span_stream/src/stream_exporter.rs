//! Bridges the synchronous tracer with the async export path.
//!
//! Closed spans are enqueued on the closing thread by a [`QueueReporter`].
//! A poller task drains the queue into a [`BatchProcessor`] and hands due
//! batches to the exporter one at a time, so batches leave in close order.

use crate::batch_processor::{BatchConfig, BatchProcessor};
use crate::exporter::{ExportError, SpanExporterBoxed};
use crate::span::{Host, Span};
use crate::tracer::SpanReporter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Thread-safe export metrics (uses atomics)
#[derive(Debug, Default)]
pub struct ExportMetrics {
    /// Spans accepted from the tracer
    pub spans_reported: AtomicU64,
    /// Spans refused because they were unsampled or the exporter was closed
    pub spans_dropped: AtomicU64,
    /// Total spans exported
    pub spans_exported: AtomicU64,
    /// Total batches exported
    pub batches_exported: AtomicU64,
    /// Total export errors
    pub export_errors: AtomicU64,
}

// Relaxed everywhere: these are statistics only and guard no other data.
impl ExportMetrics {
    pub fn spans_reported(&self) -> u64 {
        self.spans_reported.load(Ordering::Relaxed)
    }

    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    pub fn spans_exported(&self) -> u64 {
        self.spans_exported.load(Ordering::Relaxed)
    }

    pub fn batches_exported(&self) -> u64 {
        self.batches_exported.load(Ordering::Relaxed)
    }

    pub fn export_errors(&self) -> u64 {
        self.export_errors.load(Ordering::Relaxed)
    }

    fn record_success(&self, span_count: u64) {
        self.spans_exported.fetch_add(span_count, Ordering::Relaxed);
        self.batches_exported.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.export_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Configuration for the stream exporter
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Batch configuration
    pub batch_config: BatchConfig,
    /// Poller interval
    pub poll_interval: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            batch_config: BatchConfig::default(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl ExporterConfig {
    /// Short intervals for tests and demos.
    pub fn low_latency() -> Self {
        Self {
            batch_config: BatchConfig {
                batch_size_limit: 100,
                batch_timeout: Duration::from_millis(20),
            },
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_config(mut self, batch_config: BatchConfig) -> Self {
        self.batch_config = batch_config;
        self
    }
}

/// [`SpanReporter`] that enqueues spans for the poller task.
#[derive(Clone)]
pub struct QueueReporter {
    queue: mpsc::UnboundedSender<Span>,
    metrics: Arc<ExportMetrics>,
}

impl SpanReporter for QueueReporter {
    fn report(&self, span: Span) {
        if !span.is_exportable() {
            self.metrics.spans_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.queue.send(span) {
            Ok(()) => {
                self.metrics.spans_reported.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::SendError(span)) => {
                self.metrics.spans_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(span = span.name(), "exporter is shut down, dropping span");
            }
        }
    }
}

async fn export_batch(
    exporter: &dyn SpanExporterBoxed,
    processor: &mut BatchProcessor,
    host: &Host,
    metrics: &ExportMetrics,
) {
    match processor.flush(exporter, host).await {
        Ok(0) => {}
        Ok(span_count) => metrics.record_success(span_count as u64),
        Err(e) => {
            metrics.record_error();
            warn!(exporter = exporter.name(), error = %e, "span export failed");
        }
    }
}

/// Owns the span queue and the poller task that exports batches.
pub struct StreamSpanExporter {
    reporter: QueueReporter,
    poller: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    metrics: Arc<ExportMetrics>,
}

impl StreamSpanExporter {
    /// Spawns the poller on the current tokio runtime.
    ///
    /// Every batch is stamped with `host`. Fails with
    /// [`ExportError::NoRuntime`] outside a runtime.
    pub fn spawn(
        config: ExporterConfig,
        host: Host,
        exporter: Arc<dyn SpanExporterBoxed>,
    ) -> Result<Self, ExportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ExportError::NoRuntime)?;
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<Span>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let metrics = Arc::new(ExportMetrics::default());

        let poller_metrics = Arc::clone(&metrics);
        info!(
            exporter = exporter.name(),
            service = %host.service_name,
            poll_interval = ?config.poll_interval,
            "span exporter started"
        );

        let poller = runtime.spawn(async move {
            let mut interval = tokio::time::interval(config.poll_interval);
            let mut processor = BatchProcessor::new(config.batch_config);

            loop {
                tokio::select! {
                    maybe_span = queue_rx.recv() => {
                        match maybe_span {
                            Some(span) => {
                                processor.add(span);
                                if processor.is_full() {
                                    export_batch(exporter.as_ref(), &mut processor, &host, &poller_metrics).await;
                                }
                            }
                            // Every reporter is gone: nothing more can arrive
                            None => {
                                export_batch(exporter.as_ref(), &mut processor, &host, &poller_metrics).await;
                                break;
                            }
                        }
                    }

                    _ = interval.tick() => {
                        if processor.should_flush() {
                            export_batch(exporter.as_ref(), &mut processor, &host, &poller_metrics).await;
                        }
                    }

                    _ = &mut shutdown_rx => {
                        // Drain whatever was reported before shutdown
                        queue_rx.close();
                        while let Some(span) = queue_rx.recv().await {
                            processor.add(span);
                            if processor.is_full() {
                                export_batch(exporter.as_ref(), &mut processor, &host, &poller_metrics).await;
                            }
                        }
                        export_batch(exporter.as_ref(), &mut processor, &host, &poller_metrics).await;
                        break;
                    }
                }
            }
            debug!(exporter = exporter.name(), "span exporter poller stopped");
        });

        Ok(Self {
            reporter: QueueReporter {
                queue: queue_tx,
                metrics: Arc::clone(&metrics),
            },
            poller: Some(poller),
            shutdown_tx: Some(shutdown_tx),
            metrics,
        })
    }

    /// Reporter to hand to the [`Tracer`](crate::Tracer).
    pub fn reporter(&self) -> Arc<dyn SpanReporter> {
        Arc::new(self.reporter.clone())
    }

    /// Returns export metrics
    pub fn metrics(&self) -> &Arc<ExportMetrics> {
        &self.metrics
    }

    /// Flushes everything reported so far and stops the poller.
    ///
    /// Spans reported afterwards are dropped and counted in
    /// [`ExportMetrics::spans_dropped`].
    pub async fn shutdown(mut self) -> Result<(), ExportError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(poller) = self.poller.take() {
            poller
                .await
                .map_err(|e| ExportError::Transport(format!("poller join error: {}", e)))?;
        }
        info!(
            exported = self.metrics.spans_exported(),
            errors = self.metrics.export_errors(),
            "span exporter stopped"
        );
        Ok(())
    }
}

impl Drop for StreamSpanExporter {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::TestExporter;
    use crate::sampler::AlwaysSampler;
    use crate::tracer::Tracer;

    #[tokio::test]
    async fn test_spans_flow_to_exporter() {
        let exporter = Arc::new(TestExporter::new());
        let stream = StreamSpanExporter::spawn(ExporterConfig::low_latency(), Host::local("svc"), exporter.clone()).unwrap();
        let reporter = stream.reporter();

        for i in 0..10 {
            reporter.report(Span::new(1, i, None, format!("op-{}", i)));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(exporter.exported_count(), 10);
        assert_eq!(stream.metrics().spans_reported(), 10);

        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let exporter = Arc::new(TestExporter::new());
        // Long interval: only the shutdown drain can export
        let config = ExporterConfig::default().with_poll_interval(Duration::from_secs(3600));
        let stream = StreamSpanExporter::spawn(config, Host::local("svc"), exporter.clone()).unwrap();
        let reporter = stream.reporter();

        for i in 0..100 {
            reporter.report(Span::new(1, i, None, "x"));
        }
        let metrics = Arc::clone(stream.metrics());
        stream.shutdown().await.unwrap();

        assert_eq!(exporter.exported_count(), 100);
        assert_eq!(metrics.spans_exported(), 100);

        // Reporter outlives the exporter: spans are dropped, not lost silently
        reporter.report(Span::new(1, 999, None, "late"));
        assert_eq!(metrics.spans_dropped(), 1);
    }

    #[tokio::test]
    async fn test_size_limit_splits_batches() {
        let exporter = Arc::new(TestExporter::new());
        let config = ExporterConfig::default()
            .with_poll_interval(Duration::from_secs(3600))
            .with_batch_config(BatchConfig {
                batch_size_limit: 4,
                batch_timeout: Duration::from_secs(3600),
            });
        let stream = StreamSpanExporter::spawn(config, Host::local("svc"), exporter.clone()).unwrap();
        let reporter = stream.reporter();

        for i in 0..10 {
            reporter.report(Span::new(1, i, None, "x"));
        }
        stream.shutdown().await.unwrap();

        let sizes: Vec<usize> = exporter.batches().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_export_errors_are_counted() {
        let exporter = Arc::new(TestExporter::failing());
        let stream = StreamSpanExporter::spawn(ExporterConfig::low_latency(), Host::local("svc"), exporter).unwrap();
        stream.reporter().report(Span::new(1, 1, None, "x"));

        let metrics = Arc::clone(stream.metrics());
        stream.shutdown().await.unwrap();
        assert_eq!(metrics.export_errors(), 1);
        assert_eq!(metrics.spans_exported(), 0);
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = StreamSpanExporter::spawn(
            ExporterConfig::default(),
            Host::local("svc"),
            Arc::new(TestExporter::new()),
        );
        assert!(matches!(result, Err(ExportError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_burst_before_shutdown_respects_size_limit() {
        let exporter = Arc::new(TestExporter::new());
        let config = ExporterConfig::default()
            .with_poll_interval(Duration::from_secs(3600))
            .with_batch_config(BatchConfig {
                batch_size_limit: 3,
                batch_timeout: Duration::from_secs(3600),
            });
        let stream = StreamSpanExporter::spawn(config, Host::local("svc"), exporter.clone()).unwrap();
        let reporter = stream.reporter();

        // Everything is still queued when shutdown starts draining
        for i in 0..7 {
            reporter.report(Span::new(1, i, None, "x"));
        }
        let metrics = Arc::clone(stream.metrics());
        stream.shutdown().await.unwrap();

        let sizes: Vec<usize> = exporter.batches().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(metrics.batches_exported(), 3);
        assert_eq!(metrics.spans_exported(), 7);
    }

    #[tokio::test]
    async fn test_tracer_reports_through_queue() {
        let exporter = Arc::new(TestExporter::new());
        let stream = StreamSpanExporter::spawn(ExporterConfig::low_latency(), Host::local("svc"), exporter.clone()).unwrap();
        let tracer = Tracer::new(Arc::new(AlwaysSampler), stream.reporter());

        let span = tracer.create_span("new_span");
        tracer.close(span);
        stream.shutdown().await.unwrap();

        let batches = exporter.batches();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].find_by_name("new_span").is_some());
        assert_eq!(batches[0].host.service_name, "svc");
    }
}
