use crate::channel::MessageChannel;
use crate::codec;
use crate::span::SpanBatch;
use std::future::Future;
use thiserror::Error;
use tracing::debug;

/// Error types for span export operations
#[derive(Debug, Error, Clone)]
pub enum ExportError {
    /// Transport-layer error (channel dispatch, broker)
    #[error("transport error: {0}")]
    Transport(String),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The exporter has been shut down
    #[error("exporter is shut down")]
    ShutDown,
    /// The poller needs a running tokio runtime
    #[error("span exporter requires a running tokio runtime")]
    NoRuntime,
}

/// Trait for exporting span batches to various backends.
///
/// Uses native async fn in traits. For dynamic dispatch, use
/// `Arc<dyn SpanExporterBoxed>`.
pub trait SpanExporter: Send + Sync {
    /// Exports a batch of spans.
    fn export(&self, batch: SpanBatch) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Returns the exporter name for debugging.
    fn name(&self) -> &str;
}

/// Object-safe version of SpanExporter for dynamic dispatch.
pub trait SpanExporterBoxed: Send + Sync {
    /// Exports a batch of spans (boxed future for object safety).
    fn export_boxed(
        &self,
        batch: SpanBatch,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;

    /// Returns the exporter name for debugging.
    fn name(&self) -> &str;
}

/// Blanket implementation: any SpanExporter can be used as SpanExporterBoxed
impl<T: SpanExporter> SpanExporterBoxed for T {
    fn export_boxed(
        &self,
        batch: SpanBatch,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(self.export(batch))
    }

    fn name(&self) -> &str {
        SpanExporter::name(self)
    }
}

/// Publishes span batches as JSON messages on an output channel.
///
/// Whatever is bound to the channel (typically a producer binding) carries
/// the message on to the broker.
pub struct ChannelExporter {
    channel: MessageChannel,
}

impl ChannelExporter {
    pub fn new(channel: MessageChannel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }
}

impl SpanExporter for ChannelExporter {
    async fn export(&self, batch: SpanBatch) -> Result<(), ExportError> {
        let span_count = batch.len();
        let message = codec::encode(&batch).map_err(|e| ExportError::Serialization(e.to_string()))?;
        self.channel
            .send(&message)
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        debug!(channel = self.channel.name(), spans = span_count, "published span batch");
        Ok(())
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Test exporter that records all exported spans for verification
#[cfg(test)]
pub struct TestExporter {
    batches: std::sync::Mutex<Vec<SpanBatch>>,
    fail: bool,
}

#[cfg(test)]
impl TestExporter {
    pub fn new() -> Self {
        Self {
            batches: std::sync::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// An exporter whose every export fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn exported_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(SpanBatch::len).sum()
    }

    pub fn batches(&self) -> Vec<SpanBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl SpanExporter for TestExporter {
    async fn export(&self, batch: SpanBatch) -> Result<(), ExportError> {
        if self.fail {
            return Err(ExportError::Transport("backend down".into()));
        }
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }

    fn name(&self) -> &str {
        "test"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::message::Message;
    use crate::span::{Host, Span};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_channel_exporter_publishes_json() {
        let channel = MessageChannel::new("sleuth");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        channel.subscribe(move |m: &Message| -> Result<(), HandlerError> {
            sink.lock().unwrap().push(codec::decode(m)?);
            Ok(())
        });

        let exporter = ChannelExporter::new(channel);
        let batch = SpanBatch::with_spans(Host::local("svc"), vec![Span::new(1, 2, None, "new_span")]);
        exporter.export(batch.clone()).await.unwrap();

        assert_eq!(*received.lock().unwrap(), vec![batch]);
    }

    #[tokio::test]
    async fn test_channel_exporter_without_binding_fails() {
        let exporter = ChannelExporter::new(MessageChannel::new("sleuth"));
        let batch = SpanBatch::with_spans(Host::local("svc"), vec![Span::new(1, 2, None, "x")]);

        let err = exporter.export(batch).await.unwrap_err();
        assert!(matches!(err, ExportError::Transport(_)));
    }

    #[tokio::test]
    async fn test_test_exporter() {
        let exporter = TestExporter::new();
        let mut batch = SpanBatch::new(Host::local("svc"));
        for i in 0..10 {
            batch.add(Span::new(i as u128, i, None, "test"));
        }

        exporter.export(batch).await.unwrap();
        assert_eq!(exporter.exported_count(), 10);
    }
}
