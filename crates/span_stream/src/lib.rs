//! Span streaming over a partitioned broker.
//!
//! Closed spans travel from the [`Tracer`] through a [`StreamSpanExporter`],
//! which batches them and publishes each batch on an output
//! [`MessageChannel`]. A producer binding forwards the channel to a broker
//! destination; a consumer binding reads the destination as a member of a
//! consumer group and feeds an input channel, where a [`SpanCollector`] or an
//! [`InMemorySpanStore`] picks the batches up.
//!
//! ```text
//! Tracer ─► StreamSpanExporter ─► "sleuth" channel ─► Binder ─► broker ─► Binder ─► "sleuth-sink" channel ─► SpanCollector
//! ```
//!
//! # Example
//!
//! ```no_run
//! use span_stream::{
//!     Binder, BinderConfig, BrokerBinder, ChannelExporter, ConsumerProperties, MessageChannel,
//!     ProducerProperties, SpanCollector, StreamConfig, StreamSpanExporter, Tracer, AlwaysSampler,
//! };
//! use span_broker::EmbeddedBroker;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = StreamConfig::low_latency();
//! let broker = EmbeddedBroker::start();
//! let binder = BrokerBinder::new(broker.broker(), BinderConfig::default());
//!
//! let output = MessageChannel::new(config.output_channel.clone());
//! let input = MessageChannel::new(config.input_channel.clone());
//! let collector = SpanCollector::matching_name("new_span");
//! let _subscription = collector.subscribe(&input);
//!
//! let producer = binder.bind_producer(&config.destination, &output, ProducerProperties::default())?;
//! let consumer = binder.bind_consumer(&config.destination, &config.group, &input, ConsumerProperties::default())?;
//!
//! let exporter = StreamSpanExporter::spawn(config.exporter, config.host, Arc::new(ChannelExporter::new(output)))?;
//! let tracer = Tracer::new(Arc::new(AlwaysSampler), exporter.reporter());
//! let span = tracer.create_span("new_span");
//! tracer.close(span);
//!
//! collector.wait_for_match(Duration::from_secs(10)).await?;
//! producer.unbind();
//! consumer.unbind();
//! # Ok(())
//! # }
//! ```

pub mod batch_processor;
pub mod binder;
pub mod channel;
pub mod codec;
pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod message;
pub mod sampler;
pub mod span;
pub mod store;
pub mod stream_exporter;
pub mod testing;
pub mod tracer;

pub use batch_processor::{BatchConfig, BatchProcessor};
pub use binder::{
    Binder, BinderConfig, Binding, BindingKind, BrokerBinder, ConsumerProperties, ProducerProperties,
};
pub use channel::{MessageChannel, MessageHandler, Subscription};
pub use collector::SpanCollector;
pub use config::{StreamConfig, DESTINATION, GROUP, INPUT_CHANNEL, OUTPUT_CHANNEL};
pub use error::{BinderError, ChannelError, CodecError, CollectorError, ConfigError, HandlerError};
pub use exporter::{ChannelExporter, ExportError, SpanExporter, SpanExporterBoxed};
pub use message::{Message, MessageHeaders, APPLICATION_JSON, CONTENT_TYPE};
pub use sampler::{AlwaysSampler, NeverSampler, PercentageSampler, Sampler};
pub use span::{Host, Log, Span, SpanBatch, SpanContext};
pub use store::{InMemorySpanStore, StoredSpan};
pub use stream_exporter::{ExportMetrics, ExporterConfig, QueueReporter, StreamSpanExporter};
pub use tracer::{ActiveSpan, SpanReporter, Tracer};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global log subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,span_stream=debug,span_broker=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
