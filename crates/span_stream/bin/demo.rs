//! Runs the whole pipeline in one process: a traced "client" closes a few
//! spans, the batches travel through an embedded broker and end up in a span
//! store, which is printed at the end.

use anyhow::Context;
use span_broker::{EmbeddedBroker, MULTI_PARTITION_CONFIG};
use span_stream::{
    codec, init_logging, testing::await_until_async, Binder, BinderConfig, BrokerBinder,
    ChannelExporter, ConsumerProperties, HandlerError, Host, InMemorySpanStore, Message,
    MessageChannel, PercentageSampler, ProducerProperties, SpanCollector, StreamConfig,
    StreamSpanExporter, Tracer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// Spans are tracked per thread, so stay on one
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = StreamConfig::low_latency().with_host(Host::new("zipkin-client", "127.0.0.1", 8080));
    config.validate().context("invalid stream configuration")?;

    let broker = EmbeddedBroker::with_config(MULTI_PARTITION_CONFIG);
    let binder = BrokerBinder::new(broker.broker(), BinderConfig::default().with_min_partition_count(4));

    let output = MessageChannel::new(config.output_channel.clone());
    let input = MessageChannel::new(config.input_channel.clone());

    // Collection side
    let store = InMemorySpanStore::new();
    let collector = SpanCollector::matching_name("checkout");
    let _subscription = {
        let store = store.clone();
        let collector = collector.clone();
        input.subscribe(move |message: &Message| -> Result<(), HandlerError> {
            let batch = codec::decode(message)?;
            store.accept(&batch);
            collector.on_batch(batch);
            Ok(())
        })
    };

    let producer = binder.bind_producer(
        &config.destination,
        &output,
        ProducerProperties::default().with_partition_count(4),
    )?;
    let consumer = binder.bind_consumer(
        &config.destination,
        &config.group,
        &input,
        ConsumerProperties::default().with_poll_interval(Duration::from_millis(20)),
    )?;

    // Client side
    let exporter = StreamSpanExporter::spawn(
        config.exporter.clone(),
        config.host.clone(),
        Arc::new(ChannelExporter::new(output)),
    )?;
    let tracer = Tracer::new(Arc::new(PercentageSampler::new(1.0)), exporter.reporter());

    for order in 0..5 {
        let mut checkout = tracer.create_span("checkout");
        checkout.tag("order", order.to_string());
        checkout.log("cs");

        let payment = tracer.create_span("charge-card");
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracer.close(payment);

        checkout.log("cr");
        tracer.close(checkout);
    }

    exporter.shutdown().await?;
    collector
        .wait_for_match(Duration::from_secs(5))
        .await
        .context("spans never reached the collector")?;
    await_until_async(Duration::from_secs(5), || store.span_count() == 10)
        .await
        .context("not every span was stored")?;

    for service in store.service_names() {
        info!(service = %service, spans = ?store.span_names(&service), "service");
    }
    for trace_id in store.traces() {
        let spans = store.trace(trace_id);
        info!(trace = format_args!("{:032x}", trace_id), spans = spans.len(), "trace");
    }
    info!(
        collected_batches = collector.len(),
        stored_spans = store.span_count(),
        "done"
    );

    producer.unbind();
    consumer.unbind_and_wait().await;
    broker.stop();
    Ok(())
}
