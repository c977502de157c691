//! Binds message channels to broker destinations.
//!
//! A producer binding forwards every message sent on its channel to the
//! destination topic. A consumer binding joins a consumer group on the
//! destination and runs a listener task that feeds records back into a
//! channel, committing each record once a handler accepted it.
//!
//! ```text
//!   output channel ──► producer binding ──► topic "sleuth" ──► consumer binding ──► input channel
//! ```
//!
//! Both sides agree on the destination by binding the same name.

mod binding;
mod properties;

pub use binding::{Binding, BindingKind};
pub use properties::{BinderConfig, ConsumerProperties, ProducerProperties};

use crate::channel::MessageChannel;
use crate::error::{BinderError, HandlerError};
use crate::message::Message;
use rand::Rng;
use span_broker::{Broker, Consumer, OffsetReset, ProducerRecord, Record, Topic};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Connects channels to named destinations.
pub trait Binder {
    /// Forwards messages sent on `channel` to the destination `name`.
    fn bind_producer(
        &self,
        name: &str,
        channel: &MessageChannel,
        properties: ProducerProperties,
    ) -> Result<Binding, BinderError>;

    /// Delivers records of destination `name`, read as a member of `group`,
    /// to `channel`. An empty `group` joins a fresh anonymous group.
    fn bind_consumer(
        &self,
        name: &str,
        group: &str,
        channel: &MessageChannel,
        properties: ConsumerProperties,
    ) -> Result<Binding, BinderError>;
}

/// [`Binder`] backed by a [`Broker`].
///
/// Binding fails fast with [`BinderError::BrokerUnavailable`] when the broker
/// is down; the binder never retries a bind.
#[derive(Debug, Clone)]
pub struct BrokerBinder {
    broker: Broker,
    config: BinderConfig,
}

impl BrokerBinder {
    pub fn new(broker: Broker, config: BinderConfig) -> Self {
        Self { broker, config }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Looks up the destination, creating it when allowed.
    fn provision(&self, name: &str, partitions: u32) -> Result<Arc<Topic>, BinderError> {
        self.broker
            .ensure_running()
            .map_err(|e| BinderError::from_broker(name, e))?;

        let partitions = partitions.max(self.config.min_partition_count).max(1);
        let topic = if self.config.auto_create_topics {
            self.broker.create_topic(name, partitions)
        } else {
            self.broker.topic(name)
        };
        topic.map_err(|e| BinderError::from_broker(name, e))
    }
}

impl Binder for BrokerBinder {
    fn bind_producer(
        &self,
        name: &str,
        channel: &MessageChannel,
        properties: ProducerProperties,
    ) -> Result<Binding, BinderError> {
        let topic = self.provision(name, properties.partition_count)?;

        let broker = self.broker.clone();
        let destination = topic.name().to_string();
        let key_header = properties.partition_key_header;
        let subscription = channel.subscribe(move |message: &Message| -> Result<(), HandlerError> {
            let record = to_record(message, key_header.as_deref());
            broker.send(&destination, record, None)?;
            Ok(())
        });

        info!(
            destination = name,
            channel = channel.name(),
            partitions = topic.partition_count(),
            "bound producer"
        );
        Ok(Binding::producer(name, subscription))
    }

    fn bind_consumer(
        &self,
        name: &str,
        group: &str,
        channel: &MessageChannel,
        properties: ConsumerProperties,
    ) -> Result<Binding, BinderError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| BinderError::NoRuntime(name.to_string()))?;
        let topic = self.provision(name, self.config.min_partition_count)?;

        let (group, default_reset) = if group.is_empty() {
            (anonymous_group(), OffsetReset::Latest)
        } else {
            (group.to_string(), OffsetReset::Earliest)
        };
        let reset = properties.start_offset.unwrap_or(default_reset);

        let consumer = Arc::new(
            self.broker
                .consumer(topic.name(), &group, reset)
                .map_err(|e| BinderError::from_broker(name, e))?,
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let listener = runtime.spawn(listen(
            Arc::clone(&consumer),
            channel.clone(),
            properties,
            stop_rx,
        ));

        info!(
            destination = name,
            group = %group,
            channel = channel.name(),
            member = consumer.member_id(),
            "bound consumer"
        );
        Ok(Binding::consumer(name, group, consumer, stop_tx, listener))
    }
}

fn anonymous_group() -> String {
    format!("anonymous.{:016x}", rand::thread_rng().gen::<u64>())
}

fn to_record(message: &Message, key_header: Option<&str>) -> ProducerRecord {
    let mut record = ProducerRecord::new(message.payload().clone());
    record.headers = message.headers().clone();
    if let Some(key) = key_header.and_then(|h| message.header(h)) {
        record = record.with_key(key.to_string());
    }
    record
}

fn to_message(record: &Record) -> Message {
    Message::from_parts(record.headers.clone(), record.payload.clone())
}

/// Listener loop of a consumer binding.
///
/// Wakes on data notifications, with the poll interval as a safety net for
/// notifications that fire between a poll and the next wait.
async fn listen(
    consumer: Arc<Consumer>,
    channel: MessageChannel,
    properties: ConsumerProperties,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let notify = consumer.data_notify();
    let mut ticker = tokio::time::interval(properties.poll_interval);

    loop {
        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match consumer.poll(properties.max_poll_records) {
            Ok(records) if !records.is_empty() => {
                for record in &records {
                    if consumer.is_closed() {
                        break;
                    }
                    dispatch(&channel, record, &properties).await;
                    if let Err(e) = consumer.commit(record) {
                        debug!(error = %e, offset = record.offset, "commit skipped");
                    }
                }
                continue;
            }
            Ok(_) => {}
            Err(e) if e.is_terminal() => {
                debug!(topic = consumer.topic(), group = consumer.group(), reason = %e, "listener stopping");
                break;
            }
            Err(e) => warn!(topic = consumer.topic(), error = %e, "poll failed"),
        }

        tokio::select! {
            _ = &mut stop_rx => break,
            _ = &mut notified => {}
            _ = ticker.tick() => {}
        }
    }
    debug!(topic = consumer.topic(), group = consumer.group(), "listener stopped");
}

/// Sends `record` to `channel`, retrying with back-off up to `max_attempts`.
///
/// A record that exhausts its attempts is logged and skipped.
async fn dispatch(channel: &MessageChannel, record: &Record, properties: &ConsumerProperties) {
    let message = to_message(record);
    let max_attempts = properties.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match channel.send(&message) {
            Ok(()) => return,
            Err(e) if attempt < max_attempts => {
                let delay = properties.back_off(attempt);
                warn!(
                    channel = channel.name(),
                    partition = record.partition,
                    offset = record.offset,
                    attempt,
                    retry_in = ?delay,
                    error = %e,
                    "dispatch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    channel = channel.name(),
                    partition = record.partition,
                    offset = record.offset,
                    attempts = max_attempts,
                    error = %e,
                    "dispatch failed, skipping record"
                );
            }
        }
    }
}
