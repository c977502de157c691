//! Ephemeral broker for tests.

use crate::broker::Broker;
use crate::config::BrokerConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// A broker that lives for the duration of a test.
///
/// Start it before binding anything, stop it (or drop it) afterwards.
/// Each instance is isolated from every other one.
///
/// ```
/// use span_broker::{EmbeddedBroker, ProducerRecord};
///
/// let embedded = EmbeddedBroker::start();
/// let broker = embedded.broker();
/// broker.send("sleuth", ProducerRecord::new("payload"), None).unwrap();
/// embedded.stop();
/// assert!(!broker.is_running());
/// ```
#[derive(Debug)]
pub struct EmbeddedBroker {
    id: u64,
    broker: Broker,
}

impl EmbeddedBroker {
    /// Starts a broker with the default configuration.
    pub fn start() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Starts a broker with a custom configuration.
    pub fn with_config(config: BrokerConfig) -> Self {
        let id = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        info!(instance = id, "embedded broker started");
        Self {
            id,
            broker: Broker::new(config),
        }
    }

    /// Instance id, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle to the running broker.
    pub fn broker(&self) -> Broker {
        self.broker.clone()
    }

    /// Tears the broker down. Handles obtained earlier start failing fast.
    pub fn stop(&self) {
        if self.broker.is_running() {
            self.broker.shutdown();
            info!(instance = self.id, "embedded broker stopped");
        }
    }
}

impl Drop for EmbeddedBroker {
    fn drop(&mut self) {
        self.stop();
    }
}
