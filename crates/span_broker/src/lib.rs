//! In-process partitioned log broker.
//!
//! Topics are split into append-only partitions. Consumers join named groups;
//! the group spreads partitions over its members and tracks committed offsets,
//! so a restarted member resumes where the group left off.
//!
//! # Example
//!
//! ```
//! use span_broker::{Broker, OffsetReset, ProducerRecord};
//!
//! let broker = Broker::default();
//! broker.create_topic("sleuth", 1).unwrap();
//!
//! let consumer = broker.consumer("sleuth", "sleuth", OffsetReset::Earliest).unwrap();
//! broker.send("sleuth", ProducerRecord::new("spans"), None).unwrap();
//!
//! let records = consumer.poll(10).unwrap();
//! assert_eq!(records.len(), 1);
//! consumer.commit(&records[0]).unwrap();
//! ```

mod broker;
mod config;
mod consumer;
mod embedded;
mod error;
mod group;
mod invariants;
mod record;
mod sync;
mod topic;

pub use broker::Broker;
pub use config::{BrokerConfig, OffsetReset, MULTI_PARTITION_CONFIG, SINGLE_PARTITION_CONFIG};
pub use consumer::Consumer;
pub use embedded::EmbeddedBroker;
pub use error::BrokerError;
pub use record::{Headers, ProducerRecord, Record, RecordMetadata};
pub use topic::Topic;
