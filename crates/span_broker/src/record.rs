use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Record headers, ordered so that records compare and print deterministically.
pub type Headers = BTreeMap<String, String>;

/// A record as handed to [`Broker::send`](crate::Broker::send).
#[derive(Debug, Clone, Default)]
pub struct ProducerRecord {
    /// Optional key; records with equal keys land on the same partition
    pub key: Option<Bytes>,
    /// Application headers
    pub headers: Headers,
    /// Opaque payload
    pub payload: Bytes,
}

impl ProducerRecord {
    /// Creates an unkeyed record with the given payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            key: None,
            headers: Headers::new(),
            payload: payload.into(),
        }
    }

    /// Sets the record key.
    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A record stored in a partition log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Topic the record was appended to
    pub topic: String,
    /// Partition index within the topic
    pub partition: u32,
    /// Position within the partition (dense, starting at 0)
    pub offset: u64,
    /// Optional key
    pub key: Option<Bytes>,
    /// Application headers
    pub headers: Headers,
    /// Opaque payload
    pub payload: Bytes,
    /// Append time (Unix milliseconds)
    pub timestamp_millis: u64,
}

/// Where a produced record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: u32,
    pub offset: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
