//! Error types for broker operations.

use thiserror::Error;

/// Errors returned by the broker and its consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The broker has been shut down (or was never started).
    #[error("broker is unavailable")]
    Unavailable,

    /// The topic does not exist and auto-creation is disabled.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// A partition index outside the topic's range was requested.
    #[error("partition {partition} out of range for topic {topic} ({count} partitions)")]
    InvalidPartition {
        topic: String,
        partition: u32,
        count: u32,
    },

    /// A topic cannot be created with zero partitions.
    #[error("topic {0} must have at least one partition")]
    ZeroPartitions(String),

    /// The consumer has left its group.
    #[error("consumer has been closed")]
    ConsumerClosed,
}

impl BrokerError {
    /// Returns `true` if retrying the same call can never succeed.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unavailable | Self::ConsumerClosed)
    }
}
