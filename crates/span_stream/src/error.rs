//! Error types for span_stream operations.

use span_broker::BrokerError;
use thiserror::Error;

/// A message handler refused or failed to process a message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The broker rejected the record.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The handler rejected the message for its own reasons.
    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Errors raised while dispatching on a [`MessageChannel`](crate::MessageChannel).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Nothing is subscribed to the channel.
    #[error("channel '{0}' has no subscribers")]
    NoSubscribers(String),

    /// Every subscriber failed; carries the last failure.
    #[error("delivery on channel '{channel}' failed after {attempts} handler(s): {source}")]
    Delivery {
        channel: String,
        attempts: usize,
        #[source]
        source: HandlerError,
    },
}

/// Errors turning span batches into messages and back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while binding channels to broker destinations.
#[derive(Debug, Error)]
pub enum BinderError {
    /// The broker could not be reached at bind time.
    #[error("broker unavailable while binding '{0}'")]
    BrokerUnavailable(String),

    /// The destination does not exist and the binder may not create it.
    #[error("destination '{0}' not found")]
    DestinationNotFound(String),

    /// Consumer bindings need a tokio runtime for their listener.
    #[error("binding '{0}' requires a running tokio runtime")]
    NoRuntime(String),

    /// Any other broker failure.
    #[error("broker error: {0}")]
    Broker(BrokerError),
}

impl BinderError {
    pub(crate) fn from_broker(name: &str, err: BrokerError) -> Self {
        match err {
            BrokerError::Unavailable => Self::BrokerUnavailable(name.to_string()),
            BrokerError::UnknownTopic(topic) => Self::DestinationNotFound(topic),
            other => Self::Broker(other),
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Errors waiting on a [`SpanCollector`](crate::SpanCollector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CollectorError {
    #[error("no matching span batch arrived within {0:?}")]
    Timeout(std::time::Duration),
}
