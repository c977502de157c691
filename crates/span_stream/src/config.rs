//! Names and settings that wire the tracer, binder and collector together.

use crate::error::ConfigError;
use crate::span::Host;
use crate::stream_exporter::ExporterConfig;

/// Broker destination spans are published to.
pub const DESTINATION: &str = "sleuth";
/// Consumer group of the collector.
pub const GROUP: &str = "sleuth";
/// Channel the exporter writes span batches to.
pub const OUTPUT_CHANNEL: &str = "sleuth";
/// Channel the collector reads span batches from.
pub const INPUT_CHANNEL: &str = "sleuth-sink";

/// End-to-end configuration of a span stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub destination: String,
    pub group: String,
    pub output_channel: String,
    pub input_channel: String,
    /// Identity stamped on every exported batch
    pub host: Host,
    pub exporter: ExporterConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            destination: DESTINATION.to_string(),
            group: GROUP.to_string(),
            output_channel: OUTPUT_CHANNEL.to_string(),
            input_channel: INPUT_CHANNEL.to_string(),
            host: Host::default(),
            exporter: ExporterConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Default names with short export intervals.
    pub fn low_latency() -> Self {
        Self {
            exporter: ExporterConfig::low_latency(),
            ..Self::default()
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_host(mut self, host: Host) -> Self {
        self.host = host;
        self
    }

    pub fn with_exporter(mut self, exporter: ExporterConfig) -> Self {
        self.exporter = exporter;
        self
    }

    /// Rejects empty names and zero-sized limits.
    ///
    /// An empty group is allowed: it selects an anonymous consumer group.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination.is_empty() {
            return Err(ConfigError::Empty("destination"));
        }
        if self.output_channel.is_empty() {
            return Err(ConfigError::Empty("output_channel"));
        }
        if self.input_channel.is_empty() {
            return Err(ConfigError::Empty("input_channel"));
        }
        if self.host.service_name.is_empty() {
            return Err(ConfigError::Empty("host.service_name"));
        }
        if self.exporter.batch_config.batch_size_limit == 0 {
            return Err(ConfigError::Zero("batch_size_limit"));
        }
        if self.exporter.poll_interval.is_zero() {
            return Err(ConfigError::Zero("poll_interval"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_names() {
        let config = StreamConfig::default();
        assert_eq!(config.destination, "sleuth");
        assert_eq!(config.group, "sleuth");
        assert_eq!(config.input_channel, "sleuth-sink");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_destination() {
        let config = StreamConfig::default().with_destination("");
        assert_eq!(config.validate(), Err(ConfigError::Empty("destination")));
    }

    #[test]
    fn test_anonymous_group_is_valid() {
        assert!(StreamConfig::default().with_group("").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = StreamConfig::default()
            .with_exporter(ExporterConfig::default().with_poll_interval(Duration::ZERO));
        assert_eq!(config.validate(), Err(ConfigError::Zero("poll_interval")));
    }
}
