/// Configuration for a [`Broker`](crate::Broker).
#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig {
    /// Partition count used when a topic is created without an explicit count
    pub default_partitions: u32,
    /// Upper bound on records returned by a single `poll`
    pub max_fetch_records: usize,
    /// Create unknown topics on first produce/subscribe instead of failing
    pub auto_create_topics: bool,
}

impl BrokerConfig {
    /// Creates a new configuration with custom settings.
    pub const fn new(default_partitions: u32, max_fetch_records: usize, auto_create_topics: bool) -> Self {
        Self {
            default_partitions,
            max_fetch_records,
            auto_create_topics,
        }
    }

    /// Sets the default partition count.
    pub fn with_default_partitions(mut self, partitions: u32) -> Self {
        self.default_partitions = partitions;
        self
    }

    /// Sets the fetch cap.
    pub fn with_max_fetch_records(mut self, max: usize) -> Self {
        self.max_fetch_records = max;
        self
    }

    /// Enables or disables topic auto-creation.
    pub fn with_auto_create_topics(mut self, enabled: bool) -> Self {
        self.auto_create_topics = enabled;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_partitions: 1,
            max_fetch_records: 500,
            auto_create_topics: true,
        }
    }
}

/// Single-partition configuration, handy when ordering across records matters
pub const SINGLE_PARTITION_CONFIG: BrokerConfig = BrokerConfig::new(1, 500, true);

/// Wider configuration for spreading load across group members
pub const MULTI_PARTITION_CONFIG: BrokerConfig = BrokerConfig::new(4, 1_000, true);

/// Where a consumer starts reading a partition that has no committed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetReset {
    /// From the first record still in the log
    #[default]
    Earliest,
    /// From the next record appended after assignment
    Latest,
}
