use span_broker::OffsetReset;
use std::time::Duration;

/// Binder-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinderConfig {
    /// Create missing destinations at bind time
    pub auto_create_topics: bool,
    /// Lower bound on the partition count of provisioned destinations
    pub min_partition_count: u32,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            auto_create_topics: true,
            min_partition_count: 1,
        }
    }
}

impl BinderConfig {
    pub fn with_auto_create_topics(mut self, enabled: bool) -> Self {
        self.auto_create_topics = enabled;
        self
    }

    pub fn with_min_partition_count(mut self, count: u32) -> Self {
        self.min_partition_count = count;
        self
    }
}

/// Settings of a producer binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerProperties {
    /// Partitions to provision for the destination
    pub partition_count: u32,
    /// Message header whose value becomes the record key
    pub partition_key_header: Option<String>,
}

impl Default for ProducerProperties {
    fn default() -> Self {
        Self {
            partition_count: 1,
            partition_key_header: None,
        }
    }
}

impl ProducerProperties {
    pub fn with_partition_count(mut self, count: u32) -> Self {
        self.partition_count = count;
        self
    }

    pub fn with_partition_key_header(mut self, header: impl Into<String>) -> Self {
        self.partition_key_header = Some(header.into());
        self
    }
}

/// Settings of a consumer binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerProperties {
    /// Where a group without committed offsets starts; `None` picks
    /// earliest for named groups and latest for anonymous ones
    pub start_offset: Option<OffsetReset>,
    /// Records fetched per poll
    pub max_poll_records: usize,
    /// Fallback poll period when no data notification arrives
    pub poll_interval: Duration,
    /// Delivery attempts per record, including the first
    pub max_attempts: u32,
    pub back_off_initial: Duration,
    pub back_off_multiplier: f64,
    pub back_off_max: Duration,
}

impl Default for ConsumerProperties {
    fn default() -> Self {
        Self {
            start_offset: None,
            max_poll_records: 100,
            poll_interval: Duration::from_millis(100),
            max_attempts: 3,
            back_off_initial: Duration::from_millis(100),
            back_off_multiplier: 2.0,
            back_off_max: Duration::from_secs(1),
        }
    }
}

impl ConsumerProperties {
    pub fn with_start_offset(mut self, reset: OffsetReset) -> Self {
        self.start_offset = Some(reset);
        self
    }

    pub fn with_max_poll_records(mut self, max: usize) -> Self {
        self.max_poll_records = max;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_back_off(mut self, initial: Duration, multiplier: f64, max: Duration) -> Self {
        self.back_off_initial = initial;
        self.back_off_multiplier = multiplier;
        self.back_off_max = max;
        self
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn back_off(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.back_off_multiplier.max(1.0).powi(exponent);
        let secs = self.back_off_initial.as_secs_f64() * factor;
        if secs < self.back_off_max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.back_off_max
        }
    }
}
