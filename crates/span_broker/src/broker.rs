use crate::config::{BrokerConfig, OffsetReset};
use crate::consumer::Consumer;
use crate::error::BrokerError;
use crate::group::{GroupKey, GroupState};
use crate::record::{ProducerRecord, RecordMetadata};
use crate::sync::{lock, read, write};
use crate::topic::Topic;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

#[derive(Debug)]
pub(crate) struct BrokerInner {
    pub(crate) config: BrokerConfig,
    running: AtomicBool,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    pub(crate) groups: Mutex<HashMap<GroupKey, GroupState>>,
    next_member: AtomicU64,
}

impl BrokerInner {
    pub(crate) fn ensure_running(&self) -> Result<(), BrokerError> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BrokerError::Unavailable)
        }
    }
}

/// Handle to an in-process partitioned log broker.
///
/// Cloning is cheap; all clones talk to the same broker. Once
/// [`shutdown`](Broker::shutdown) is called every operation fails fast with
/// [`BrokerError::Unavailable`]. The broker never retries on its own.
#[derive(Debug, Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Starts a broker with the given configuration.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                config,
                running: AtomicBool::new(true),
                topics: RwLock::new(HashMap::new()),
                groups: Mutex::new(HashMap::new()),
                next_member: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Returns `true` until the broker is shut down.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Fails with [`BrokerError::Unavailable`] when the broker is down.
    pub fn ensure_running(&self) -> Result<(), BrokerError> {
        self.inner.ensure_running()
    }

    /// Creates `name` with `partitions` partitions.
    ///
    /// Idempotent: an existing topic is returned, grown to `partitions` if it
    /// currently has fewer.
    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<Arc<Topic>, BrokerError> {
        self.ensure_running()?;

        if let Some(topic) = read(&self.inner.topics).get(name) {
            topic.ensure_partitions(partitions);
            return Ok(Arc::clone(topic));
        }

        let mut topics = write(&self.inner.topics);
        if let Some(topic) = topics.get(name) {
            topic.ensure_partitions(partitions);
            return Ok(Arc::clone(topic));
        }
        let topic = Arc::new(Topic::new(name, partitions)?);
        topics.insert(name.to_string(), Arc::clone(&topic));
        info!(topic = name, partitions, "created topic");
        Ok(topic)
    }

    /// Looks up an existing topic.
    pub fn topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        self.ensure_running()?;
        read(&self.inner.topics)
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownTopic(name.to_string()))
    }

    /// Names of all topics, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.inner.topics).keys().cloned().collect();
        names.sort();
        names
    }

    /// Appends a record to `topic`.
    ///
    /// `partition` pins the record; otherwise it is placed by key hash, or
    /// round-robin when unkeyed.
    pub fn send(
        &self,
        topic: &str,
        record: ProducerRecord,
        partition: Option<u32>,
    ) -> Result<RecordMetadata, BrokerError> {
        let topic = self.resolve_topic(topic)?;
        let meta = topic.append(record, partition)?;
        debug!(
            topic = topic.name(),
            partition = meta.partition,
            offset = meta.offset,
            "appended record"
        );
        Ok(meta)
    }

    /// Joins `group` on `topic` and returns a consumer for the assigned partitions.
    pub fn consumer(&self, topic: &str, group: &str, reset: OffsetReset) -> Result<Consumer, BrokerError> {
        let topic = self.resolve_topic(topic)?;
        let member = self.inner.next_member.fetch_add(1, Ordering::Relaxed);
        let key = (topic.name().to_string(), group.to_string());

        lock(&self.inner.groups)
            .entry(key)
            .or_default()
            .join(member, topic.partition_count());

        debug!(topic = topic.name(), group, member, "consumer joined group");
        let consumer = Consumer::new(
            Arc::clone(&self.inner),
            topic,
            group.to_string(),
            member,
            reset,
        );
        consumer.init_positions()?;
        Ok(consumer)
    }

    /// Committed offset of `group` for one partition, if any.
    pub fn committed_offset(&self, topic: &str, group: &str, partition: u32) -> Option<u64> {
        lock(&self.inner.groups)
            .get(&(topic.to_string(), group.to_string()))
            .and_then(|g| g.committed(partition))
    }

    /// Number of live members in `group` on `topic`.
    pub fn group_members(&self, topic: &str, group: &str) -> usize {
        lock(&self.inner.groups)
            .get(&(topic.to_string(), group.to_string()))
            .map_or(0, GroupState::member_count)
    }

    /// Stops the broker. Idempotent.
    ///
    /// Waiting consumers are woken so that they observe the shutdown.
    pub fn shutdown(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            for topic in read(&self.inner.topics).values() {
                topic.data_notify().notify_waiters();
            }
            info!("broker shut down");
        }
    }

    fn resolve_topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        match self.topic(name) {
            Err(BrokerError::UnknownTopic(_)) if self.inner.config.auto_create_topics => {
                self.create_topic(name, self.inner.config.default_partitions)
            }
            other => other,
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}
