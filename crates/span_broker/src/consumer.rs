use crate::broker::BrokerInner;
use crate::config::OffsetReset;
use crate::error::BrokerError;
use crate::group::{GroupKey, GroupState};
#[cfg(debug_assertions)]
use crate::invariants::debug_assert_monotonic_position;
use crate::record::Record;
use crate::sync::lock;
use crate::topic::Topic;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct ConsumerState {
    /// Group generation the positions below were derived from
    generation: u64,
    /// Next offset to fetch, per assigned partition
    positions: BTreeMap<u32, u64>,
    /// Index of the partition the next poll starts at
    next_start: usize,
}

/// A member of a consumer group reading one topic.
///
/// Positions are local to the member; progress becomes visible to the rest
/// of the group only through [`commit`](Consumer::commit). When the group
/// rebalances, a newly assigned partition resumes at its committed offset or,
/// lacking one, at the [`OffsetReset`] position.
///
/// Dropping the consumer leaves the group.
#[derive(Debug)]
pub struct Consumer {
    broker: Arc<BrokerInner>,
    topic: Arc<Topic>,
    group: String,
    member: u64,
    reset: OffsetReset,
    state: Mutex<ConsumerState>,
    closed: AtomicBool,
}

impl Consumer {
    pub(crate) fn new(
        broker: Arc<BrokerInner>,
        topic: Arc<Topic>,
        group: String,
        member: u64,
        reset: OffsetReset,
    ) -> Self {
        Self {
            broker,
            topic,
            group,
            member,
            reset,
            state: Mutex::new(ConsumerState::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Topic this consumer reads.
    pub fn topic(&self) -> &str {
        self.topic.name()
    }

    /// Group this consumer belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Member id assigned by the broker.
    pub fn member_id(&self) -> u64 {
        self.member
    }

    /// Returns `true` once [`close`](Consumer::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Notification fired whenever a record is appended to the topic.
    pub fn data_notify(&self) -> Arc<Notify> {
        self.topic.data_notify()
    }

    /// Partitions currently assigned to this member.
    pub fn assignment(&self) -> Result<Vec<u32>, BrokerError> {
        self.check_open()?;
        let mut groups = lock(&self.broker.groups);
        let group = self.group_state(&mut groups);
        Ok(group.assignment(self.member))
    }

    /// Fetches up to `max_records` records from the assigned partitions.
    ///
    /// The local position advances past everything returned; call
    /// [`commit`](Consumer::commit) once a record has been handled.
    pub fn poll(&self, max_records: usize) -> Result<Vec<Record>, BrokerError> {
        self.check_open()?;
        let limit = max_records.min(self.broker.config.max_fetch_records).max(1);

        let mut state = lock(&self.state);
        self.refresh_positions(&mut state)?;

        // Rotate the starting partition so a backlog on one cannot starve the rest
        let partitions: Vec<u32> = state.positions.keys().copied().collect();
        if partitions.is_empty() {
            return Ok(Vec::new());
        }
        let start = state.next_start % partitions.len();
        state.next_start = start + 1;

        let mut records = Vec::new();
        for i in 0..partitions.len() {
            if records.len() >= limit {
                break;
            }
            let partition = partitions[(start + i) % partitions.len()];
            let Some(position) = state.positions.get_mut(&partition) else {
                continue;
            };
            let batch = self.topic.read(partition, *position, limit - records.len())?;
            if let Some(last) = batch.last() {
                let next = last.offset + 1;

                #[cfg(debug_assertions)]
                debug_assert_monotonic_position!("consumer position", *position, next);

                *position = next;
            }
            records.extend(batch);
        }
        Ok(records)
    }

    /// Derives the starting positions right after joining, so that
    /// [`OffsetReset::Latest`] means "latest at join time".
    pub(crate) fn init_positions(&self) -> Result<(), BrokerError> {
        let mut state = lock(&self.state);
        self.refresh_positions(&mut state)
    }

    /// Commits `record` as processed for the group.
    ///
    /// Returns `false` when the partition is no longer assigned to this
    /// member (the commit is then ignored, as the new owner re-reads it).
    pub fn commit(&self, record: &Record) -> Result<bool, BrokerError> {
        self.check_open()?;
        let mut groups = lock(&self.broker.groups);
        let group = self.group_state(&mut groups);
        if !group.owns(self.member, record.partition) {
            return Ok(false);
        }
        group.commit(record.partition, record.offset + 1);
        Ok(true)
    }

    /// Leaves the group. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut groups = lock(&self.broker.groups);
        let key = (self.topic.name().to_string(), self.group.clone());
        if let Some(group) = groups.get_mut(&key) {
            group.leave(self.member);
            if group.member_count() == 0 {
                debug!(topic = self.topic.name(), group = %self.group, "group is now empty");
            }
        }
        debug!(topic = self.topic.name(), group = %self.group, member = self.member, "consumer left group");
    }

    fn check_open(&self) -> Result<(), BrokerError> {
        self.broker.ensure_running()?;
        if self.is_closed() {
            return Err(BrokerError::ConsumerClosed);
        }
        Ok(())
    }

    /// Re-derives positions when the group generation moved on.
    fn refresh_positions(&self, state: &mut ConsumerState) -> Result<(), BrokerError> {
        let mut groups = lock(&self.broker.groups);
        let group = self.group_state(&mut groups);
        if group.generation() == state.generation {
            return Ok(());
        }

        let mut positions = BTreeMap::new();
        for partition in group.assignment(self.member) {
            let start = match (state.positions.get(&partition), group.committed(partition)) {
                // Still ours: keep reading where we were
                (Some(&current), committed) => current.max(committed.unwrap_or(0)),
                (None, Some(committed)) => committed,
                (None, None) => match self.reset {
                    OffsetReset::Earliest => 0,
                    OffsetReset::Latest => self.topic.end_offset(partition)?,
                },
            };
            positions.insert(partition, start);
        }

        debug!(
            topic = self.topic.name(),
            group = %self.group,
            member = self.member,
            generation = group.generation(),
            partitions = ?positions.keys().collect::<Vec<_>>(),
            "assignment refreshed"
        );
        state.generation = group.generation();
        state.positions = positions;
        Ok(())
    }

    /// Group state for this member, rebalanced first if the topic grew.
    fn group_state<'a>(
        &self,
        groups: &'a mut HashMap<GroupKey, GroupState>,
    ) -> &'a mut GroupState {
        let key = (self.topic.name().to_string(), self.group.clone());
        let group = groups.entry(key).or_default();
        let partitions = self.topic.partition_count();
        if group.partition_count() != partitions {
            group.rebalance(partitions);
        }
        group
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use crate::{Broker, OffsetReset, ProducerRecord};

    #[test]
    fn test_poll_and_commit() {
        let broker = Broker::default();
        broker.create_topic("spans", 1).unwrap();
        for i in 0..3u8 {
            broker.send("spans", ProducerRecord::new(vec![i]), None).unwrap();
        }

        let consumer = broker.consumer("spans", "g", OffsetReset::Earliest).unwrap();
        let records = consumer.poll(10).unwrap();
        assert_eq!(records.len(), 3);
        assert!(consumer.poll(10).unwrap().is_empty());

        assert!(consumer.commit(&records[1]).unwrap());
        assert_eq!(broker.committed_offset("spans", "g", 0), Some(2));
    }

    #[test]
    fn test_latest_skips_existing_records() {
        let broker = Broker::default();
        broker.send("spans", ProducerRecord::new("old"), None).unwrap();

        let consumer = broker.consumer("spans", "g", OffsetReset::Latest).unwrap();
        assert!(consumer.poll(10).unwrap().is_empty());

        broker.send("spans", ProducerRecord::new("new"), None).unwrap();
        let records = consumer.poll(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].payload[..], b"new");
    }

    #[test]
    fn test_latest_is_fixed_at_join_time() {
        let broker = Broker::default();
        broker.send("spans", ProducerRecord::new("old"), None).unwrap();

        let consumer = broker.consumer("spans", "g", OffsetReset::Latest).unwrap();
        // Published before the first poll but after joining
        broker.send("spans", ProducerRecord::new("new"), None).unwrap();

        let records = consumer.poll(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].payload[..], b"new");
    }

    #[test]
    fn test_backlog_does_not_starve_other_partitions() {
        let broker = Broker::default();
        broker.create_topic("spans", 2).unwrap();
        for _ in 0..10 {
            broker.send("spans", ProducerRecord::new("p0"), Some(0)).unwrap();
        }
        broker.send("spans", ProducerRecord::new("p1"), Some(1)).unwrap();

        let consumer = broker.consumer("spans", "g", OffsetReset::Earliest).unwrap();
        let mut partitions = Vec::new();
        for _ in 0..2 {
            partitions.extend(consumer.poll(2).unwrap().into_iter().map(|r| r.partition));
        }
        assert!(partitions.contains(&1), "partition 1 never polled: {partitions:?}");
    }

    #[test]
    fn test_new_member_resumes_from_committed_offset() {
        let broker = Broker::default();
        for i in 0..4u8 {
            broker.send("spans", ProducerRecord::new(vec![i]), None).unwrap();
        }

        let first = broker.consumer("spans", "g", OffsetReset::Earliest).unwrap();
        let records = first.poll(2).unwrap();
        assert_eq!(records.len(), 2);
        first.commit(&records[1]).unwrap();
        first.close();

        let second = broker.consumer("spans", "g", OffsetReset::Earliest).unwrap();
        let rest = second.poll(10).unwrap();
        assert_eq!(rest.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let broker = Broker::default();
        let consumer = broker.consumer("spans", "g", OffsetReset::Earliest).unwrap();
        assert_eq!(broker.group_members("spans", "g"), 1);

        consumer.close();
        consumer.close();
        assert_eq!(broker.group_members("spans", "g"), 0);
        assert!(consumer.poll(1).is_err());
    }

    #[test]
    fn test_stale_commit_is_ignored() {
        let broker = Broker::default();
        broker.create_topic("spans", 2).unwrap();
        broker.send("spans", ProducerRecord::new("a"), Some(1)).unwrap();

        let a = broker.consumer("spans", "g", OffsetReset::Earliest).unwrap();
        let records = a.poll(10).unwrap();
        assert_eq!(records.len(), 1);

        // Second member takes partition 1 away from `a`
        let _b = broker.consumer("spans", "g", OffsetReset::Earliest).unwrap();
        assert_eq!(a.assignment().unwrap(), vec![0]);
        assert!(!a.commit(&records[0]).unwrap());
        assert_eq!(broker.committed_offset("spans", "g", 1), None);
    }
}
