//! Topics and their append-only partition logs.

#[cfg(debug_assertions)]
use crate::invariants::debug_assert_dense_offset;
use crate::error::BrokerError;
use crate::record::{now_millis, ProducerRecord, Record, RecordMetadata};
use crate::sync::{read, write};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;

/// One append-only log.
#[derive(Debug, Default)]
struct Partition {
    log: RwLock<Vec<Record>>,
}

impl Partition {
    fn append(&self, topic: &str, index: u32, record: ProducerRecord) -> u64 {
        let mut log = write(&self.log);
        let offset = log.len() as u64;

        #[cfg(debug_assertions)]
        debug_assert_dense_offset!(offset, log.last().map_or(0, |r| r.offset + 1));

        log.push(Record {
            topic: topic.to_string(),
            partition: index,
            offset,
            key: record.key,
            headers: record.headers,
            payload: record.payload,
            timestamp_millis: now_millis(),
        });
        offset
    }

    fn read(&self, from: u64, max: usize) -> Vec<Record> {
        let log = read(&self.log);
        let start = (from as usize).min(log.len());
        log[start..].iter().take(max).cloned().collect()
    }

    fn end_offset(&self) -> u64 {
        read(&self.log).len() as u64
    }
}

/// A named, partitioned topic.
///
/// Partition count can only grow. Every append wakes the tasks waiting on
/// [`Topic::data_notify`].
#[derive(Debug)]
pub struct Topic {
    name: String,
    partitions: RwLock<Vec<Arc<Partition>>>,
    next_partition: AtomicU32,
    data_notify: Arc<Notify>,
}

impl Topic {
    pub(crate) fn new(name: &str, partitions: u32) -> Result<Self, BrokerError> {
        if partitions == 0 {
            return Err(BrokerError::ZeroPartitions(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            partitions: RwLock::new((0..partitions).map(|_| Arc::default()).collect()),
            next_partition: AtomicU32::new(0),
            data_notify: Arc::new(Notify::new()),
        })
    }

    /// Topic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current number of partitions.
    pub fn partition_count(&self) -> u32 {
        read(&self.partitions).len() as u32
    }

    /// Grows the topic to at least `count` partitions. Returns the resulting count.
    pub(crate) fn ensure_partitions(&self, count: u32) -> u32 {
        let mut partitions = write(&self.partitions);
        while (partitions.len() as u32) < count {
            partitions.push(Arc::default());
        }
        partitions.len() as u32
    }

    /// Notification fired after every append.
    pub fn data_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.data_notify)
    }

    /// Offset the next record appended to `partition` will receive.
    pub fn end_offset(&self, partition: u32) -> Result<u64, BrokerError> {
        Ok(self.partition(partition)?.end_offset())
    }

    /// Reads up to `max` records from `partition` starting at offset `from`.
    pub fn read(&self, partition: u32, from: u64, max: usize) -> Result<Vec<Record>, BrokerError> {
        Ok(self.partition(partition)?.read(from, max))
    }

    pub(crate) fn append(
        &self,
        record: ProducerRecord,
        partition: Option<u32>,
    ) -> Result<RecordMetadata, BrokerError> {
        let index = match partition {
            Some(p) => p,
            None => self.select_partition(record.key.as_deref()),
        };
        let offset = self.partition(index)?.append(&self.name, index, record);
        self.data_notify.notify_waiters();
        Ok(RecordMetadata {
            partition: index,
            offset,
        })
    }

    /// Keyed records hash onto a fixed partition; unkeyed records rotate.
    fn select_partition(&self, key: Option<&[u8]>) -> u32 {
        let count = self.partition_count().max(1);
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % u64::from(count)) as u32
            }
            None => self.next_partition.fetch_add(1, Ordering::Relaxed) % count,
        }
    }

    fn partition(&self, index: u32) -> Result<Arc<Partition>, BrokerError> {
        let partitions = read(&self.partitions);
        partitions
            .get(index as usize)
            .cloned()
            .ok_or_else(|| BrokerError::InvalidPartition {
                topic: self.name.clone(),
                partition: index,
                count: partitions.len() as u32,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_dense_per_partition() {
        let topic = Topic::new("spans", 2).unwrap();

        for i in 0..3u8 {
            let meta = topic.append(ProducerRecord::new(vec![i]), Some(0)).unwrap();
            assert_eq!(meta.offset, u64::from(i));
        }
        let meta = topic.append(ProducerRecord::new(vec![9]), Some(1)).unwrap();
        assert_eq!(meta.offset, 0);

        assert_eq!(topic.end_offset(0).unwrap(), 3);
        assert_eq!(topic.end_offset(1).unwrap(), 1);
    }

    #[test]
    fn test_same_key_same_partition() {
        let topic = Topic::new("spans", 8).unwrap();

        let first = topic
            .append(ProducerRecord::new("a").with_key("trace-1"), None)
            .unwrap();
        for _ in 0..10 {
            let meta = topic
                .append(ProducerRecord::new("b").with_key("trace-1"), None)
                .unwrap();
            assert_eq!(meta.partition, first.partition);
        }
    }

    #[test]
    fn test_unkeyed_records_rotate() {
        let topic = Topic::new("spans", 3).unwrap();
        let partitions: Vec<u32> = (0..6)
            .map(|_| topic.append(ProducerRecord::new("x"), None).unwrap().partition)
            .collect();
        assert_eq!(partitions, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_invalid_partition() {
        let topic = Topic::new("spans", 1).unwrap();
        let err = topic.append(ProducerRecord::new("x"), Some(5)).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidPartition { partition: 5, count: 1, .. }));
    }

    #[test]
    fn test_zero_partitions_rejected() {
        assert!(matches!(Topic::new("spans", 0), Err(BrokerError::ZeroPartitions(_))));
    }

    #[test]
    fn test_partitions_only_grow() {
        let topic = Topic::new("spans", 2).unwrap();
        assert_eq!(topic.ensure_partitions(4), 4);
        assert_eq!(topic.ensure_partitions(1), 4);
    }

    #[test]
    fn test_read_window() {
        let topic = Topic::new("spans", 1).unwrap();
        for i in 0..5u8 {
            topic.append(ProducerRecord::new(vec![i]), Some(0)).unwrap();
        }

        let records = topic.read(0, 2, 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 2);
        assert_eq!(records[1].offset, 3);

        assert!(topic.read(0, 10, 5).unwrap().is_empty());
    }
}
