//! Consumer-group membership, partition assignment and committed offsets.

#[cfg(debug_assertions)]
use crate::invariants::{debug_assert_full_assignment, debug_assert_monotonic_position};
use std::collections::{BTreeSet, HashMap};

/// Identifies a group: offsets are scoped per (topic, group).
pub(crate) type GroupKey = (String, String);

/// State of one consumer group on one topic.
///
/// Partitions are spread round-robin over the members in id order. Each
/// join or leave bumps the generation so that members refresh their
/// assignment on the next poll.
#[derive(Debug, Default)]
pub(crate) struct GroupState {
    generation: u64,
    partition_count: u32,
    members: BTreeSet<u64>,
    assignments: HashMap<u64, Vec<u32>>,
    committed: HashMap<u32, u64>,
}

impl GroupState {
    pub(crate) fn join(&mut self, member: u64, partition_count: u32) {
        self.members.insert(member);
        self.rebalance(partition_count);
    }

    pub(crate) fn leave(&mut self, member: u64) -> bool {
        let removed = self.members.remove(&member);
        if removed {
            self.rebalance(self.partition_count);
        }
        removed
    }

    pub(crate) fn rebalance(&mut self, partition_count: u32) {
        self.generation += 1;
        self.partition_count = partition_count;
        self.assignments.clear();

        let members: Vec<u64> = self.members.iter().copied().collect();
        if members.is_empty() {
            return;
        }
        for partition in 0..partition_count {
            let owner = members[partition as usize % members.len()];
            self.assignments.entry(owner).or_default().push(partition);
        }

        #[cfg(debug_assertions)]
        debug_assert_full_assignment!(
            self.assignments.values().map(Vec::len).sum::<usize>(),
            partition_count as usize,
            members.len()
        );
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn partition_count(&self) -> u32 {
        self.partition_count
    }

    pub(crate) fn member_count(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn assignment(&self, member: u64) -> Vec<u32> {
        self.assignments.get(&member).cloned().unwrap_or_default()
    }

    pub(crate) fn owns(&self, member: u64, partition: u32) -> bool {
        self.assignments
            .get(&member)
            .is_some_and(|parts| parts.contains(&partition))
    }

    /// Offset of the next record the group has not yet processed.
    pub(crate) fn committed(&self, partition: u32) -> Option<u64> {
        self.committed.get(&partition).copied()
    }

    /// Records `next_offset` as committed. Commits never move backwards.
    pub(crate) fn commit(&mut self, partition: u32, next_offset: u64) {
        let entry = self.committed.entry(partition).or_insert(0);
        let old = *entry;
        *entry = old.max(next_offset);

        #[cfg(debug_assertions)]
        debug_assert_monotonic_position!("committed offset", old, *entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_member_owns_everything() {
        let mut group = GroupState::default();
        group.join(7, 3);
        assert_eq!(group.assignment(7), vec![0, 1, 2]);
        assert_eq!(group.generation(), 1);
    }

    #[test]
    fn test_rebalance_on_join_and_leave() {
        let mut group = GroupState::default();
        group.join(1, 4);
        group.join(2, 4);

        assert_eq!(group.assignment(1), vec![0, 2]);
        assert_eq!(group.assignment(2), vec![1, 3]);
        assert!(group.owns(2, 3));
        assert!(!group.owns(1, 3));

        assert!(group.leave(1));
        assert_eq!(group.assignment(2), vec![0, 1, 2, 3]);
        assert_eq!(group.generation(), 3);

        // Leaving twice is a no-op
        assert!(!group.leave(1));
        assert_eq!(group.generation(), 3);
    }

    #[test]
    fn test_more_members_than_partitions() {
        let mut group = GroupState::default();
        group.join(1, 1);
        group.join(2, 1);
        assert_eq!(group.assignment(1), vec![0]);
        assert!(group.assignment(2).is_empty());
    }

    #[test]
    fn test_commit_only_moves_forward() {
        let mut group = GroupState::default();
        assert_eq!(group.committed(0), None);

        group.commit(0, 5);
        group.commit(0, 3);
        assert_eq!(group.committed(0), Some(5));
    }
}
