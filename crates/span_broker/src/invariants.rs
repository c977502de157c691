//! Debug assertion macros for log and consumer-group invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`).

// =============================================================================
// Dense offsets
// =============================================================================

/// Assert that an appended record received the next offset in its partition.
///
/// **Invariant**: `offset(new) == len(log) before append`
///
/// Used in: `Partition::append()`
macro_rules! debug_assert_dense_offset {
    ($assigned:expr, $log_len:expr) => {
        debug_assert!(
            $assigned == $log_len,
            "dense offset violated: assigned offset {} but log held {} records",
            $assigned,
            $log_len
        )
    };
}

// =============================================================================
// Monotonic positions
// =============================================================================

/// Assert that a consumer position or committed offset never moves backwards.
///
/// **Invariant**: `new_position ≥ old_position`
///
/// Used in: `Consumer::poll()`, `GroupState::commit()`
macro_rules! debug_assert_monotonic_position {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} moved backwards from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Exclusive assignment
// =============================================================================

/// Assert that every partition is owned by exactly one member after a rebalance.
///
/// **Invariant**: `members > 0 → Σ |assignment(m)| == partition_count`
///
/// Used in: `GroupState::rebalance()`
macro_rules! debug_assert_full_assignment {
    ($assigned:expr, $partitions:expr, $members:expr) => {
        debug_assert!(
            $members == 0 || $assigned == $partitions,
            "assignment covers {} of {} partitions across {} members",
            $assigned,
            $partitions,
            $members
        )
    };
}

pub(crate) use debug_assert_dense_offset;
pub(crate) use debug_assert_full_assignment;
pub(crate) use debug_assert_monotonic_position;
