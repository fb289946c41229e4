//! G-Counter: Grow-only Counter CRDT
//!
//! A state-based CRDT that only supports increments. Each replica owns one
//! entry of a replica → count map and only ever raises its own entry; merging
//! takes the pointwise maximum.
//!
//! # Properties
//!
//! - **Convergence:** All replicas converge to same value
//! - **Commutativity:** Merge order does not matter
//! - **Idempotence:** Merging the same state twice has no effect
//!
//! # Example
//!
//! ```
//! use rga_sync::GCounter;
//!
//! let mut counter1 = GCounter::new("replica1");
//! let mut counter2 = GCounter::new("replica2");
//!
//! counter1.increment(5).unwrap();
//! counter2.increment(3).unwrap();
//!
//! counter1.merge(&counter2);
//! assert_eq!(counter1.value(), 8);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crdt::types::ReplicaId;
use crate::error::CounterError;

/// Grow-only counter.
///
/// Equality compares the count mapping only, not the owning replica, so two
/// replicas that merged the same states compare equal.
#[derive(Debug, Clone)]
pub struct GCounter {
    replica_id: ReplicaId,
    counts: BTreeMap<ReplicaId, u64>,
}

/// Exchange form of a [`GCounter`]: `{ replicaId, counts: [[replica, count], ...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GCounterState {
    pub replica_id: ReplicaId,
    pub counts: Vec<(ReplicaId, u64)>,
}

impl GCounter {
    /// Creates a counter for `replica_id` with its own entry at zero.
    pub fn new(replica_id: impl Into<ReplicaId>) -> Self {
        let replica_id = replica_id.into();
        let mut counts = BTreeMap::new();
        counts.insert(replica_id.clone(), 0);
        GCounter { replica_id, counts }
    }

    /// Adds `delta` to this replica's entry.
    ///
    /// Negative deltas are rejected: decrementing requires a PN-Counter.
    pub fn increment(&mut self, delta: i64) -> Result<(), CounterError> {
        let delta = u64::try_from(delta).map_err(|_| CounterError::NegativeIncrement(delta))?;
        let entry = self.counts.entry(self.replica_id.clone()).or_insert(0);
        *entry = entry.checked_add(delta).ok_or(CounterError::Overflow)?;
        Ok(())
    }

    /// Sum of all entries.
    pub fn value(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |sum, count| sum.saturating_add(*count))
    }

    /// Merges another counter's state into this one by taking the maximum of
    /// each entry. Commutative, associative and idempotent.
    pub fn merge(&mut self, other: &GCounter) {
        for (replica, &count) in &other.counts {
            let entry = self.counts.entry(replica.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    /// Count contributed by `replica`, zero if unknown.
    pub fn count_for(&self, replica: &ReplicaId) -> u64 {
        self.counts.get(replica).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<ReplicaId, u64> {
        &self.counts
    }

    pub fn state(&self) -> GCounterState {
        GCounterState {
            replica_id: self.replica_id.clone(),
            counts: self
                .counts
                .iter()
                .map(|(replica, &count)| (replica.clone(), count))
                .collect(),
        }
    }

    /// Rebuilds a counter from its exchange form. Repeated entries keep their
    /// maximum.
    pub fn from_state(state: GCounterState) -> Self {
        let mut counter = GCounter::new(state.replica_id);
        for (replica, count) in state.counts {
            let entry = counter.counts.entry(replica).or_insert(0);
            *entry = (*entry).max(count);
        }
        counter
    }
}

impl PartialEq for GCounter {
    fn eq(&self, other: &Self) -> bool {
        self.counts == other.counts
    }
}

impl Eq for GCounter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_creation() {
        let counter = GCounter::new("replica1");
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.replica_id().as_str(), "replica1");
        assert_eq!(counter.counts().len(), 1);
    }

    #[test]
    fn test_increment() {
        let mut counter = GCounter::new("replica1");
        counter.increment(5).unwrap();
        counter.increment(3).unwrap();
        counter.increment(0).unwrap();
        assert_eq!(counter.value(), 8);
    }

    #[test]
    fn test_negative_increment_is_rejected_without_mutation() {
        let mut counter = GCounter::new("replica1");
        counter.increment(2).unwrap();

        assert_eq!(
            counter.increment(-1),
            Err(CounterError::NegativeIncrement(-1))
        );
        assert_eq!(counter.value(), 2);
    }

    #[test]
    fn test_overflow_is_rejected_without_mutation() {
        let mut counter = GCounter::from_state(GCounterState {
            replica_id: ReplicaId::from("a"),
            counts: vec![(ReplicaId::from("a"), u64::MAX - 1)],
        });
        assert_eq!(counter.increment(2), Err(CounterError::Overflow));
        assert_eq!(counter.count_for(&ReplicaId::from("a")), u64::MAX - 1);
    }

    #[test]
    fn test_merge_same_replica() {
        let mut counter1 = GCounter::new("replica1");
        let mut counter2 = GCounter::new("replica1");

        counter1.increment(5).unwrap();
        counter2.increment(3).unwrap();

        counter1.merge(&counter2);

        // Should take maximum (5)
        assert_eq!(counter1.value(), 5);
    }

    #[test]
    fn test_merge_takes_pointwise_max() {
        let mut a = GCounter::new("a");
        let mut b = GCounter::new("b");
        a.increment(4).unwrap();
        b.increment(7).unwrap();

        let mut stale_a = GCounter::new("a");
        stale_a.increment(1).unwrap();
        b.merge(&stale_a);
        b.merge(&a);

        assert_eq!(b.count_for(&ReplicaId::from("a")), 4);
        assert_eq!(b.count_for(&ReplicaId::from("b")), 7);
        assert_eq!(b.value(), 11);
    }

    #[test]
    fn test_equality_is_structural() {
        let mut a = GCounter::new("a");
        let mut b = GCounter::new("b");
        a.increment(1).unwrap();
        b.increment(1).unwrap();

        // Same value, different mapping
        assert_eq!(a.value(), b.value());
        assert_ne!(a, b);

        a.merge(&b);
        b.merge(&a);
        assert_eq!(a, b);
    }

    #[test]
    fn test_state_roundtrip_keeps_mapping() {
        let mut a = GCounter::new("a");
        a.increment(3).unwrap();
        let mut b = GCounter::new("b");
        b.increment(2).unwrap();
        a.merge(&b);

        let restored = GCounter::from_state(a.state());
        assert_eq!(restored, a);
        assert_eq!(restored.replica_id().as_str(), "a");
    }
}
