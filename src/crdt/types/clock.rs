//! Lamport clock for coining operation ids.
//!
//! Each sequence owns one clock. The clock is raised whenever an id from any
//! replica is observed, so the next local id always sorts after everything the
//! replica has already seen.

use crate::crdt::types::operation_id::OperationId;
use crate::crdt::types::replica::ReplicaId;

/// Largest counter a replica accepts from outside.
///
/// Remote ids and snapshots above it are refused, so observation alone can
/// never bring the clock within reach of `u64::MAX`.
pub const MAX_COUNTER: u64 = u64::MAX >> 1;

#[derive(Debug, Clone)]
pub struct LamportClock {
    counter: u64,
    replica_id: ReplicaId,
}

impl LamportClock {
    /// Creates a new Lamport clock starting at zero.
    pub fn new(replica_id: ReplicaId) -> Self {
        LamportClock {
            counter: 0,
            replica_id,
        }
    }

    /// Coins the next id for this replica.
    ///
    /// Observation stops at [`MAX_COUNTER`], leaving 2^63 local ticks before
    /// the counter could overflow.
    pub fn tick(&mut self) -> OperationId {
        self.counter += 1;
        OperationId {
            counter: self.counter,
            replica_id: self.replica_id.clone(),
        }
    }

    /// Raises the clock to at least `counter`, capped at [`MAX_COUNTER`].
    /// Never moves it backwards.
    pub fn observe(&mut self, counter: u64) {
        self.counter = self.counter.max(counter.min(MAX_COUNTER));
    }

    /// Whether an id with this counter may be taken from another replica.
    pub fn accepts(counter: u64) -> bool {
        counter <= MAX_COUNTER
    }

    pub fn current(&self) -> u64 {
        self.counter
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }
}
