//! Per-document operation counters.
//!
//! Counts are kept in grow-only counters so that metrics gathered by several
//! servers hosting the same document can be merged without double counting.

use serde::{Deserialize, Serialize};

use crate::crdt::{GCounter, GCounterState, Operation, ReplicaId, RgaMetrics};
use crate::error::CounterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetrics {
    operations: GCounter,
    inserts: GCounter,
    deletes: GCounter,
}

/// Exchange form of [`DocumentMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsState {
    pub operation_counter: GCounterState,
    pub insert_counter: GCounterState,
    pub delete_counter: GCounterState,
}

/// Metrics as reported over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub operation_count: u64,
    pub insert_operations: u64,
    pub delete_operations: u64,
    pub sequence: RgaMetrics,
    pub counters: MetricsState,
}

impl DocumentMetrics {
    pub fn new(replica_id: &ReplicaId) -> Self {
        DocumentMetrics {
            operations: GCounter::new(replica_id.clone()),
            inserts: GCounter::new(replica_id.clone()),
            deletes: GCounter::new(replica_id.clone()),
        }
    }

    pub fn from_state(state: MetricsState) -> Self {
        DocumentMetrics {
            operations: GCounter::from_state(state.operation_counter),
            inserts: GCounter::from_state(state.insert_counter),
            deletes: GCounter::from_state(state.delete_counter),
        }
    }

    /// Counts every operation of a drained delta.
    pub fn record<T>(&mut self, operations: &[Operation<T>]) {
        let inserts = operations.iter().filter(|op| op.is_insert()).count();
        let deletes = operations.len() - inserts;
        if let Err(err) = self.bump(inserts, deletes) {
            tracing::warn!("metrics counter not updated: {err}");
        }
    }

    fn bump(&mut self, inserts: usize, deletes: usize) -> Result<(), CounterError> {
        let inserts = i64::try_from(inserts).unwrap_or(i64::MAX);
        let deletes = i64::try_from(deletes).unwrap_or(i64::MAX);
        self.operations.increment(inserts.saturating_add(deletes))?;
        self.inserts.increment(inserts)?;
        self.deletes.increment(deletes)?;
        Ok(())
    }

    pub fn merge(&mut self, remote: MetricsState) {
        self.operations
            .merge(&GCounter::from_state(remote.operation_counter));
        self.inserts.merge(&GCounter::from_state(remote.insert_counter));
        self.deletes.merge(&GCounter::from_state(remote.delete_counter));
    }

    pub fn state(&self) -> MetricsState {
        MetricsState {
            operation_counter: self.operations.state(),
            insert_counter: self.inserts.state(),
            delete_counter: self.deletes.state(),
        }
    }

    pub fn report(&self, sequence: RgaMetrics) -> MetricsReport {
        MetricsReport {
            operation_count: self.operations.value(),
            insert_operations: self.inserts.value(),
            delete_operations: self.deletes.value(),
            sequence,
            counters: self.state(),
        }
    }
}
