//! Wire and persistence payloads for the RGA.
//!
//! Three shapes leave a replica: single operations (real-time sync), batches
//! of operations (bursts such as a paste, or a drained delta) and full
//! snapshots (bootstrap of a joining replica and persistence). All of them are
//! plain serde types; JSON helpers are provided for the transport and storage
//! collaborators.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crdt::gcounter::GCounterState;
use crate::crdt::node::Node;
use crate::crdt::rga::{BatchOutcome, ROOT_SLOT, Rga};
use crate::crdt::types::{LamportClock, OperationId, ReplicaId};
use crate::error::{CodecError, SnapshotError};

/// One unit of real-time sync.
///
/// A delete carries its target in `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operation<T> {
    Insert {
        id: OperationId,
        value: T,
        origin: OperationId,
    },
    Delete {
        id: OperationId,
    },
}

impl<T> Operation<T> {
    /// The inserted id, or the deleted target.
    pub fn id(&self) -> &OperationId {
        match self {
            Operation::Insert { id, .. } | Operation::Delete { id } => id,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Operation::Insert { .. })
    }
}

/// One element of a snapshot. The root record has neither value nor origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord<T> {
    pub id: OperationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OperationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<OperationId>,
    pub tombstone: bool,
}

/// Full state of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<T> {
    pub replica_id: ReplicaId,
    pub counter: u64,
    pub elements: Vec<ElementRecord<T>>,
}

impl<T: Clone> Rga<T> {
    /// Captures the complete element map, in chain order starting at the
    /// root, together with the clock.
    pub fn full_state(&self) -> Snapshot<T> {
        let slots = std::iter::once(ROOT_SLOT).chain(self.chain());
        let elements = slots
            .map(|slot| {
                let node = &self.nodes[slot];
                ElementRecord {
                    id: node.id().clone(),
                    value: node.value().cloned(),
                    origin: node.origin().cloned(),
                    next: node.next.map(|next| self.nodes[next].id().clone()),
                    tombstone: node.is_tombstone(),
                }
            })
            .collect();

        Snapshot {
            replica_id: self.replica_id().clone(),
            counter: self.current_clock(),
            elements,
        }
    }

    /// Replaces the current state with `snapshot`.
    ///
    /// The snapshot is validated first; on error the sequence is left
    /// untouched. The replica keeps its own id; its clock is seeded past every
    /// id it could have coined before, and the delta and pending buffers are
    /// cleared.
    pub fn load_state(&mut self, snapshot: Snapshot<T>) -> Result<(), SnapshotError> {
        if !LamportClock::accepts(snapshot.counter) {
            return Err(SnapshotError::CounterOutOfRange(snapshot.counter));
        }
        let (nodes, index) = restore_arena(snapshot.elements)?;

        let own_max = index
            .keys()
            .filter(|id| &id.replica_id == self.replica_id())
            .map(|id| id.counter)
            .max()
            .unwrap_or(0);

        debug!(
            replica = %self.replica_id(),
            elements = nodes.len() - 1,
            "loaded snapshot"
        );
        self.nodes = nodes;
        self.index = index;
        self.delta.clear();
        self.pending.clear();
        self.clock.observe(snapshot.counter.max(own_max));
        Ok(())
    }

    /// Unions `snapshot` into the current state.
    ///
    /// Every unknown element is integrated through the regular placement
    /// algorithm (incoming `next` links are ignored), then tombstones are
    /// applied. Elements that cannot be placed yet are buffered like any
    /// out-of-order operation.
    pub fn merge_state(&mut self, snapshot: &Snapshot<T>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for record in &snapshot.elements {
            if record.id.is_root() {
                continue;
            }
            let (Some(value), Some(origin)) = (&record.value, &record.origin) else {
                warn!(id = %record.id, "skipping snapshot element without value or origin");
                continue;
            };
            outcome.record(self.apply(Operation::Insert {
                id: record.id.clone(),
                value: value.clone(),
                origin: origin.clone(),
            }));
        }
        for record in snapshot.elements.iter().filter(|r| r.tombstone) {
            if !record.id.is_root() {
                self.apply(Operation::Delete {
                    id: record.id.clone(),
                });
            }
        }

        self.clock.observe(snapshot.counter);
        outcome
    }
}

/// Checks a snapshot's structure and turns it into an arena.
fn restore_arena<T>(
    records: Vec<ElementRecord<T>>,
) -> Result<(Vec<Node<T>>, HashMap<OperationId, usize>), SnapshotError> {
    let roots = records.iter().filter(|r| r.id.is_root()).count();
    match roots {
        0 => return Err(SnapshotError::MissingRoot),
        1 => {}
        _ => return Err(SnapshotError::DuplicateRoot),
    }

    // The root always takes slot 0; the remaining records keep their order.
    let mut ordered = records;
    if let Some(position) = ordered.iter().position(|r| r.id.is_root()) {
        let root = ordered.remove(position);
        ordered.insert(ROOT_SLOT, root);
    }

    let mut index = HashMap::with_capacity(ordered.len());
    for (slot, record) in ordered.iter().enumerate() {
        if !LamportClock::accepts(record.id.counter) {
            return Err(SnapshotError::CounterOutOfRange(record.id.counter));
        }
        if index.insert(record.id.clone(), slot).is_some() {
            return Err(SnapshotError::DuplicateElement(record.id.clone()));
        }
    }

    let mut nodes = Vec::with_capacity(ordered.len());
    let mut links = Vec::with_capacity(ordered.len());
    for record in ordered {
        let is_root = record.id.is_root();
        let parent = if is_root {
            None
        } else {
            if record.value.is_none() {
                return Err(SnapshotError::MissingValue(record.id));
            }
            let Some(origin) = &record.origin else {
                return Err(SnapshotError::MissingOrigin(record.id));
            };
            match index.get(origin) {
                Some(&slot) => Some(slot),
                None => {
                    return Err(SnapshotError::UnknownReference {
                        id: record.id.clone(),
                        reference: origin.clone(),
                    });
                }
            }
        };
        let next = match &record.next {
            Some(next) => match index.get(next) {
                Some(&slot) => Some(slot),
                None => {
                    return Err(SnapshotError::UnknownReference {
                        id: record.id.clone(),
                        reference: next.clone(),
                    });
                }
            },
            None => None,
        };

        let (value, origin) = if is_root {
            (None, None)
        } else {
            (record.value, record.origin)
        };
        let mut node = Node::restore(record.id, value, origin, is_root || record.tombstone);
        node.parent = parent;
        nodes.push(node);
        links.push(next);
    }
    for (node, next) in nodes.iter_mut().zip(links) {
        node.next = next;
    }

    // Every element must be reachable from the root exactly once.
    let total = nodes.len();
    let mut seen = HashSet::with_capacity(total);
    seen.insert(ROOT_SLOT);
    let mut cursor = nodes[ROOT_SLOT].next;
    while let Some(slot) = cursor {
        if !seen.insert(slot) {
            break;
        }
        cursor = nodes[slot].next;
    }
    if seen.len() != total {
        return Err(SnapshotError::BrokenChain {
            reachable: seen.len(),
            total,
        });
    }

    Ok((nodes, index))
}

pub fn encode_operation<T: Serialize>(operation: &Operation<T>) -> Result<String, CodecError> {
    Ok(serde_json::to_string(operation)?)
}

pub fn decode_operation<T: DeserializeOwned>(raw: &str) -> Result<Operation<T>, CodecError> {
    Ok(serde_json::from_str(raw)?)
}

/// Encodes a batch; replaying it is equivalent to replaying each operation.
pub fn encode_batch<T: Serialize>(operations: &[Operation<T>]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(operations)?)
}

pub fn decode_batch<T: DeserializeOwned>(raw: &str) -> Result<Vec<Operation<T>>, CodecError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn encode_snapshot<T: Serialize>(snapshot: &Snapshot<T>) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(snapshot)?)
}

pub fn decode_snapshot<T: DeserializeOwned>(raw: &[u8]) -> Result<Snapshot<T>, CodecError> {
    Ok(serde_json::from_slice(raw)?)
}

pub fn encode_counter(state: &GCounterState) -> Result<String, CodecError> {
    Ok(serde_json::to_string(state)?)
}

pub fn decode_counter(raw: &str) -> Result<GCounterState, CodecError> {
    Ok(serde_json::from_str(raw)?)
}
