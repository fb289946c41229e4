//! Core RGA CRDT implementation.
//!
//! This module contains the main RGA (Replicated Growable Array) struct and its
//! operations. Elements live in an arena and are threaded into a singly linked
//! chain starting at the root sentinel; the chain order is the document order.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::crdt::codec::Operation;
use crate::crdt::node::Node;
use crate::crdt::pending::PendingBuffer;
use crate::crdt::types::{LamportClock, OperationId, ReplicaId};
use crate::error::RgaError;

/// Arena slot of the root sentinel.
pub(crate) const ROOT_SLOT: usize = 0;

/// Result of handing one remote operation to a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integration {
    /// The operation changed the sequence.
    Applied,
    /// The operation was already integrated; nothing changed.
    Duplicate,
    /// The operation references an element that has not arrived yet. It is
    /// buffered and applied automatically once that element is integrated.
    Deferred,
    /// The operation carries an id counter above
    /// [`MAX_COUNTER`](crate::crdt::types::MAX_COUNTER) and was dropped.
    Rejected,
}

/// Tally of a batch integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub duplicates: usize,
    pub deferred: usize,
    pub rejected: usize,
}

impl BatchOutcome {
    pub(crate) fn record(&mut self, outcome: Integration) {
        match outcome {
            Integration::Applied => self.applied += 1,
            Integration::Duplicate => self.duplicates += 1,
            Integration::Deferred => self.deferred += 1,
            Integration::Rejected => self.rejected += 1,
        }
    }
}

/// Size figures of a sequence, root sentinel excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RgaMetrics {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub tombstone_nodes: usize,
    pub text_length: usize,
    pub pending_operations: usize,
}

/// The Replicated Growable Array (RGA) CRDT.
///
/// # Design
///
/// - Operation ids are Lamport pairs `(counter, replica)`; their total order
///   resolves concurrent insertions at the same position
/// - Each element remembers the element it was inserted after (`origin`), so
///   placement is a pure function of immutable data
/// - Tombstone-based deletion, tombstones are never collected
/// - Operations whose dependency is missing are parked and replayed later
/// - Every change, local or remote, is recorded in a delta buffer that the
///   transport drains and broadcasts
///
/// An instance is a plain value: it is not shared between threads and is
/// driven by one caller at a time.
#[derive(Debug, Clone)]
pub struct Rga<T> {
    pub(super) clock: LamportClock,
    /// Arena of nodes; slot 0 is the root sentinel
    pub(super) nodes: Vec<Node<T>>,
    pub(super) index: HashMap<OperationId, usize>,
    pub(super) delta: Vec<Operation<T>>,
    pub(super) pending: PendingBuffer<T>,
}

impl<T: Clone> Rga<T> {
    /// Creates an empty sequence owned by `replica_id`.
    pub fn new(replica_id: impl Into<ReplicaId>) -> Self {
        let mut index = HashMap::new();
        index.insert(OperationId::root(), ROOT_SLOT);

        Rga {
            clock: LamportClock::new(replica_id.into()),
            nodes: vec![Node::root()],
            index,
            delta: Vec::new(),
            pending: PendingBuffer::default(),
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        self.clock.replica_id()
    }

    /// Gets the current clock value.
    pub fn current_clock(&self) -> u64 {
        self.clock.current()
    }

    /// Inserts `value` immediately after the element `after`.
    ///
    /// Returns the operation to broadcast. Fails without touching the sequence
    /// if `after` is not known locally.
    pub fn insert_after(
        &mut self,
        after: &OperationId,
        value: T,
    ) -> Result<Operation<T>, RgaError> {
        let Some(&parent) = self.index.get(after) else {
            return Err(RgaError::UnknownAnchor(after.clone()));
        };
        Ok(self.insert_local(parent, value))
    }

    /// Inserts `value` so that it becomes visible at `position`. Positions past
    /// the end append.
    pub fn insert_at_position(&mut self, value: T, position: usize) -> Operation<T> {
        let parent = self.slot_before_position(position);
        self.insert_local(parent, value)
    }

    /// Deletes the element `target`. Deleting an element twice is allowed and
    /// returns the same operation.
    pub fn delete(&mut self, target: &OperationId) -> Result<Operation<T>, RgaError> {
        if target.is_root() {
            return Err(RgaError::RootDeletion);
        }
        let Some(&slot) = self.index.get(target) else {
            return Err(RgaError::UnknownElement(target.clone()));
        };
        self.tombstone(slot);
        Ok(Operation::Delete { id: target.clone() })
    }

    /// Deletes the element visible at `position`, or returns `None` if there
    /// is no such element.
    pub fn delete_at_position(&mut self, position: usize) -> Option<Operation<T>> {
        let slot = self.visible_slots().nth(position)?;
        self.tombstone(slot);
        Some(Operation::Delete {
            id: self.nodes[slot].id().clone(),
        })
    }

    /// Integrates a remote insertion. Idempotent.
    pub fn integrate_insert(
        &mut self,
        id: OperationId,
        value: T,
        origin: OperationId,
    ) -> Integration {
        self.apply(Operation::Insert { id, value, origin })
    }

    /// Integrates a remote deletion. Idempotent.
    pub fn integrate_delete(&mut self, target: OperationId) -> Integration {
        self.apply(Operation::Delete { id: target })
    }

    /// Integrates one remote operation, then replays everything that was
    /// waiting on it.
    pub fn apply(&mut self, operation: Operation<T>) -> Integration {
        let key = operation.id().clone();
        let outcome = self.apply_one(operation);
        if outcome == Integration::Applied {
            self.replay_from(key);
        }
        outcome
    }

    /// Integrates a batch of operations in order.
    pub fn apply_batch(
        &mut self,
        operations: impl IntoIterator<Item = Operation<T>>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for operation in operations {
            outcome.record(self.apply(operation));
        }
        outcome
    }

    /// Returns and clears every operation recorded since the previous call.
    pub fn drain_delta(&mut self) -> Vec<Operation<T>> {
        std::mem::take(&mut self.delta)
    }

    /// Id of the element visible at `position`.
    pub fn id_at_position(&self, position: usize) -> Option<OperationId> {
        self.visible_slots()
            .nth(position)
            .map(|slot| self.nodes[slot].id().clone())
    }

    /// Id of the element an insertion at `position` must be anchored on: the
    /// root for position 0, the last visible element past the end.
    pub fn id_before_position(&self, position: usize) -> OperationId {
        self.nodes[self.slot_before_position(position)].id().clone()
    }

    /// Number of visible elements strictly before `id` in the chain. The root
    /// is at position 0.
    pub fn position_of_id(&self, id: &OperationId) -> Option<usize> {
        let &slot = self.index.get(id)?;
        if slot == ROOT_SLOT {
            return Some(0);
        }
        let mut position = 0;
        for current in self.chain() {
            if current == slot {
                return Some(position);
            }
            if self.nodes[current].is_visible() {
                position += 1;
            }
        }
        None
    }

    fn insert_local(&mut self, parent: usize, value: T) -> Operation<T> {
        let origin = self.nodes[parent].id().clone();
        let id = self.clock.tick();
        self.place(id.clone(), value.clone(), origin.clone(), parent);
        self.replay_from(id.clone());
        Operation::Insert { id, value, origin }
    }

    fn apply_one(&mut self, operation: Operation<T>) -> Integration {
        if !LamportClock::accepts(operation.id().counter) {
            warn!(id = %operation.id(), "rejecting operation with out-of-range counter");
            return Integration::Rejected;
        }
        match operation {
            Operation::Insert { id, value, origin } => {
                if self.index.contains_key(&id) {
                    trace!(%id, "ignoring duplicate insert");
                    return Integration::Duplicate;
                }
                let Some(&parent) = self.index.get(&origin) else {
                    debug!(%id, %origin, "deferring insert until its origin arrives");
                    self.pending
                        .defer(origin.clone(), Operation::Insert { id, value, origin });
                    return Integration::Deferred;
                };
                self.clock.observe(id.counter);
                self.place(id, value, origin, parent);
                Integration::Applied
            }
            Operation::Delete { id } => {
                if id.is_root() {
                    debug!("ignoring delete of the root sentinel");
                    return Integration::Duplicate;
                }
                let Some(&slot) = self.index.get(&id) else {
                    debug!(%id, "deferring delete until its target arrives");
                    self.pending.defer(id.clone(), Operation::Delete { id });
                    return Integration::Deferred;
                };
                if self.tombstone(slot) {
                    Integration::Applied
                } else {
                    trace!(%id, "ignoring duplicate delete");
                    Integration::Duplicate
                }
            }
        }
    }

    /// Replays pending operations unblocked by `ready`, and transitively
    /// everything unblocked by those, with an explicit worklist.
    fn replay_from(&mut self, ready: OperationId) {
        let mut worklist = vec![ready];
        while let Some(id) = worklist.pop() {
            for operation in self.pending.release(&id) {
                let key = operation.id().clone();
                if self.apply_one(operation) == Integration::Applied {
                    worklist.push(key);
                }
            }
        }
    }

    /// Links a new element into the chain after `parent`.
    ///
    /// Starting at the origin, the walk skips every sibling (same origin) with
    /// higher priority than `id`, together with all elements inserted after
    /// such a sibling, and splices the new element in front of the first
    /// element that is neither. The resulting chain only depends on the set
    /// of elements, never on the order in which they were integrated.
    fn place(&mut self, id: OperationId, value: T, origin: OperationId, parent: usize) {
        let mut prev = parent;
        let mut skipped: HashSet<usize> = HashSet::new();

        while let Some(candidate) = self.nodes[prev].next {
            let node = &self.nodes[candidate];
            let skip = match node.parent {
                Some(p) if p == parent => node.id().has_priority_over(&id),
                Some(p) => skipped.contains(&p),
                None => false,
            };
            if !skip {
                break;
            }
            skipped.insert(candidate);
            prev = candidate;
        }

        let slot = self.nodes.len();
        let mut node = Node::new(id.clone(), value.clone(), origin.clone(), parent);
        node.next = self.nodes[prev].next;
        self.nodes.push(node);
        self.nodes[prev].next = Some(slot);
        self.index.insert(id.clone(), slot);

        self.delta.push(Operation::Insert { id, value, origin });
    }

    /// Sets the tombstone of `slot`, recording the deletion in the delta when
    /// it changes anything.
    fn tombstone(&mut self, slot: usize) -> bool {
        let changed = self.nodes[slot].mark_deleted();
        if changed {
            self.delta.push(Operation::Delete {
                id: self.nodes[slot].id().clone(),
            });
        }
        changed
    }
}

impl<T> Rga<T> {
    /// Arena slots in chain order, root excluded.
    pub(crate) fn chain(&self) -> Chain<'_, T> {
        Chain {
            nodes: &self.nodes,
            cursor: self.nodes[ROOT_SLOT].next,
        }
    }

    fn visible_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.chain().filter(move |&slot| self.nodes[slot].is_visible())
    }

    fn slot_before_position(&self, position: usize) -> usize {
        if position == 0 {
            return ROOT_SLOT;
        }
        let mut last = ROOT_SLOT;
        for (visible, slot) in self.visible_slots().enumerate() {
            last = slot;
            if visible + 1 == position {
                break;
            }
        }
        last
    }

    /// Visible values in document order.
    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.visible().filter_map(|node| node.value())
    }

    /// Visible elements in document order.
    pub fn visible(&self) -> impl Iterator<Item = &Node<T>> + '_ {
        self.chain()
            .map(move |slot| &self.nodes[slot])
            .filter(|node| node.is_visible())
    }

    /// All elements in document order, tombstones included, root excluded.
    pub fn elements(&self) -> impl Iterator<Item = &Node<T>> + '_ {
        self.chain().map(move |slot| &self.nodes[slot])
    }

    pub fn get(&self, id: &OperationId) -> Option<&Node<T>> {
        self.index.get(id).map(|&slot| &self.nodes[slot])
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.index.contains_key(id)
    }

    /// Whether `id` is tombstoned, or `None` if it is unknown.
    pub fn is_deleted(&self, id: &OperationId) -> Option<bool> {
        self.get(id).map(|node| node.is_tombstone())
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.visible_slots().count()
    }

    pub fn is_empty(&self) -> bool {
        self.visible_slots().next().is_none()
    }

    /// Number of elements including tombstones, root excluded.
    pub fn total_node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Number of operations waiting for a dependency.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn metrics(&self) -> RgaMetrics {
        let total_nodes = self.total_node_count();
        let active_nodes = self.len();
        RgaMetrics {
            total_nodes,
            active_nodes,
            tombstone_nodes: total_nodes - active_nodes,
            text_length: active_nodes,
            pending_operations: self.pending.len(),
        }
    }
}

impl<T: fmt::Display> Rga<T> {
    /// The visible sequence rendered as text.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl<T: fmt::Display> fmt::Display for Rga<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in self.values() {
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Iterator over arena slots following `next` links.
pub(crate) struct Chain<'a, T> {
    nodes: &'a [Node<T>],
    cursor: Option<usize>,
}

impl<T> Iterator for Chain<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.cursor?;
        self.cursor = self.nodes[current].next;
        Some(current)
    }
}
