//! Node definition for the RGA arena.
//!
//! Every element of a sequence lives in one slot of a dense arena and is never
//! removed. Cross-references between elements are arena indices (`next`,
//! `parent`) or operation ids (`origin`), never owning pointers, so the whole
//! structure can be serialized and relocated freely.

use crate::crdt::types::OperationId;

/// Represents a single element within the RGA, or the root sentinel.
///
/// # Tombstone Deletion
///
/// Instead of physically removing nodes, the RGA uses logical deletion by
/// setting `tombstone` to true. A tombstone is never cleared, and the node keeps
/// its place in the chain so that concurrent insertions anchored on it can
/// still be placed.
#[derive(Debug, Clone)]
pub struct Node<T> {
    id: OperationId,
    /// `None` only for the root sentinel
    value: Option<T>,
    /// The element this one was inserted after; `None` only for the root
    origin: Option<OperationId>,
    tombstone: bool,
    /// Arena index of `origin`
    pub(crate) parent: Option<usize>,
    /// Arena index of the following node in the canonical order
    pub(crate) next: Option<usize>,
}

impl<T> Node<T> {
    /// Creates a live element anchored after `origin`.
    pub(crate) fn new(id: OperationId, value: T, origin: OperationId, parent: usize) -> Self {
        Node {
            id,
            value: Some(value),
            origin: Some(origin),
            tombstone: false,
            parent: Some(parent),
            next: None,
        }
    }

    /// Creates the root sentinel. The root is permanently tombstoned so it
    /// never shows up in the visible sequence.
    pub(crate) fn root() -> Self {
        Node {
            id: OperationId::root(),
            value: None,
            origin: None,
            tombstone: true,
            parent: None,
            next: None,
        }
    }

    /// Rebuilds a node from a persisted record; `parent` and `next` are
    /// resolved by the caller.
    pub(crate) fn restore(
        id: OperationId,
        value: Option<T>,
        origin: Option<OperationId>,
        tombstone: bool,
    ) -> Self {
        Node {
            id,
            value,
            origin,
            tombstone,
            parent: None,
            next: None,
        }
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn origin(&self) -> Option<&OperationId> {
        self.origin.as_ref()
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    pub fn is_root(&self) -> bool {
        self.origin.is_none()
    }

    /// Returns true if this node is part of the visible sequence.
    pub fn is_visible(&self) -> bool {
        !self.tombstone && !self.is_root()
    }

    /// Marks this node as deleted. Returns true if the tombstone was newly set.
    pub(crate) fn mark_deleted(&mut self) -> bool {
        let changed = !self.tombstone;
        self.tombstone = true;
        changed
    }
}
