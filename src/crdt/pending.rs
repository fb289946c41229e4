//! Buffer for operations whose dependency has not arrived yet.
//!
//! An insert waits on its origin, a delete waits on its target. Operations are
//! keyed by the missing id and released together once that id is integrated.

use std::collections::HashMap;

use crate::crdt::codec::Operation;
use crate::crdt::types::OperationId;

#[derive(Debug, Clone)]
pub(crate) struct PendingBuffer<T> {
    waiting: HashMap<OperationId, Vec<Operation<T>>>,
    len: usize,
}

impl<T> Default for PendingBuffer<T> {
    fn default() -> Self {
        PendingBuffer {
            waiting: HashMap::new(),
            len: 0,
        }
    }
}

impl<T> PendingBuffer<T> {
    /// Parks `operation` until `missing` is integrated.
    pub(crate) fn defer(&mut self, missing: OperationId, operation: Operation<T>) {
        self.waiting.entry(missing).or_default().push(operation);
        self.len += 1;
    }

    /// Removes and returns every operation blocked on `id`, highest priority
    /// first so that replay order does not depend on arrival order.
    pub(crate) fn release(&mut self, id: &OperationId) -> Vec<Operation<T>> {
        let Some(mut released) = self.waiting.remove(id) else {
            return Vec::new();
        };
        self.len -= released.len();
        released.sort_by(|a, b| b.id().cmp(a.id()));
        released
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn clear(&mut self) {
        self.waiting.clear();
        self.len = 0;
    }
}
