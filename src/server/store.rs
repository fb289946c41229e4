//! Persistence boundary for document snapshots.
//!
//! Stores see opaque blobs only; encoding is the registry's business.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

pub trait SnapshotStore: Send + Sync {
    fn load(&self, document: Uuid) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&self, document: Uuid, blob: Vec<u8>) -> Result<(), StoreError>;
    /// Ids of every stored document.
    fn documents(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// In-process store, useful for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, document: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().get(&document).cloned())
    }

    fn save(&self, document: Uuid, blob: Vec<u8>) -> Result<(), StoreError> {
        self.blobs.write().insert(document, blob);
        Ok(())
    }

    fn documents(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.blobs.read().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        assert_eq!(store.load(id).unwrap(), None);
        store.save(id, b"state".to_vec()).unwrap();
        assert_eq!(store.load(id).unwrap(), Some(b"state".to_vec()));
        assert_eq!(store.documents().unwrap(), vec![id]);

        store.save(id, b"newer".to_vec()).unwrap();
        assert_eq!(store.load(id).unwrap(), Some(b"newer".to_vec()));
        assert_eq!(store.documents().unwrap().len(), 1);
    }
}
