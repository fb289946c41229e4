//! Registry of the documents hosted by a server.
//!
//! Active documents live in a lock-free ordered map; each one is guarded by
//! its own mutex so sessions editing different documents never contend.
//! Documents that are not active are loaded from the snapshot store on demand.
//!
//! An evicted document may still be held by connected sessions. The registry
//! keeps a weak handle to it, and reopening hands out that same instance for
//! as long as anyone holds it: two live instances of one document would
//! share a replica id and coin identical operation ids.

use std::sync::{Arc, Weak};

use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crdt::ReplicaId;
use crate::error::{CodecError, RegistryError};
use crate::server::config::ServerConfig;
use crate::server::document::{Document, DocumentSummary, PersistedDocument};
use crate::server::store::SnapshotStore;

pub type SharedDocument = Arc<Mutex<Document>>;

pub struct DocumentRegistry {
    documents: SkipMap<Uuid, SharedDocument>,
    /// Evicted documents, possibly still referenced by sessions
    detached: SkipMap<Uuid, Weak<Mutex<Document>>>,
    store: Arc<dyn SnapshotStore>,
    replica_id: ReplicaId,
    capacity: usize,
}

impl DocumentRegistry {
    pub fn new(config: &ServerConfig, store: Arc<dyn SnapshotStore>) -> Self {
        DocumentRegistry {
            documents: SkipMap::new(),
            detached: SkipMap::new(),
            store,
            replica_id: config.replica_id.clone(),
            capacity: config.broadcast_capacity,
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    /// Creates an empty document and persists it right away.
    pub fn create(&self, title: Option<String>) -> Result<SharedDocument, RegistryError> {
        let id = Uuid::new_v4();
        let title = title.unwrap_or_else(|| "Untitled".to_string());
        let document = Document::new(id, title, &self.replica_id, self.capacity);
        self.save(&document)?;

        info!(document = %id, "created document");
        let entry = self.documents.get_or_insert(id, Arc::new(Mutex::new(document)));
        Ok(entry.value().clone())
    }

    /// Returns the active document, loading it from the store if needed.
    ///
    /// An evicted instance that is still in use is reactivated instead of
    /// being loaded a second time.
    pub fn open(&self, id: Uuid) -> Result<SharedDocument, RegistryError> {
        if let Some(entry) = self.documents.get(&id) {
            return Ok(entry.value().clone());
        }

        let live = self
            .detached
            .get(&id)
            .and_then(|entry| entry.value().upgrade());
        if let Some(document) = live {
            debug!(document = %id, "reactivated evicted document still in use");
            let entry = self.documents.get_or_insert(id, document);
            self.detached.remove(&id);
            return Ok(entry.value().clone());
        }
        self.detached.remove(&id);

        let persisted = self.load(id)?.ok_or(RegistryError::NotFound(id))?;
        let document = Document::restore(id, persisted, &self.replica_id, self.capacity)?;
        debug!(document = %id, "loaded document from store");

        // A concurrent open may have won the race; its instance is kept.
        let entry = self.documents.get_or_insert(id, Arc::new(Mutex::new(document)));
        Ok(entry.value().clone())
    }

    /// The active document, if loaded.
    pub fn get(&self, id: Uuid) -> Option<SharedDocument> {
        self.documents.get(&id).map(|entry| entry.value().clone())
    }

    /// Summaries of every known document, most recently updated first.
    pub fn list(&self) -> Result<Vec<DocumentSummary>, RegistryError> {
        let mut summaries: Vec<DocumentSummary> = self
            .documents
            .iter()
            .map(|entry| entry.value().lock().summary())
            .collect();

        for id in self.store.documents()? {
            if self.documents.contains_key(&id) {
                continue;
            }
            match self.load(id) {
                Ok(Some(persisted)) => summaries.push(persisted.summary(id)),
                Ok(None) => {}
                Err(err) => warn!(document = %id, "skipping unreadable document: {err}"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Writes the current state of an active document to the store.
    pub fn persist(&self, id: Uuid) -> Result<(), RegistryError> {
        let document = self.get(id).ok_or(RegistryError::NotFound(id))?;
        let persisted = document.lock().persisted();
        self.write(id, &persisted)
    }

    /// Writes `document` to the store.
    pub fn save(&self, document: &Document) -> Result<(), RegistryError> {
        self.write(document.id(), &document.persisted())
    }

    /// Persists an active document and unloads it.
    ///
    /// Sessions connected to the document keep editing the same instance; it
    /// is reactivated by the next [`open`](Self::open) while they hold it.
    pub fn evict(&self, id: Uuid) -> Result<(), RegistryError> {
        let document = self.get(id).ok_or(RegistryError::NotFound(id))?;
        self.persist(id)?;

        // The weak handle must exist before the document leaves the map.
        self.detached.insert(id, Arc::downgrade(&document));
        self.documents.remove(&id);
        info!(
            document = %id,
            holders = Arc::strong_count(&document) - 1,
            "evicted document"
        );
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.documents.len()
    }

    fn load(&self, id: Uuid) -> Result<Option<PersistedDocument>, RegistryError> {
        let Some(blob) = self.store.load(id)? else {
            return Ok(None);
        };
        let persisted = serde_json::from_slice(&blob).map_err(CodecError::from)?;
        Ok(Some(persisted))
    }

    fn write(&self, id: Uuid, persisted: &PersistedDocument) -> Result<(), RegistryError> {
        let blob = serde_json::to_vec(persisted).map_err(CodecError::from)?;
        self.store.save(id, blob)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::MemoryStore;

    fn registry() -> DocumentRegistry {
        DocumentRegistry::new(&ServerConfig::default(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_create_and_open() {
        let registry = registry();
        let created = registry.create(Some("plan".to_string())).unwrap();
        let id = created.lock().id();

        let opened = registry.open(id).unwrap();
        assert!(Arc::ptr_eq(&created, &opened));
        assert_eq!(opened.lock().title(), "plan");
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_open_unknown_document() {
        let registry = registry();
        let id = Uuid::new_v4();
        assert!(matches!(registry.open(id), Err(RegistryError::NotFound(missing)) if missing == id));
    }

    #[test]
    fn test_evicted_document_reloads_from_store() {
        let registry = registry();
        let document = registry.create(None).unwrap();
        let id = {
            let mut doc = document.lock();
            doc.insert_at(Uuid::new_v4(), 0, 'a');
            doc.insert_at(Uuid::new_v4(), 1, 'b');
            doc.id()
        };
        drop(document);

        registry.evict(id).unwrap();
        assert_eq!(registry.active_count(), 0);
        assert!(registry.get(id).is_none());

        let listed = registry.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].active);
        assert_eq!(listed[0].length, 2);

        let reopened = registry.open(id).unwrap();
        let doc = reopened.lock();
        assert_eq!(doc.text(), "ab");
        assert_eq!(doc.title(), "Untitled");
        assert_eq!(doc.metrics_report().insert_operations, 2);
    }

    #[test]
    fn test_evicted_document_in_use_is_not_loaded_twice() {
        let registry = registry();
        let held = registry.create(None).unwrap();
        let id = held.lock().id();
        held.lock().insert_at(Uuid::new_v4(), 0, 'a');

        registry.evict(id).unwrap();
        assert_eq!(registry.active_count(), 0);

        let reopened = registry.open(id).unwrap();
        assert!(Arc::ptr_eq(&held, &reopened));
        assert_eq!(registry.active_count(), 1);

        let old = held.lock().insert_at(Uuid::new_v4(), 1, 'b');
        let new = reopened.lock().insert_at(Uuid::new_v4(), 2, 'c');
        assert_ne!(old[0].id(), new[0].id());
        assert_eq!(reopened.lock().text(), "abc");
    }

    #[test]
    fn test_reload_after_eviction_never_reuses_ids() {
        let registry = registry();
        let document = registry.create(None).unwrap();
        let (id, before) = {
            let mut doc = document.lock();
            let ops = doc.insert_at(Uuid::new_v4(), 0, 'a');
            (doc.id(), ops)
        };
        drop(document);
        registry.evict(id).unwrap();

        let reopened = registry.open(id).unwrap();
        let after = reopened.lock().insert_at(Uuid::new_v4(), 1, 'b');
        assert!(after[0].id() > before[0].id());
    }

    #[test]
    fn test_list_does_not_duplicate_active_documents() {
        let registry = registry();
        registry.create(Some("one".to_string())).unwrap();
        registry.create(Some("two".to_string())).unwrap();

        let listed = registry.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|summary| summary.active));
    }
}
