//! A hosted document: one text replica plus its metrics and broadcast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::crdt::{Operation, ReplicaId, Rga, Snapshot};
use crate::error::SnapshotError;
use crate::server::metrics::{DocumentMetrics, MetricsReport, MetricsState};

/// Operations published on a document channel, tagged with the session that
/// caused them.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: Uuid,
    pub operations: Vec<Operation<char>>,
}

/// What the store keeps for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDocument {
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub snapshot: Snapshot<char>,
    pub metrics: MetricsState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub document_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub length: usize,
    pub active: bool,
}

#[derive(Debug)]
pub struct Document {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    rga: Rga<char>,
    metrics: DocumentMetrics,
    channel: broadcast::Sender<Envelope>,
}

/// Replica id of a document hosted by the server `prefix`.
pub fn document_replica(prefix: &ReplicaId, id: Uuid) -> ReplicaId {
    ReplicaId::new(format!("{prefix}-{id}"))
}

impl Document {
    pub fn new(id: Uuid, title: String, prefix: &ReplicaId, capacity: usize) -> Self {
        let replica = document_replica(prefix, id);
        let (channel, _) = broadcast::channel(capacity);
        let now = Utc::now();
        Document {
            id,
            title,
            created_at: now,
            updated_at: now,
            metrics: DocumentMetrics::new(&replica),
            rga: Rga::new(replica),
            channel,
        }
    }

    /// Rebuilds a document from its persisted form.
    pub fn restore(
        id: Uuid,
        persisted: PersistedDocument,
        prefix: &ReplicaId,
        capacity: usize,
    ) -> Result<Self, SnapshotError> {
        let mut document = Document::new(id, persisted.title, prefix, capacity);
        document.rga.load_state(persisted.snapshot)?;
        document.created_at = persisted.created_at;
        document.updated_at = persisted.updated_at;
        document.metrics = DocumentMetrics::from_state(persisted.metrics);
        Ok(document)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> String {
        self.rga.text()
    }

    pub fn rga(&self) -> &Rga<char> {
        &self.rga
    }

    pub fn snapshot(&self) -> Snapshot<char> {
        self.rga.full_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.channel.subscribe()
    }

    /// Integrates operations received from `sender` and publishes whatever
    /// took effect, including operations released from the pending buffer.
    pub fn apply_operations(
        &mut self,
        sender: Uuid,
        operations: Vec<Operation<char>>,
    ) -> Vec<Operation<char>> {
        let outcome = self.rga.apply_batch(operations);
        if outcome.deferred > 0 {
            tracing::debug!(
                document = %self.id,
                deferred = outcome.deferred,
                "operations waiting for dependencies"
            );
        }
        self.publish(sender)
    }

    pub fn insert_at(&mut self, sender: Uuid, position: usize, value: char) -> Vec<Operation<char>> {
        self.rga.insert_at_position(value, position);
        self.publish(sender)
    }

    pub fn delete_at(&mut self, sender: Uuid, position: usize) -> Vec<Operation<char>> {
        self.rga.delete_at_position(position);
        self.publish(sender)
    }

    pub fn merge_metrics(&mut self, remote: MetricsState) {
        self.metrics.merge(remote);
    }

    pub fn metrics_report(&self) -> MetricsReport {
        self.metrics.report(self.rga.metrics())
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            document_id: self.id,
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            length: self.rga.len(),
            active: true,
        }
    }

    pub fn persisted(&self) -> PersistedDocument {
        PersistedDocument {
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            snapshot: self.rga.full_state(),
            metrics: self.metrics.state(),
        }
    }

    fn publish(&mut self, sender: Uuid) -> Vec<Operation<char>> {
        let delta = self.rga.drain_delta();
        if delta.is_empty() {
            return delta;
        }
        self.metrics.record(&delta);
        self.updated_at = Utc::now();
        // No subscribers is not an error: nobody else is editing.
        let _ = self.channel.send(Envelope {
            sender,
            operations: delta.clone(),
        });
        delta
    }
}

impl PersistedDocument {
    /// Summary of a stored document that is not loaded.
    pub fn summary(&self, document_id: Uuid) -> DocumentSummary {
        let length = self
            .snapshot
            .elements
            .iter()
            .filter(|element| !element.id.is_root() && !element.tombstone)
            .count();
        DocumentSummary {
            document_id,
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            length,
            active: false,
        }
    }
}
