//! Error types for the replication engine and the relay server.
//!
//! CRDT-level anomalies (duplicates, out-of-order delivery, missing
//! dependencies) are never errors: they are absorbed by the sequence itself.
//! Everything in this module is either invalid usage by a local caller or a
//! failure of one of the external collaborators (codec, store).

use thiserror::Error;
use uuid::Uuid;

use crate::crdt::types::OperationId;

/// Invalid local usage of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RgaError {
    #[error("reference element {0} for insertion not found")]
    UnknownAnchor(OperationId),
    #[error("element {0} not found")]
    UnknownElement(OperationId),
    #[error("the root sentinel cannot be deleted")]
    RootDeletion,
}

/// Invalid usage of a grow-only counter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    #[error("a grow-only counter cannot be decremented (got {0}); use a PN-Counter")]
    NegativeIncrement(i64),
    #[error("counter overflow")]
    Overflow,
}

/// A snapshot that cannot be loaded as a replacement state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot has no root element")]
    MissingRoot,
    #[error("snapshot contains more than one root element")]
    DuplicateRoot,
    #[error("element {0} appears more than once")]
    DuplicateElement(OperationId),
    #[error("element {0} has no value")]
    MissingValue(OperationId),
    #[error("element {0} has no origin")]
    MissingOrigin(OperationId),
    #[error("element {id} references unknown element {reference}")]
    UnknownReference {
        id: OperationId,
        reference: OperationId,
    },
    #[error("counter {0} is out of range")]
    CounterOutOfRange(u64),
    #[error("chain from root reaches {reachable} of {total} elements")]
    BrokenChain { reachable: usize, total: usize },
}

/// Failure to encode or decode a wire payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An operation id that is not of the form `<counter>@<replica>` or `root`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid operation id '{0}'")]
pub struct IdParseError(pub String);

/// Failure reported by a snapshot store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Errors surfaced by the document registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("document {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("persisted document is not a valid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Failure that ends a WebSocket session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] axum::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}
