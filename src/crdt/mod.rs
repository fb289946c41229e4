//! CRDT (Conflict-free Replicated Data Type) implementation module.
//!
//! This module contains the RGA (Replicated Growable Array) sequence CRDT, its
//! wire/snapshot codec, and the grow-only counter used for aggregates.

pub mod codec;
pub mod gcounter;
pub mod node;
mod pending;
pub mod rga;
pub mod types;

// Re-export the main public API
pub use codec::{
    ElementRecord, Operation, Snapshot, decode_batch, decode_counter, decode_operation,
    decode_snapshot, encode_batch, encode_counter, encode_operation, encode_snapshot,
};
pub use gcounter::{GCounter, GCounterState};
pub use node::Node;
pub use rga::{BatchOutcome, Integration, Rga, RgaMetrics};
pub use types::{LamportClock, OperationId, ReplicaId};
