//! # RGA Sync - replicated sequences and counters
//!
//! Conflict-free replication of an ordered sequence (text) with a Replicated
//! Growable Array, plus a grow-only counter for aggregates. Replicas apply
//! local edits immediately, exchange operations, batches or snapshots in any
//! order, and converge to the same sequence without coordination.
//!
//! ## Features
//!
//! - **Conflict-free**: Concurrent operations can be applied in any order and will converge
//! - **Causal buffering**: Operations whose dependency has not arrived are parked and replayed
//! - **Delta sync**: Every change is recorded for incremental broadcast
//! - **Snapshots**: Full state for persistence and for bootstrapping new replicas
//! - **Tombstone-based deletion**: Supports safe deletion with eventual consistency
//!
//! ## Example
//!
//! ```rust
//! use rga_sync::Rga;
//!
//! let mut alice = Rga::new("alice");
//! let mut bob = Rga::new("bob");
//!
//! let op = alice.insert_at_position('h', 0);
//! bob.apply(op);
//! let op = bob.insert_at_position('i', 1);
//! alice.apply(op);
//!
//! assert_eq!(alice.text(), "hi");
//! assert_eq!(bob.text(), "hi");
//! ```

pub mod crdt;
pub mod error;
pub mod server;

// Re-export the main public API from the CRDT module
pub use crdt::{
    BatchOutcome, ElementRecord, GCounter, GCounterState, Integration, LamportClock, Node,
    Operation, OperationId, ReplicaId, Rga, RgaMetrics, Snapshot,
};
pub use error::{CodecError, CounterError, IdParseError, RgaError, SnapshotError};
