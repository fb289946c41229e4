//! Type definitions for the RGA CRDT.
//!
//! This module contains the identifier scheme used throughout the replication
//! engine: replica ids, operation ids and the Lamport clock that coins them.

pub mod clock;
pub mod operation_id;
pub mod replica;

pub use clock::{LamportClock, MAX_COUNTER};
pub use operation_id::OperationId;
pub use replica::ReplicaId;
