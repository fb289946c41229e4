//! Document server hosting replicated text documents.
//!
//! Clients edit documents over WebSocket sessions; documents, their snapshots
//! and their metrics are also reachable over plain HTTP.

pub mod config;
pub mod document;
pub mod metrics;
pub mod registry;
pub mod routes;
pub mod store;
pub mod websocket;

// Re-export main server functionality
pub use config::ServerConfig;
pub use document::{Document, DocumentSummary, Envelope, PersistedDocument};
pub use metrics::{DocumentMetrics, MetricsReport, MetricsState};
pub use registry::{DocumentRegistry, SharedDocument};
pub use routes::{AppState, create_router};
pub use store::{MemoryStore, SnapshotStore};
pub use websocket::{ClientMessage, ServerMessage};
