//! Main entry point for the RGA document server.
//!
//! Hosts replicated text documents over HTTP and WebSocket using the Axum web
//! framework. Configuration comes from `RGA_*` environment variables.

use std::error::Error;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rga_sync::server::config::ENV_LOG;
use rga_sync::server::{DocumentRegistry, MemoryStore, ServerConfig, create_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();
    info!(replica = %config.replica_id, "starting RGA document server");

    let registry = Arc::new(DocumentRegistry::new(&config, Arc::new(MemoryStore::new())));
    let app = create_router(registry);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    info!("Available endpoints:");
    info!("  GET  /health                  - Health check");
    info!("  GET  /documents               - List documents");
    info!("  POST /documents               - Create a document");
    info!("  GET  /documents/:id           - Content and snapshot");
    info!("  GET  /documents/:id/metrics   - Operation counters");
    info!("  POST /documents/:id/metrics   - Merge remote counters");
    info!("  POST /documents/:id/evict     - Persist and unload");
    info!("  GET  /ws/:id                  - Collaborative editing session");

    axum::serve(listener, app).await?;
    Ok(())
}
