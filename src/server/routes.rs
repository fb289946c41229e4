//! Route handlers for the document server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::crdt::Snapshot;
use crate::error::RegistryError;
use crate::server::document::DocumentSummary;
use crate::server::metrics::{MetricsReport, MetricsState};
use crate::server::registry::DocumentRegistry;
use crate::server::websocket::handle_websocket_connection;

/// Shared application state
pub type AppState = Arc<DocumentRegistry>;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub replica_id: String,
    pub active_documents: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateDocument {
    pub title: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    pub content: String,
    pub snapshot: Snapshot<char>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                error!("registry failure: {self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn health(State(registry): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        replica_id: registry.replica_id().to_string(),
        active_documents: registry.active_count(),
        timestamp: Utc::now(),
    })
}

pub async fn list_documents(
    State(registry): State<AppState>,
) -> Result<Json<Vec<DocumentSummary>>, RegistryError> {
    Ok(Json(registry.list()?))
}

pub async fn create_document(
    State(registry): State<AppState>,
    body: Option<Json<CreateDocument>>,
) -> Result<(StatusCode, Json<DocumentSummary>), RegistryError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let document = registry.create(request.title)?;
    let summary = document.lock().summary();
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn get_document(
    State(registry): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, RegistryError> {
    let document = registry.open(id)?;
    let doc = document.lock();
    Ok(Json(DocumentResponse {
        summary: doc.summary(),
        content: doc.text(),
        snapshot: doc.snapshot(),
    }))
}

pub async fn get_metrics(
    State(registry): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MetricsReport>, RegistryError> {
    let document = registry.open(id)?;
    let report = document.lock().metrics_report();
    Ok(Json(report))
}

/// Merges counter state gathered by another replica of the document.
pub async fn merge_metrics(
    State(registry): State<AppState>,
    Path(id): Path<Uuid>,
    Json(remote): Json<MetricsState>,
) -> Result<Json<MetricsReport>, RegistryError> {
    let document = registry.open(id)?;
    let report = {
        let mut doc = document.lock();
        doc.merge_metrics(remote);
        registry.save(&doc)?;
        doc.metrics_report()
    };
    Ok(Json(report))
}

pub async fn evict_document(
    State(registry): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RegistryError> {
    registry.evict(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// WebSocket connection handler for collaborative editing
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(registry): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, RegistryError> {
    let document = registry.open(id)?;
    info!(document = %id, "websocket upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_websocket_connection(socket, registry, document)))
}

/// Creates and configures the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/documents", get(list_documents).post(create_document))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/metrics", get(get_metrics).post(merge_metrics))
        .route("/documents/:id/evict", post(evict_document))
        .route("/ws/:id", get(ws_handler))
        .with_state(state)
}
