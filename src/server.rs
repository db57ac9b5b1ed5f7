//! HTTP surface over the checkpoint engine.
//!
//! Engine calls are blocking file I/O, so they run on the blocking pool behind
//! one mutex: the process is the single writer of its progress log.

use crate::engine::CheckpointEngine;
use crate::error::EngineError;
use crate::types::{DestinationIds, NextUploadDescriptor, ProgressRecord};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};

/// Static identity values handed to the browser client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppIdentity {
    pub app_id: Option<String>,
    pub public_host: Option<String>,
}

pub struct ServerState {
    engine: Mutex<CheckpointEngine>,
    identity: AppIdentity,
}

impl ServerState {
    pub fn new(engine: CheckpointEngine, identity: AppIdentity) -> Self {
        Self {
            engine: Mutex::new(engine),
            identity,
        }
    }
}

/// Only `descriptor.catalog_index` and `destination` are used; the rest of the
/// record is re-derived from the catalog.
#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub descriptor: NextUploadDescriptor,
    pub destination: DestinationIds,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Engine(EngineError::StaleCompletion { .. }) => {
                (StatusCode::CONFLICT, "STALE_COMPLETION")
            }
            ApiError::Engine(EngineError::ProgressLog(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PROGRESS_LOG")
            }
            ApiError::Engine(EngineError::Stat { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STAT")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        error!(code, error = %self, "request failed");
        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Run `f` against the engine on the blocking pool.
async fn with_engine<T, F>(state: Arc<ServerState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&CheckpointEngine) -> Result<T, EngineError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let engine = state
            .engine
            .lock()
            .map_err(|_| ApiError::Internal("engine lock poisoned".into()))?;
        f(&*engine).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("engine task failed: {e}")))?
}

/// GET /next-item
async fn next_item(State(state): State<Arc<ServerState>>) -> Result<Json<Value>, ApiError> {
    let next = with_engine(state, |e| e.next_upload()).await?;
    let body = next
        .to_json()
        .map_err(|e| ApiError::Internal(format!("serialize next item: {e}")))?;
    Ok(Json(body))
}

/// POST /completion
async fn completion(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<ProgressRecord>, ApiError> {
    let index = req.descriptor.catalog_index;
    let rec = with_engine(state, move |e| e.record_current(index, &req.destination)).await?;
    Ok(Json(rec))
}

/// GET /app-identity
async fn app_identity(State(state): State<Arc<ServerState>>) -> Json<AppIdentity> {
    Json(state.identity.clone())
}

/// GET /facebook-app-id
async fn facebook_app_id(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({ "value": state.identity.app_id }))
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/next-item", get(next_item))
        .route("/completion", post(completion))
        .route("/app-identity", get(app_identity))
        .route("/facebook-app-id", get(facebook_app_id))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!(addr = %addr, "face-manager server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
