//! REST endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/status` | Hub counters and active paths |
//! | `GET` | `/api/results/page?path=` | Current page result |
//! | `GET` | `/api/results/shared/{id}` | Current shared result |
//! | `POST` | `/api/results/page` | Publish a fresh page result |
//! | `POST` | `/api/results/shared` | Publish a fresh shared result |
//!
//! The `POST` endpoints are how the build pipeline pushes results it has
//! just computed.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use livequery_core::{HubStats, ResultEntry};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for `GET /api/results/page`.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// The page path to look up.
    pub path: String,
}

/// Response body for `GET /api/status`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Hub counters.
    #[serde(flatten)]
    pub stats: HubStats,
    /// When the server started.
    pub started_at: DateTime<Utc>,
}

/// Response body for the publish endpoints.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    /// Id of the published result.
    pub id: String,
    /// Connections the result was delivered to.
    pub delivered: usize,
}

/// Report hub counters.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        stats: state.hub.stats().await,
        started_at: state.started_at,
    })
}

/// Look up the stored result for a page path.
pub async fn get_page_result(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ResultEntry>, ApiError> {
    state
        .hub
        .page_result(&query.path)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no page result for {}", query.path)))
}

/// Look up the stored shared result for a hash.
pub async fn get_shared_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ResultEntry>, ApiError> {
    state
        .hub
        .shared_result(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no shared result for {id}")))
}

/// Store and deliver a freshly computed page result.
pub async fn publish_page(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<ResultEntry>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    validate_id(&entry)?;
    let id = entry.id.clone();
    let delivered = state.hub.publish_page_result(entry).await;
    info!(path = id, delivered, "page result pushed");
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { id, delivered })))
}

/// Store and deliver a freshly computed shared result.
pub async fn publish_shared(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<ResultEntry>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    validate_id(&entry)?;
    let id = entry.id.clone();
    let delivered = state.hub.publish_shared_result(entry).await;
    info!(id, delivered, "shared result pushed");
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { id, delivered })))
}

fn validate_id(entry: &ResultEntry) -> Result<(), ApiError> {
    if entry.id.trim().is_empty() {
        return Err(ApiError::InvalidRequest(String::from(
            "result id must not be empty",
        )));
    }
    Ok(())
}
