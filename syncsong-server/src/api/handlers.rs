//! HTTP request handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use syncsong_common::api::{
    CreateRoomResponse, HealthResponse, RoomExistsResponse, SearchQuery, SearchResult,
    StatusResponse,
};
use tracing::{info, warn};

use crate::api::server::AppContext;
use crate::error::{Error, Result};
use crate::room::validate_code;

pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "syncsong-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: Some(env!("GIT_HASH").to_string()),
        build_timestamp: Some(env!("BUILD_TIMESTAMP").to_string()),
    })
}

/// POST /room/:code/create
///
/// Idempotent: creating an existing room still succeeds.
pub async fn create_room(
    State(ctx): State<AppContext>,
    Path(code): Path<String>,
) -> Result<Json<CreateRoomResponse>> {
    validate_code(&code)?;
    if ctx.registry.create(&code).await {
        info!("Room {} created via API", code);
    }
    Ok(Json(CreateRoomResponse { success: true }))
}

/// GET /room/:code/exists
pub async fn room_exists(
    State(ctx): State<AppContext>,
    Path(code): Path<String>,
) -> Result<Json<RoomExistsResponse>> {
    validate_code(&code)?;
    Ok(Json(RoomExistsResponse {
        exists: ctx.registry.exists(&code).await,
    }))
}

/// GET /search?q=
///
/// Upstream failures produce an empty list, never an error status.
pub async fn search(
    State(ctx): State<AppContext>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(Error::BadRequest("Query parameter q is required".to_string()));
    }

    let results = ctx.catalog.search(q).await.unwrap_or_else(|e| {
        warn!("Catalog search for {:?} failed: {}", q, e);
        Vec::new()
    });
    Ok(Json(results))
}
