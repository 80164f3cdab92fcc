//! HTTP server for the aggregation status API.
//!
//! Provides endpoints for:
//! - Service health
//! - Per-facet job health and degraded-facet error texts
//! - The latest decoded attribute payload
//! - Area search passthrough for configuration frontends

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use hub_core::{Facet, HealthBoard, JobHealth, Payload, WeatherClient};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::sink::LatestState;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub station: Option<StationInfo>,
    pub jobs: BTreeMap<String, JobHealth>,
    /// Facets currently degraded, with their raw failing response text.
    pub degraded: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationInfo {
    pub area_id: String,
    pub name: String,
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttributesResponse {
    pub updated_at: Option<String>,
    pub attributes: Payload,
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

// ============================================================================
// Shared state
// ============================================================================

pub struct ServerState {
    pub client: Arc<WeatherClient>,
    pub health: HealthBoard,
    pub latest: Arc<LatestState>,
}

// ============================================================================
// Router
// ============================================================================

/// Create the status API router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/attributes", get(attributes_handler))
        .route("/search", get(search_handler))
        .layer(cors)
        .layer(Extension(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Liveness check
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "poller"
    }))
}

/// GET /status - Station, per-facet job health, degraded facets
async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let station = state.client.station().ok().map(|s| StationInfo {
        area_id: s.area_id.clone(),
        name: s.name.clone(),
        code: s.code.clone(),
        latitude: s.latitude,
        longitude: s.longitude,
    });

    let store = state.client.store_snapshot();
    let mut degraded = BTreeMap::new();
    for facet in Facet::ALL {
        if let Some(text) = store.error_text(facet) {
            degraded.insert(facet.key().to_string(), text.to_string());
        }
    }

    Json(StatusResponse {
        service: "poller".to_string(),
        station,
        jobs: state.health.snapshot(),
        degraded,
    })
}

/// GET /attributes - Latest decoded payload
async fn attributes_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let (attributes, updated_at) = state.latest.snapshot();
    Json(AttributesResponse {
        updated_at: updated_at.map(|t| t.to_rfc3339()),
        attributes,
    })
}

/// GET /search?q=... - Free-text area lookup against the provider
async fn search_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Query(params): Query<SearchQuery>,
) -> impl IntoResponse {
    match state.client.search_areas(&params.q).await {
        Ok(areas) => Json(serde_json::json!({ "areas": areas })).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Start the HTTP server.
pub async fn run_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting aggregation status server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
