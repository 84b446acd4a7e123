//! HTTP API over a shared [`RouteEngine`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::algorithms::tsp::SolverKind;
use crate::engine::RouteEngine;
use crate::error::{Result, RouteError};
use crate::models::{OptimizedRoute, Waypoint};
use crate::traffic::{TrafficReport, TrafficUpdate};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    /// Depot first
    pub waypoints: Vec<Waypoint>,
    /// Overrides the configured solver
    #[serde(default)]
    pub solver: Option<SolverKind>,
    #[serde(default)]
    pub round_trip: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub traffic_version: u64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn status_for(error: &RouteError) -> StatusCode {
    match error {
        RouteError::TooFewWaypoints(_)
        | RouteError::SnapFailed { .. }
        | RouteError::InvalidCoordinate(_)
        | RouteError::InvalidTraffic { .. } => StatusCode::BAD_REQUEST,
        RouteError::Unreachable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: RouteError) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!("Request failed: {}", error);
    }
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn internal_error(message: String) -> ApiError {
    warn!("Request failed: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
}

async fn root_handler(State(engine): State<Arc<RouteEngine>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running".to_string(),
        message: "Smart Route API is running".to_string(),
        traffic_version: engine.traffic_version(),
    })
}

async fn health_handler(State(engine): State<Arc<RouteEngine>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "healthy".to_string(),
        message: format!("{} intersections loaded", engine.network().node_count()),
        traffic_version: engine.traffic_version(),
    })
}

async fn optimize_handler(
    State(engine): State<Arc<RouteEngine>>,
    Json(req): Json<OptimizeRequest>,
) -> std::result::Result<Json<OptimizedRoute>, ApiError> {
    let mut options = engine.config().solver.clone();
    if let Some(kind) = req.solver {
        options.kind = kind;
    }
    if let Some(round_trip) = req.round_trip {
        options.round_trip = round_trip;
    }

    // Searches are CPU bound, keep them off the async workers
    let result = tokio::task::spawn_blocking(move || engine.optimize(&req.waypoints, &options))
        .await
        .map_err(|e| internal_error(format!("optimization task failed: {}", e)))?;

    result.map(Json).map_err(api_error)
}

async fn traffic_handler(
    State(engine): State<Arc<RouteEngine>>,
    Json(updates): Json<Vec<TrafficUpdate>>,
) -> std::result::Result<Json<TrafficReport>, ApiError> {
    engine.apply_traffic(&updates).map(Json).map_err(api_error)
}

/// Routes of the API. The engine can be shared with a traffic refresher.
pub fn router(engine: Arc<RouteEngine>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/optimize-route", post(optimize_handler))
        .route("/traffic", post(traffic_handler))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

pub async fn run_server(engine: Arc<RouteEngine>, addr: SocketAddr) -> Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
