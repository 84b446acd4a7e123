//! Error type shared by the routing library

use thiserror::Error;

use crate::models::RoadId;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid road network: {0}")]
    InvalidNetwork(String),

    #[error("invalid coordinate '{0}', expected 'lat,lon'")]
    InvalidCoordinate(String),

    #[error("at least 2 waypoints are required, got {0}")]
    TooFewWaypoints(usize),

    #[error("waypoint {index} is {distance_m:.0} m away from the nearest road")]
    SnapFailed { index: usize, distance_m: f64 },

    #[error("no route from waypoint {from} to waypoint {to}")]
    Unreachable { from: usize, to: usize },

    #[error("invalid traffic update for road {road_id}: {reason}")]
    InvalidTraffic { road_id: RoadId, reason: String },

    #[error("leg matrix holds {actual} entries, expected {expected}")]
    MatrixMismatch { expected: usize, actual: usize },

    #[error("leg matrix was built for other waypoints")]
    MatrixWaypointMismatch,

    #[error("plotting failed: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, RouteError>;
