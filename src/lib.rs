// Public modules
pub mod algorithms;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod server;
pub mod traffic;
pub mod utils;

// Re-exports for convenience
pub use algorithms::matrix::LegMatrix;
pub use algorithms::tsp::{SolverKind, SolverOptions};
pub use algorithms::turn_cost::TurnCostModel;
pub use config::RouterConfig;
pub use engine::RouteEngine;
pub use error::{Result, RouteError};
pub use models::{Leg, Location, OptimizedRoute, TrafficSide, TurnKind, Waypoint};
pub use traffic::{FileTrafficFeed, TrafficFeed, TrafficRefresher, TrafficReport, TrafficUpdate};
pub use utils::road_network::{NetworkSpec, RoadNetwork};
