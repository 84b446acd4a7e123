// Models module - exports all model types

mod location;
mod route;
mod turn;
mod waypoint;

// Re-export model types
pub use self::location::Location;
pub use self::route::{round_km, Leg, OptimizedRoute, TurnCounts};
pub use self::turn::{turn_angle, TrafficSide, TurnKind};
pub use self::waypoint::Waypoint;

// Common type aliases for improved code readability
pub type NodeId = u64;
pub type RoadId = u64;
/// Travel cost in seconds, turn penalties included
pub type Cost = f64;
