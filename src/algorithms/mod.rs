pub mod matrix;
pub mod shortest_path;
pub mod tsp;
pub mod turn_cost;

// Common algorithm traits
use crate::algorithms::matrix::LegMatrix;

/// Trait for stop-ordering solvers
pub trait RouteSolver {
    /// Order the waypoints of `matrix`, starting at the depot (index 0).
    /// Every index appears exactly once, even when some legs are unreachable.
    fn solve(&self, matrix: &LegMatrix, round_trip: bool) -> Vec<usize>;
}
