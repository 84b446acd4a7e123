// Route models for routed legs and optimized delivery tours

use serde::{Deserialize, Serialize};

use crate::models::{Cost, Location, NodeId, TrafficSide, TurnKind};

/// Number of turns of each kind taken along a path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCounts {
    pub straight: u32,
    pub left: u32,
    pub sharp_left: u32,
    pub right: u32,
    pub sharp_right: u32,
    pub u_turn: u32,
}

impl TurnCounts {
    pub fn record(&mut self, kind: TurnKind) {
        match kind {
            TurnKind::Straight => self.straight += 1,
            TurnKind::Left => self.left += 1,
            TurnKind::SharpLeft => self.sharp_left += 1,
            TurnKind::Right => self.right += 1,
            TurnKind::SharpRight => self.sharp_right += 1,
            TurnKind::UTurn => self.u_turn += 1,
        }
    }

    pub fn merge(&mut self, other: &TurnCounts) {
        self.straight += other.straight;
        self.left += other.left;
        self.sharp_left += other.sharp_left;
        self.right += other.right;
        self.sharp_right += other.sharp_right;
        self.u_turn += other.u_turn;
    }

    /// Turns across oncoming traffic for the given driving side
    pub fn crossing(&self, side: TrafficSide) -> u32 {
        match side {
            TrafficSide::Left => self.right + self.sharp_right,
            TrafficSide::Right => self.left + self.sharp_left,
        }
    }
}

/// A routed path between two points of the road network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// Intersections passed, in order (may repeat when the path loops around a block)
    pub nodes: Vec<NodeId>,

    /// Travel time including intersection penalties
    pub cost_s: Cost,

    /// Driven distance in meters
    pub distance_m: f64,

    /// Heading when leaving the origin; `None` for an empty leg
    pub departure_bearing: Option<f64>,

    /// Heading when arriving at the destination; `None` for an empty leg
    pub arrival_bearing: Option<f64>,

    /// Turns taken at intersections along the leg
    pub turns: TurnCounts,
}

impl Leg {
    /// Zero-length leg for an origin that is also the destination
    pub fn empty(node: NodeId) -> Self {
        Self {
            nodes: vec![node],
            cost_s: 0.0,
            distance_m: 0.0,
            departure_bearing: None,
            arrival_bearing: None,
            turns: TurnCounts::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

/// Optimized delivery tour, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedRoute {
    /// Waypoint coordinates in request order
    pub coordinates: Vec<Location>,

    /// Indices into `coordinates` in visiting order, starting at the depot
    pub optimized_order: Vec<usize>,

    /// Whether the tour returns to the depot
    pub round_trip: bool,

    /// Total travel time including turn penalties, seconds
    pub total_cost_s: Cost,

    /// Total driven distance, rounded to two decimals
    pub total_distance_km: f64,

    /// Turns across oncoming traffic along the whole tour
    pub crossing_turns: u32,

    pub turns: TurnCounts,

    pub original_labels: Vec<String>,

    pub optimized_labels: Vec<String>,

    /// One leg per consecutive pair of stops in `optimized_order`
    pub legs: Vec<Leg>,
}

/// Meters to kilometers, rounded to two decimals
pub fn round_km(meters: f64) -> f64 {
    (meters / 10.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_counts_crossing() {
        let mut counts = TurnCounts::default();
        counts.record(TurnKind::Right);
        counts.record(TurnKind::SharpRight);
        counts.record(TurnKind::Left);
        counts.record(TurnKind::UTurn);

        assert_eq!(counts.crossing(TrafficSide::Left), 2);
        assert_eq!(counts.crossing(TrafficSide::Right), 1);

        let mut total = TurnCounts::default();
        total.merge(&counts);
        total.merge(&counts);
        assert_eq!(total.right, 2);
        assert_eq!(total.u_turn, 2);
    }

    #[test]
    fn test_round_km() {
        assert_eq!(round_km(12_345.0), 12.35);
        assert_eq!(round_km(999.0), 1.0);
        assert_eq!(round_km(0.0), 0.0);
    }

    #[test]
    fn test_empty_leg() {
        let leg = Leg::empty(7);
        assert!(leg.is_empty());
        assert_eq!(leg.departure_bearing, None);
    }
}
