//! Turn cost model.
//!
//! Turns across oncoming traffic (right turns under left-hand traffic) make a
//! vehicle wait for a gap, so they carry the largest penalty. Turns that stay
//! on the kerb side are cheap, going straight is free. Penalties are only
//! charged at real intersections: a bend on a road between two intersections
//! is not a turn.

use serde::{Deserialize, Serialize};

use crate::models::{Cost, TrafficSide, TurnKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnCostModel {
    pub traffic_side: TrafficSide,

    /// Penalty for a normal turn across oncoming traffic, seconds
    pub crossing_turn_penalty_s: Cost,

    /// Penalty for a sharp turn across oncoming traffic, seconds
    pub sharp_crossing_turn_penalty_s: Cost,

    /// Penalty for any turn that stays on the kerb side, seconds
    pub kerbside_turn_penalty_s: Cost,

    pub u_turn_penalty_s: Cost,

    /// U-turns at intersections. Dead ends always allow turning around.
    pub allow_u_turns: bool,

    /// Average wait at a signalised intersection, charged for every movement
    pub signal_delay_s: Cost,

    /// Minimum number of adjacent intersections for a node to count as a junction
    pub min_degree_for_penalty: usize,
}

impl Default for TurnCostModel {
    fn default() -> Self {
        Self::india()
    }
}

impl TurnCostModel {
    /// Left-hand traffic with strong right-turn avoidance
    pub fn india() -> Self {
        Self {
            traffic_side: TrafficSide::Left,
            crossing_turn_penalty_s: 30.0,
            sharp_crossing_turn_penalty_s: 40.0,
            kerbside_turn_penalty_s: 5.0,
            u_turn_penalty_s: 60.0,
            allow_u_turns: false,
            signal_delay_s: 8.0,
            min_degree_for_penalty: 3,
        }
    }

    /// Same penalties mirrored for right-hand traffic
    pub fn right_hand() -> Self {
        Self {
            traffic_side: TrafficSide::Right,
            ..Self::india()
        }
    }

    /// No turn costs at all: plain fastest path
    pub fn travel_time_only() -> Self {
        Self {
            crossing_turn_penalty_s: 0.0,
            sharp_crossing_turn_penalty_s: 0.0,
            kerbside_turn_penalty_s: 0.0,
            u_turn_penalty_s: 0.0,
            allow_u_turns: true,
            signal_delay_s: 0.0,
            ..Self::india()
        }
    }

    pub fn is_crossing(&self, kind: TurnKind) -> bool {
        kind.crosses_traffic(self.traffic_side)
    }

    /// Penalty for the turn itself, ignoring intersection context
    pub fn turn_penalty(&self, kind: TurnKind) -> Cost {
        match kind {
            TurnKind::Straight => 0.0,
            TurnKind::UTurn => self.u_turn_penalty_s,
            TurnKind::Right | TurnKind::Left if self.is_crossing(kind) => {
                self.crossing_turn_penalty_s
            }
            TurnKind::SharpRight | TurnKind::SharpLeft if self.is_crossing(kind) => {
                self.sharp_crossing_turn_penalty_s
            }
            _ => self.kerbside_turn_penalty_s,
        }
    }

    /// Cost of a movement through an intersection with `via_degree` adjacent
    /// intersections. `None` means the movement is not allowed.
    pub fn penalty(&self, kind: TurnKind, via_degree: usize, has_signal: bool) -> Option<Cost> {
        let dead_end = via_degree <= 1;
        if kind == TurnKind::UTurn && !self.allow_u_turns && !dead_end {
            return None;
        }

        let mut penalty = 0.0;
        if via_degree >= self.min_degree_for_penalty || kind == TurnKind::UTurn {
            penalty += self.turn_penalty(kind);
        }
        if has_signal {
            penalty += self.signal_delay_s;
        }
        Some(penalty)
    }

    /// Cost of turning at a delivery stop between the inbound and the outbound
    /// leg. Turning around at a stop is always possible (driveways, parking).
    pub fn stop_penalty(&self, kind: TurnKind) -> Cost {
        self.turn_penalty(kind)
    }
}
