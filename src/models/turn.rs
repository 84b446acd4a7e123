// Turn geometry: classifying the change of heading at an intersection

use serde::{Deserialize, Serialize};

/// Side of the road vehicles drive on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficSide {
    /// Left-hand traffic (India, UK, Japan): right turns cross oncoming traffic
    #[default]
    Left,
    /// Right-hand traffic: left turns cross oncoming traffic
    Right,
}

/// Kind of turn between an incoming and an outgoing heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Straight,
    Left,
    SharpLeft,
    Right,
    SharpRight,
    UTurn,
}

impl TurnKind {
    /// Classifies a signed turn angle in degrees (positive = clockwise = right)
    pub fn from_angle(angle: f64) -> Self {
        let magnitude = angle.abs();
        if magnitude >= 170.0 {
            TurnKind::UTurn
        } else if magnitude <= 45.0 {
            TurnKind::Straight
        } else if angle > 0.0 {
            if magnitude < 135.0 {
                TurnKind::Right
            } else {
                TurnKind::SharpRight
            }
        } else if magnitude < 135.0 {
            TurnKind::Left
        } else {
            TurnKind::SharpLeft
        }
    }

    /// Classifies the turn from an incoming to an outgoing bearing
    pub fn between(in_bearing: f64, out_bearing: f64) -> Self {
        TurnKind::from_angle(turn_angle(in_bearing, out_bearing))
    }

    pub fn is_right(&self) -> bool {
        matches!(self, TurnKind::Right | TurnKind::SharpRight)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, TurnKind::Left | TurnKind::SharpLeft)
    }

    /// True for turns that cut across oncoming traffic on the given side
    pub fn crosses_traffic(&self, side: TrafficSide) -> bool {
        match side {
            TrafficSide::Left => self.is_right(),
            TrafficSide::Right => self.is_left(),
        }
    }
}

/// Signed turn angle from `in_bearing` to `out_bearing`, wrapped to `(-180, 180]`
pub fn turn_angle(in_bearing: f64, out_bearing: f64) -> f64 {
    let delta = (out_bearing - in_bearing).rem_euclid(360.0);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}
