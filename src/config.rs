//! Router configuration, loadable from TOML.
//!
//! ```toml
//! [turns]
//! traffic_side = "left"
//! crossing_turn_penalty_s = 30.0
//!
//! [solver]
//! kind = "two-opt"
//! round_trip = true
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithms::tsp::SolverOptions;
use crate::algorithms::turn_cost::TurnCostModel;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub turns: TurnCostModel,
    pub solver: SolverOptions,
    pub network: NetworkOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// Speed for roads that do not declare one
    pub default_speed_kph: f64,

    /// Waypoints farther than this from every intersection are rejected
    pub max_snap_distance_m: f64,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            default_speed_kph: 30.0,
            max_snap_distance_m: 2_000.0,
        }
    }
}

impl RouterConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
