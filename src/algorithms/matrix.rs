use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

use log::info;
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::algorithms::shortest_path::one_to_many;
use crate::algorithms::turn_cost::TurnCostModel;
use crate::error::{Result, RouteError};
use crate::models::{Cost, Leg, NodeId};
use crate::utils::road_network::RoadNetwork;

/// Identifies the costs legs were computed under: the traffic state of every
/// segment plus the turn penalties. Stable across processes for the same data.
pub fn fingerprint(network: &RoadNetwork, model: &TurnCostModel) -> u64 {
    let mut hasher = DefaultHasher::new();
    network.traffic_fingerprint().hash(&mut hasher);
    model.traffic_side.hash(&mut hasher);
    for penalty in [
        model.crossing_turn_penalty_s,
        model.sharp_crossing_turn_penalty_s,
        model.kerbside_turn_penalty_s,
        model.u_turn_penalty_s,
        model.signal_delay_s,
    ] {
        penalty.to_bits().hash(&mut hasher);
    }
    model.allow_u_turns.hash(&mut hasher);
    model.min_degree_for_penalty.hash(&mut hasher);
    hasher.finish()
}

/// Turn-aware legs between every ordered pair of waypoints.
/// Unreachable pairs hold no leg and cost infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegMatrix {
    size: usize,
    /// Row-major, `legs[from * size + to]`
    legs: Vec<Option<Leg>>,
    /// Intersections the waypoints snapped to, in request order
    nodes: Vec<NodeId>,
    /// [`fingerprint`] of the network and turn model the legs were computed on
    fingerprint: u64,
}

impl LegMatrix {
    /// Runs one search per source in parallel
    pub fn build(network: &RoadNetwork, model: &TurnCostModel, nodes: &[NodeIndex]) -> Self {
        info!("Calculating turn-aware legs between {} waypoints", nodes.len());

        let rows: Vec<Vec<Option<Leg>>> = nodes
            .par_iter()
            .map(|&source| one_to_many(network, model, source, nodes))
            .collect();

        let legs: Vec<Option<Leg>> = rows.into_iter().flatten().collect();
        let unreachable = legs.iter().filter(|leg| leg.is_none()).count();
        if unreachable > 0 {
            info!("{} waypoint pairs are unreachable", unreachable);
        }

        Self {
            size: nodes.len(),
            legs,
            nodes: nodes.iter().map(|&node| network.node(node).id).collect(),
            fingerprint: fingerprint(network, model),
        }
    }

    /// Matrix over hand-made legs, not tied to any network
    #[cfg(test)]
    pub(crate) fn from_legs(size: usize, legs: Vec<Option<Leg>>) -> Result<Self> {
        if legs.len() != size * size {
            return Err(RouteError::MatrixMismatch {
                expected: size * size,
                actual: legs.len(),
            });
        }
        Ok(Self {
            size,
            legs,
            nodes: Vec::new(),
            fingerprint: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn leg(&self, from: usize, to: usize) -> Option<&Leg> {
        self.legs.get(from * self.size + to)?.as_ref()
    }

    pub fn cost(&self, from: usize, to: usize) -> Cost {
        self.leg(from, to)
            .map(|leg| leg.cost_s)
            .unwrap_or(f64::INFINITY)
    }

    pub fn distance_m(&self, from: usize, to: usize) -> f64 {
        self.leg(from, to)
            .map(|leg| leg.distance_m)
            .unwrap_or(f64::INFINITY)
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// True when traffic or turn penalties changed since the matrix was computed
    pub fn is_stale(&self, current_fingerprint: u64) -> bool {
        self.fingerprint != current_fingerprint
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path.as_ref(), json)?;
        info!("Leg matrix saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let matrix: LegMatrix = serde_json::from_str(&json)?;
        if matrix.legs.len() != matrix.size * matrix.size {
            return Err(RouteError::MatrixMismatch {
                expected: matrix.size * matrix.size,
                actual: matrix.legs.len(),
            });
        }
        if matrix.nodes.len() != matrix.size {
            return Err(RouteError::MatrixMismatch {
                expected: matrix.size,
                actual: matrix.nodes.len(),
            });
        }
        info!(
            "Loaded {}x{} leg matrix from {}",
            matrix.size,
            matrix.size,
            path.as_ref().display()
        );
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::init_map::{grid_network, GridOptions};

    fn grid() -> RoadNetwork {
        let spec = grid_network(&GridOptions {
            rows: 4,
            cols: 4,
            oneway_ratio: 0.0,
            ..GridOptions::default()
        });
        RoadNetwork::from_spec(&spec, 30.0).unwrap()
    }

    #[test]
    fn test_build_matrix_on_grid() {
        let network = grid();
        let model = TurnCostModel::india();
        let nodes: Vec<NodeIndex> = [1, 6, 11, 16]
            .iter()
            .map(|&id| network.node_index(id).unwrap())
            .collect();

        let matrix = LegMatrix::build(&network, &model, &nodes);

        assert_eq!(matrix.size(), 4);
        assert_eq!(matrix.nodes(), &[1, 6, 11, 16]);
        for i in 0..4 {
            assert_eq!(matrix.cost(i, i), 0.0);
            for j in 0..4 {
                assert!(matrix.cost(i, j).is_finite(), "{} -> {} unreachable", i, j);
            }
        }
        assert!(matrix.distance_m(0, 3) >= 600.0 * 0.99);
        assert!(!matrix.is_stale(fingerprint(&network, &model)));
        assert!(matrix.is_stale(fingerprint(&network, &TurnCostModel::right_hand())));
    }

    #[test]
    fn test_traffic_makes_matrix_stale() {
        let mut network = grid();
        let model = TurnCostModel::india();
        let nodes: Vec<NodeIndex> = [1, 16]
            .iter()
            .map(|&id| network.node_index(id).unwrap())
            .collect();
        let matrix = LegMatrix::build(&network, &model, &nodes);

        network.update_road(1, |segment| segment.closed = true);
        assert!(matrix.is_stale(fingerprint(&network, &model)));

        // Undoing the closure restores the original costs
        network.update_road(1, |segment| segment.closed = false);
        assert!(!matrix.is_stale(fingerprint(&network, &model)));
    }

    #[test]
    fn test_missing_leg_is_infinite() {
        let matrix = LegMatrix::from_legs(2, vec![Some(Leg::empty(1)), None, None, Some(Leg::empty(2))]).unwrap();

        assert_eq!(matrix.cost(0, 1), f64::INFINITY);
        assert_eq!(matrix.distance_m(1, 0), f64::INFINITY);
        assert!(LegMatrix::from_legs(3, vec![None; 4]).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let network = grid();
        let model = TurnCostModel::india();
        let nodes: Vec<NodeIndex> = [1, 16]
            .iter()
            .map(|&id| network.node_index(id).unwrap())
            .collect();
        let matrix = LegMatrix::build(&network, &model, &nodes);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        matrix.save(&path).unwrap();
        let loaded = LegMatrix::load(&path).unwrap();

        assert_eq!(loaded.size(), 2);
        assert_eq!(loaded.leg(0, 1).map(|leg| &leg.nodes), matrix.leg(0, 1).map(|leg| &leg.nodes));
        assert!((loaded.cost(1, 0) - matrix.cost(1, 0)).abs() < 1e-9);
        assert_eq!(loaded.nodes(), &[1, 16]);
        assert_eq!(loaded.fingerprint(), matrix.fingerprint());

        // A matrix file without its waypoint nodes is rejected
        let broken = r#"{"size": 1, "legs": [null], "nodes": [], "fingerprint": 0}"#;
        fs::write(&path, broken).unwrap();
        assert!(matches!(LegMatrix::load(&path), Err(RouteError::MatrixMismatch { .. })));
    }
}
