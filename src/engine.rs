//! Routing engine: owns the network, applies traffic and answers requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Instant;

use log::{info, warn};
use petgraph::graph::NodeIndex;

use crate::algorithms::matrix::{fingerprint, LegMatrix};
use crate::algorithms::shortest_path::shortest_path;
use crate::algorithms::tsp::{solve_order, stop_turn, tour_cost, SolverOptions};
use crate::config::RouterConfig;
use crate::error::{Result, RouteError};
use crate::models::{round_km, Leg, Location, NodeId, OptimizedRoute, TurnCounts, Waypoint};
use crate::traffic::{TrafficReport, TrafficUpdate};
use crate::utils::road_network::RoadNetwork;

/// Shared routing engine. Queries take a read lock on the network, traffic
/// updates a write lock, so a refresher thread can run alongside requests.
pub struct RouteEngine {
    network: RwLock<RoadNetwork>,
    config: RouterConfig,
    traffic_version: AtomicU64,
}

/// A waypoint snapped onto the network
#[derive(Debug, Clone, Copy)]
struct Snapped {
    node: NodeIndex,
    distance_m: f64,
}

impl RouteEngine {
    pub fn new(network: RoadNetwork, config: RouterConfig) -> Self {
        Self {
            network: RwLock::new(network),
            config,
            traffic_version: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Incremented by every traffic batch that changed at least one road.
    /// Only meaningful within this process.
    pub fn traffic_version(&self) -> u64 {
        self.traffic_version.load(Ordering::SeqCst)
    }

    /// Fingerprint of the current traffic state and turn penalties, as
    /// recorded by [`LegMatrix::build`]
    pub fn traffic_fingerprint(&self) -> u64 {
        fingerprint(&self.network(), &self.config.turns)
    }

    /// Read access to the network
    pub fn network(&self) -> RwLockReadGuard<'_, RoadNetwork> {
        self.network.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn snap(&self, network: &RoadNetwork, locations: &[Location]) -> Result<Vec<Snapped>> {
        let limit = self.config.network.max_snap_distance_m;
        locations
            .iter()
            .enumerate()
            .map(|(index, location)| {
                let (node, distance_m) = network.nearest_node(location).ok_or_else(|| {
                    RouteError::InvalidNetwork("network has no intersections".into())
                })?;
                if distance_m > limit {
                    return Err(RouteError::SnapFailed { index, distance_m });
                }
                Ok(Snapped { node, distance_m })
            })
            .collect()
    }

    /// Turn-aware path between two coordinates. The walk to and from the
    /// nearest intersections is included in the distance.
    pub fn route(&self, from: &Location, to: &Location) -> Result<Leg> {
        let network = self.network();
        let snapped = self.snap(&network, &[*from, *to])?;

        let mut leg = shortest_path(&network, &self.config.turns, snapped[0].node, snapped[1].node)
            .ok_or(RouteError::Unreachable { from: 0, to: 1 })?;
        leg.distance_m += snapped[0].distance_m + snapped[1].distance_m;
        Ok(leg)
    }

    /// Legs between every ordered pair of waypoints
    pub fn matrix(&self, waypoints: &[Waypoint]) -> Result<LegMatrix> {
        let network = self.network();
        let locations: Vec<Location> = waypoints.iter().map(|w| w.location).collect();
        let snapped = self.snap(&network, &locations)?;
        let nodes: Vec<NodeIndex> = snapped.iter().map(|s| s.node).collect();

        Ok(LegMatrix::build(&network, &self.config.turns, &nodes))
    }

    /// Orders the waypoints (the first one is the depot) and reports the tour
    pub fn optimize(&self, waypoints: &[Waypoint], options: &SolverOptions) -> Result<OptimizedRoute> {
        if waypoints.len() < 2 {
            return Err(RouteError::TooFewWaypoints(waypoints.len()));
        }
        let matrix = self.matrix(waypoints)?;
        self.optimize_with_matrix(waypoints, &matrix, options)
    }

    /// Same as [`RouteEngine::optimize`] reusing precomputed legs. The matrix
    /// must come from the same waypoints; one computed under other traffic
    /// conditions is rebuilt.
    pub fn optimize_with_matrix(
        &self,
        waypoints: &[Waypoint],
        matrix: &LegMatrix,
        options: &SolverOptions,
    ) -> Result<OptimizedRoute> {
        if waypoints.len() < 2 {
            return Err(RouteError::TooFewWaypoints(waypoints.len()));
        }
        if matrix.size() != waypoints.len() {
            return Err(RouteError::MatrixMismatch {
                expected: waypoints.len() * waypoints.len(),
                actual: matrix.size() * matrix.size(),
            });
        }

        // Snap distances: legs only cover the part between intersections
        let network = self.network();
        let locations: Vec<Location> = waypoints.iter().map(|w| w.location).collect();
        let snapped = self.snap(&network, &locations)?;
        let nodes: Vec<NodeIndex> = snapped.iter().map(|s| s.node).collect();
        let ids: Vec<NodeId> = nodes.iter().map(|&node| network.node(node).id).collect();
        if matrix.nodes() != ids.as_slice() {
            return Err(RouteError::MatrixWaypointMismatch);
        }

        let fresh;
        let matrix = if matrix.is_stale(fingerprint(&network, &self.config.turns)) {
            warn!("Traffic changed since the leg matrix was computed; recomputing");
            fresh = LegMatrix::build(&network, &self.config.turns, &nodes);
            &fresh
        } else {
            matrix
        };
        drop(network);

        let start_time = Instant::now();
        let model = &self.config.turns;
        let order = solve_order(matrix, model, options);

        let mut stops: Vec<usize> = order.clone();
        if options.round_trip {
            stops.push(order[0]);
        }

        let mut legs = Vec::with_capacity(stops.len().saturating_sub(1));
        let mut turns = TurnCounts::default();
        for pair in stops.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let mut leg = matrix
                .leg(from, to)
                .cloned()
                .ok_or(RouteError::Unreachable { from, to })?;
            leg.distance_m += snapped[from].distance_m + snapped[to].distance_m;
            turns.merge(&leg.turns);
            legs.push(leg);
        }
        for triple in stops.windows(3) {
            if let Some(kind) = stop_turn(matrix, triple[0], triple[1], triple[2]) {
                turns.record(kind);
            }
        }

        let total_cost_s = tour_cost(matrix, model, &order, options.round_trip);
        let total_distance_m: f64 = legs.iter().map(|leg| leg.distance_m).sum();

        let labels: Vec<String> = waypoints
            .iter()
            .enumerate()
            .map(|(i, w)| {
                if w.label.is_empty() {
                    format!("Stop {}", i + 1)
                } else {
                    w.label.clone()
                }
            })
            .collect();
        let optimized_labels = order.iter().map(|&i| labels[i].clone()).collect();

        let route = OptimizedRoute {
            coordinates: locations,
            optimized_order: order,
            round_trip: options.round_trip,
            total_cost_s,
            total_distance_km: round_km(total_distance_m),
            crossing_turns: turns.crossing(model.traffic_side),
            turns,
            original_labels: labels,
            optimized_labels,
            legs,
        };

        info!(
            "Optimized {} stops in {:.2?}: {:.1} min, {:.2} km, {} crossing turns",
            waypoints.len(),
            start_time.elapsed(),
            route.total_cost_s / 60.0,
            route.total_distance_km,
            route.crossing_turns
        );

        Ok(route)
    }

    /// Applies a batch atomically. Invalid values reject the whole batch,
    /// unknown roads are skipped and reported.
    pub fn apply_traffic(&self, updates: &[TrafficUpdate]) -> Result<TrafficReport> {
        for update in updates {
            update.validate()?;
        }

        let mut report = TrafficReport::default();
        {
            let mut network = self.network.write().unwrap_or_else(PoisonError::into_inner);
            for update in updates {
                match network.update_road(update.road_id, |segment| update.apply_to(segment)) {
                    Some(changed) => {
                        report.applied += 1;
                        report.changed += changed;
                    }
                    None => {
                        warn!("Traffic update for unknown road {}", update.road_id);
                        report.unknown_roads.push(update.road_id);
                    }
                }
            }
            if report.changed > 0 {
                self.traffic_version.fetch_add(1, Ordering::SeqCst);
            }
        }

        report.version = self.traffic_version();
        info!(
            "Traffic batch: {} applied, {} segments changed, {} unknown roads, version {}",
            report.applied,
            report.changed,
            report.unknown_roads.len(),
            report.version
        );
        Ok(report)
    }

    /// Back to free-flow conditions everywhere
    pub fn reset_traffic(&self) {
        let mut network = self.network.write().unwrap_or_else(PoisonError::into_inner);
        if network.reset_traffic() > 0 {
            self.traffic_version.fetch_add(1, Ordering::SeqCst);
        }
        info!("Traffic reset to free flow");
    }
}
