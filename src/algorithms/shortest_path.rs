//! Turn-aware shortest paths.
//!
//! The search runs on road segments rather than intersections: the state is
//! "arrived at the end of segment e". Moving on to segment f costs the turn
//! penalty for e -> f plus the travel time of f, so the same intersection can
//! be crossed several times (looping around a block to replace a crossing
//! turn with kerbside turns).

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use log::debug;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use priority_queue::PriorityQueue;

use crate::algorithms::turn_cost::TurnCostModel;
use crate::models::{Cost, Leg, TurnCounts, TurnKind};
use crate::utils::road_network::RoadNetwork;

/// Queue priority: cost in milliseconds, so that the key is totally ordered
fn priority(cost: Cost) -> Reverse<u64> {
    Reverse((cost * 1000.0).round() as u64)
}

/// Calculate turn-aware paths from `source` to every node in `targets`.
/// The result is aligned with `targets`; unreachable targets are `None`.
pub fn one_to_many(
    network: &RoadNetwork,
    model: &TurnCostModel,
    source: NodeIndex,
    targets: &[NodeIndex],
) -> Vec<Option<Leg>> {
    let mut results: Vec<Option<Leg>> = vec![None; targets.len()];
    let mut pending: HashMap<NodeIndex, Vec<usize>> = HashMap::new();

    for (i, &target) in targets.iter().enumerate() {
        if target == source {
            results[i] = Some(Leg::empty(network.node(source).id));
        } else {
            pending.entry(target).or_default().push(i);
        }
    }
    if pending.is_empty() {
        return results;
    }

    let graph = network.graph();
    let mut costs: HashMap<EdgeIndex, Cost> = HashMap::new();
    let mut parents: HashMap<EdgeIndex, EdgeIndex> = HashMap::new();
    let mut settled: HashSet<EdgeIndex> = HashSet::new();
    let mut queue: PriorityQueue<EdgeIndex, Reverse<u64>> = PriorityQueue::new();

    // No turn is charged when pulling away from the origin
    for edge in graph.edges(source) {
        if let Some(time) = network.travel_time_s(edge.id()) {
            costs.insert(edge.id(), time);
            queue.push(edge.id(), priority(time));
        }
    }

    while let Some((edge, _)) = queue.pop() {
        if !settled.insert(edge) {
            continue;
        }
        let cost = costs[&edge];
        let Some((_, head)) = network.endpoints(edge) else {
            continue;
        };

        // The first settled segment entering a target is its cheapest arrival
        if let Some(indices) = pending.remove(&head) {
            let leg = build_leg(network, model, source, edge, cost, &parents);
            for i in indices {
                results[i] = Some(leg.clone());
            }
            if pending.is_empty() {
                break;
            }
        }

        let via_degree = network.degree(head);
        let has_signal = network.node(head).has_signal;

        for next in graph.edges(head) {
            let next_edge = next.id();
            if settled.contains(&next_edge) || network.is_turn_banned(edge, next_edge) {
                continue;
            }
            let Some(travel) = network.travel_time_s(next_edge) else {
                continue;
            };
            let kind = network.turn_kind(edge, next_edge);
            let Some(penalty) = model.penalty(kind, via_degree, has_signal) else {
                continue;
            };

            let candidate = cost + penalty + travel;
            let is_shorter = match costs.get(&next_edge) {
                Some(&current) => candidate < current,
                None => true,
            };
            if is_shorter {
                costs.insert(next_edge, candidate);
                parents.insert(next_edge, edge);
                queue.push(next_edge, priority(candidate));
            }
        }
    }

    if !pending.is_empty() {
        debug!(
            "{} target(s) unreachable from node {}",
            pending.len(),
            network.node(source).id
        );
    }

    results
}

/// Calculate the turn-aware shortest path between two intersections
pub fn shortest_path(
    network: &RoadNetwork,
    model: &TurnCostModel,
    source: NodeIndex,
    target: NodeIndex,
) -> Option<Leg> {
    one_to_many(network, model, source, &[target])
        .pop()
        .flatten()
}

/// Walks parent links back to the origin and assembles the leg
fn build_leg(
    network: &RoadNetwork,
    model: &TurnCostModel,
    source: NodeIndex,
    last: EdgeIndex,
    cost: Cost,
    parents: &HashMap<EdgeIndex, EdgeIndex>,
) -> Leg {
    let mut edges = vec![last];
    let mut current = last;
    while let Some(&parent) = parents.get(&current) {
        edges.push(parent);
        current = parent;
    }
    edges.reverse();

    let mut nodes = Vec::with_capacity(edges.len() + 1);
    nodes.push(network.node(source).id);
    let mut distance_m = 0.0;
    for &edge in &edges {
        if let Some((_, head)) = network.endpoints(edge) {
            nodes.push(network.node(head).id);
        }
        distance_m += network.segment(edge).length_m;
    }

    let mut turns = TurnCounts::default();
    for pair in edges.windows(2) {
        let kind = network.turn_kind(pair[0], pair[1]);
        let junction = network
            .endpoints(pair[0])
            .map(|(_, via)| network.degree(via) >= model.min_degree_for_penalty)
            .unwrap_or(false);
        if junction || kind == TurnKind::UTurn {
            turns.record(kind);
        }
    }

    Leg {
        nodes,
        cost_s: cost,
        distance_m,
        departure_bearing: edges.first().map(|&edge| network.segment(edge).bearing),
        arrival_bearing: edges.last().map(|&edge| network.segment(edge).bearing),
        turns,
    }
}
