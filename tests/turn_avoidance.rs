// Integration tests for turn-aware path search on a single city block
use smart_route::algorithms::shortest_path::shortest_path;
use smart_route::models::{Location, NodeId};
use smart_route::utils::road_network::{NetworkSpec, NodeSpec, RestrictionKind, RestrictionSpec, RoadSpec};
use smart_route::{RoadNetwork, TrafficSide, TurnCostModel};

const A: NodeId = 1;
const B: NodeId = 2;
const C: NodeId = 3;
const D: NodeId = 4;
const E: NodeId = 5;
const F: NodeId = 6;

/// Approach from the south into junction B, destination C to the east.
/// North of B a block D - E - F lets a vehicle go around with left turns only.
///
/// ```text
///   E --- D
///   |     |
///   F --- B --- C
///         |
///         A
/// ```
fn block() -> NetworkSpec {
    let origin = Location::new(12.9716, 77.5946);
    // (id, meters north, meters east)
    let positions = [
        (A, -100.0, 0.0),
        (B, 0.0, 0.0),
        (C, 0.0, 100.0),
        (D, 100.0, 0.0),
        (E, 100.0, -100.0),
        (F, 0.0, -100.0),
    ];
    let nodes = positions
        .iter()
        .map(|&(id, north, east)| {
            let location = origin.offset_m(north, east);
            NodeSpec {
                id,
                lat: location.lat,
                lon: location.lon,
                signal: false,
            }
        })
        .collect();

    let pairs = [(A, B), (B, C), (B, D), (D, E), (E, F), (F, B)];
    let roads = pairs
        .iter()
        .enumerate()
        .map(|(i, &(from, to))| RoadSpec {
            id: i as u64 + 1,
            from,
            to,
            speed_kph: Some(36.0),
            length_m: None,
            oneway: false,
            name: None,
        })
        .collect();

    NetworkSpec {
        nodes,
        roads,
        restrictions: Vec::new(),
    }
}

fn strict_left_hand() -> TurnCostModel {
    TurnCostModel {
        crossing_turn_penalty_s: 60.0,
        sharp_crossing_turn_penalty_s: 80.0,
        ..TurnCostModel::india()
    }
}

fn path(network: &RoadNetwork, model: &TurnCostModel, from: NodeId, to: NodeId) -> Vec<NodeId> {
    let source = network.node_index(from).unwrap();
    let target = network.node_index(to).unwrap();
    shortest_path(network, model, source, target)
        .expect("destination should be reachable")
        .nodes
}

#[test]
fn test_loops_around_block_instead_of_crossing_traffic() {
    let network = RoadNetwork::from_spec(&block(), 30.0).unwrap();
    let model = strict_left_hand();

    let source = network.node_index(A).unwrap();
    let target = network.node_index(C).unwrap();
    let leg = shortest_path(&network, &model, source, target).unwrap();

    println!("Path: {:?}, cost {:.1} s", leg.nodes, leg.cost_s);
    assert_eq!(leg.nodes, vec![A, B, D, E, F, B, C]);
    assert_eq!(leg.turns.crossing(TrafficSide::Left), 0);
    assert!(leg.distance_m > 590.0 && leg.distance_m < 610.0);
}

#[test]
fn test_mild_penalty_takes_the_right_turn() {
    let network = RoadNetwork::from_spec(&block(), 30.0).unwrap();
    let model = TurnCostModel::india();

    let source = network.node_index(A).unwrap();
    let target = network.node_index(C).unwrap();
    let leg = shortest_path(&network, &model, source, target).unwrap();

    // 20 s of driving plus 30 s waiting beats a 60 s loop
    assert_eq!(leg.nodes, vec![A, B, C]);
    assert_eq!(leg.turns.right, 1);
    assert!((leg.cost_s - 50.0).abs() < 1.0);
}

#[test]
fn test_right_hand_traffic_turns_right_directly() {
    let network = RoadNetwork::from_spec(&block(), 30.0).unwrap();
    let model = TurnCostModel::right_hand();

    assert_eq!(path(&network, &model, A, C), vec![A, B, C]);
}

#[test]
fn test_banned_turn_forces_the_loop() {
    let mut spec = block();
    spec.restrictions.push(RestrictionSpec {
        from_road: 1,
        via_node: B,
        to_road: 2,
        kind: RestrictionKind::No,
    });
    let network = RoadNetwork::from_spec(&spec, 30.0).unwrap();

    assert_eq!(
        path(&network, &TurnCostModel::india(), A, C),
        vec![A, B, D, E, F, B, C]
    );
}

#[test]
fn test_closed_road_removes_the_loop() {
    let mut network = RoadNetwork::from_spec(&block(), 30.0).unwrap();
    assert_eq!(network.update_road(3, |segment| segment.closed = true), Some(2));

    assert_eq!(path(&network, &strict_left_hand(), A, C), vec![A, B, C]);

    network.reset_traffic();
    assert_eq!(
        path(&network, &strict_left_hand(), A, C),
        vec![A, B, D, E, F, B, C]
    );
}

#[test]
fn test_no_penalties_is_plain_shortest_path() {
    let network = RoadNetwork::from_spec(&block(), 30.0).unwrap();
    let model = TurnCostModel::travel_time_only();

    assert_eq!(path(&network, &model, A, C), vec![A, B, C]);
    assert_eq!(path(&network, &model, D, C), vec![D, B, C]);
}
