use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use log::{debug, info};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouteError};
use crate::models::{Cost, Location, NodeId, RoadId, TurnKind};

/// Road network as written to / read from JSON files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub nodes: Vec<NodeSpec>,
    pub roads: Vec<RoadSpec>,
    #[serde(default)]
    pub restrictions: Vec<RestrictionSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub signal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadSpec {
    pub id: RoadId,
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_m: Option<f64>,
    /// Traffic only flows `from` -> `to`
    #[serde(default)]
    pub oneway: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestrictionKind {
    /// The turn `from_road` -> `to_road` is forbidden
    #[default]
    No,
    /// Coming from `from_road`, `to_road` is the only allowed exit
    Only,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictionSpec {
    pub from_road: RoadId,
    pub via_node: NodeId,
    pub to_road: RoadId,
    #[serde(default)]
    pub kind: RestrictionKind,
}

/// Intersection (graph vertex)
#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    pub id: NodeId,
    pub location: Location,
    pub has_signal: bool,
}

/// One direction of travel along a road (graph edge)
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub road_id: RoadId,
    pub name: Option<String>,
    pub length_m: f64,
    /// Current speed, may be lowered by traffic updates
    pub speed_kph: f64,
    pub free_flow_speed_kph: f64,
    /// Multiplier on travel time, 1.0 = free flow
    pub traffic_factor: f64,
    pub closed: bool,
    /// Heading along the segment, degrees clockwise from north
    pub bearing: f64,
}

impl RoadSegment {
    /// Travel time in seconds, `None` when the segment is closed
    pub fn travel_time_s(&self) -> Option<Cost> {
        if self.closed || self.speed_kph <= 0.0 {
            return None;
        }
        let meters_per_second = self.speed_kph * 1000.0 / 3600.0;
        Some(self.length_m / meters_per_second * self.traffic_factor)
    }

    pub fn reset_traffic(&mut self) {
        self.speed_kph = self.free_flow_speed_kph;
        self.traffic_factor = 1.0;
        self.closed = false;
    }
}

/// Directed road network graph with turn restrictions
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    graph: DiGraph<Intersection, RoadSegment>,
    node_index: HashMap<NodeId, NodeIndex>,
    road_index: HashMap<RoadId, Vec<EdgeIndex>>,
    banned_turns: HashSet<(EdgeIndex, EdgeIndex)>,
    /// Distinct adjacent intersections per node, regardless of direction
    degree: Vec<usize>,
    restrictions: Vec<RestrictionSpec>,
}

impl RoadNetwork {
    /// Builds and validates a network
    pub fn from_spec(spec: &NetworkSpec, default_speed_kph: f64) -> Result<Self> {
        if spec.nodes.is_empty() {
            return Err(RouteError::InvalidNetwork("network has no nodes".into()));
        }
        if default_speed_kph <= 0.0 {
            return Err(RouteError::InvalidNetwork(format!(
                "default speed must be positive, got {}",
                default_speed_kph
            )));
        }

        let mut graph = DiGraph::with_capacity(spec.nodes.len(), spec.roads.len() * 2);
        let mut node_index = HashMap::with_capacity(spec.nodes.len());

        for node in &spec.nodes {
            let location = Location::new(node.lat, node.lon);
            if !location.is_valid() {
                return Err(RouteError::InvalidNetwork(format!(
                    "node {} has invalid coordinates {}",
                    node.id, location
                )));
            }
            let index = graph.add_node(Intersection {
                id: node.id,
                location,
                has_signal: node.signal,
            });
            if node_index.insert(node.id, index).is_some() {
                return Err(RouteError::InvalidNetwork(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }

        let mut road_index: HashMap<RoadId, Vec<EdgeIndex>> = HashMap::new();
        for road in &spec.roads {
            if road_index.contains_key(&road.id) {
                return Err(RouteError::InvalidNetwork(format!(
                    "duplicate road id {}",
                    road.id
                )));
            }
            let lookup = |id: NodeId| {
                node_index.get(&id).copied().ok_or_else(|| {
                    RouteError::InvalidNetwork(format!(
                        "road {} references unknown node {}",
                        road.id, id
                    ))
                })
            };
            let from = lookup(road.from)?;
            let to = lookup(road.to)?;
            if from == to {
                return Err(RouteError::InvalidNetwork(format!(
                    "road {} starts and ends at node {}",
                    road.id, road.from
                )));
            }

            let speed_kph = road.speed_kph.unwrap_or(default_speed_kph);
            if speed_kph <= 0.0 || !speed_kph.is_finite() {
                return Err(RouteError::InvalidNetwork(format!(
                    "road {} has non-positive speed {}",
                    road.id, speed_kph
                )));
            }

            let start = graph[from].location;
            let end = graph[to].location;
            let length_m = road
                .length_m
                .unwrap_or_else(|| start.haversine_distance_to(&end));
            if length_m < 0.0 || !length_m.is_finite() {
                return Err(RouteError::InvalidNetwork(format!(
                    "road {} has invalid length {}",
                    road.id, length_m
                )));
            }

            let segment = RoadSegment {
                road_id: road.id,
                name: road.name.clone(),
                length_m,
                speed_kph,
                free_flow_speed_kph: speed_kph,
                traffic_factor: 1.0,
                closed: false,
                bearing: start.bearing_to(&end),
            };

            let mut edges = vec![graph.add_edge(from, to, segment.clone())];
            if !road.oneway {
                let reverse = RoadSegment {
                    bearing: end.bearing_to(&start),
                    ..segment
                };
                edges.push(graph.add_edge(to, from, reverse));
            }
            road_index.insert(road.id, edges);
        }

        let degree = graph
            .node_indices()
            .map(|node| {
                graph
                    .neighbors_undirected(node)
                    .collect::<HashSet<_>>()
                    .len()
            })
            .collect();

        let mut network = RoadNetwork {
            graph,
            node_index,
            road_index,
            banned_turns: HashSet::new(),
            degree,
            restrictions: Vec::new(),
        };

        for restriction in &spec.restrictions {
            network.add_restriction(restriction)?;
        }

        info!(
            "Built road network with {} intersections, {} segments and {} banned turns",
            network.node_count(),
            network.segment_count(),
            network.banned_turns.len()
        );

        Ok(network)
    }

    fn add_restriction(&mut self, restriction: &RestrictionSpec) -> Result<()> {
        let via = self.node_index(restriction.via_node).ok_or_else(|| {
            RouteError::InvalidNetwork(format!(
                "turn restriction via unknown node {}",
                restriction.via_node
            ))
        })?;

        let from = self
            .segments_of_road(restriction.from_road)
            .iter()
            .copied()
            .find(|&edge| self.graph.edge_endpoints(edge).map(|(_, head)| head) == Some(via))
            .ok_or_else(|| {
                RouteError::InvalidNetwork(format!(
                    "road {} does not enter node {}",
                    restriction.from_road, restriction.via_node
                ))
            })?;
        let to = self
            .segments_of_road(restriction.to_road)
            .iter()
            .copied()
            .find(|&edge| self.graph.edge_endpoints(edge).map(|(tail, _)| tail) == Some(via))
            .ok_or_else(|| {
                RouteError::InvalidNetwork(format!(
                    "road {} does not leave node {}",
                    restriction.to_road, restriction.via_node
                ))
            })?;

        match restriction.kind {
            RestrictionKind::No => {
                self.banned_turns.insert((from, to));
            }
            RestrictionKind::Only => {
                let others: Vec<EdgeIndex> = self
                    .graph
                    .edges(via)
                    .map(|edge| edge.id())
                    .filter(|&edge| edge != to)
                    .collect();
                for other in others {
                    self.banned_turns.insert((from, other));
                }
            }
        }
        debug!(
            "Turn restriction {:?} road {} -> road {} via node {}",
            restriction.kind, restriction.from_road, restriction.to_road, restriction.via_node
        );
        self.restrictions.push(restriction.clone());
        Ok(())
    }

    /// Converts back to the serialisable form
    pub fn to_spec(&self) -> NetworkSpec {
        let nodes = self
            .graph
            .node_indices()
            .map(|index| {
                let node = &self.graph[index];
                NodeSpec {
                    id: node.id,
                    lat: node.location.lat,
                    lon: node.location.lon,
                    signal: node.has_signal,
                }
            })
            .collect();

        let mut road_ids: Vec<RoadId> = self.road_index.keys().copied().collect();
        road_ids.sort_unstable();
        let roads = road_ids
            .into_iter()
            .filter_map(|road_id| {
                let edges = &self.road_index[&road_id];
                let first = *edges.first()?;
                let (tail, head) = self.graph.edge_endpoints(first)?;
                let segment = &self.graph[first];
                Some(RoadSpec {
                    id: road_id,
                    from: self.graph[tail].id,
                    to: self.graph[head].id,
                    speed_kph: Some(segment.free_flow_speed_kph),
                    length_m: Some(segment.length_m),
                    oneway: edges.len() == 1,
                    name: segment.name.clone(),
                })
            })
            .collect();

        NetworkSpec {
            nodes,
            roads,
            restrictions: self.restrictions.clone(),
        }
    }

    pub fn graph(&self) -> &DiGraph<Intersection, RoadSegment> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn segment_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, index: NodeIndex) -> &Intersection {
        &self.graph[index]
    }

    pub fn node_index(&self, id: NodeId) -> Option<NodeIndex> {
        self.node_index.get(&id).copied()
    }

    pub fn segment(&self, edge: EdgeIndex) -> &RoadSegment {
        &self.graph[edge]
    }

    /// Directed segments of a road (one for one-way roads, two otherwise)
    pub fn segments_of_road(&self, road_id: RoadId) -> &[EdgeIndex] {
        self.road_index
            .get(&road_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    pub fn degree(&self, node: NodeIndex) -> usize {
        self.degree.get(node.index()).copied().unwrap_or(0)
    }

    pub fn travel_time_s(&self, edge: EdgeIndex) -> Option<Cost> {
        self.graph.edge_weight(edge)?.travel_time_s()
    }

    pub fn is_turn_banned(&self, from: EdgeIndex, to: EdgeIndex) -> bool {
        self.banned_turns.contains(&(from, to))
    }

    /// Kind of turn when leaving segment `from` onto segment `to`.
    /// Driving back along the same road is always a U-turn.
    pub fn turn_kind(&self, from: EdgeIndex, to: EdgeIndex) -> TurnKind {
        if let (Some((from_tail, from_head)), Some((to_tail, to_head))) =
            (self.endpoints(from), self.endpoints(to))
        {
            if from_tail == to_head && from_head == to_tail {
                return TurnKind::UTurn;
            }
        }
        TurnKind::between(self.graph[from].bearing, self.graph[to].bearing)
    }

    /// Find the nearest intersection to a given location, with its distance in meters
    pub fn nearest_node(&self, location: &Location) -> Option<(NodeIndex, f64)> {
        let mut nearest = None;
        let mut min_distance = f64::MAX;

        for index in self.graph.node_indices() {
            let distance = self.graph[index].location.haversine_distance_to(location);
            if distance < min_distance {
                min_distance = distance;
                nearest = Some(index);
            }
        }

        nearest.map(|index| (index, min_distance))
    }

    /// Applies `update` to every segment of a road and returns how many
    /// segments actually changed. `None` for unknown roads.
    pub fn update_road<F>(&mut self, road_id: RoadId, mut update: F) -> Option<usize>
    where
        F: FnMut(&mut RoadSegment),
    {
        let edges = self.road_index.get(&road_id)?;
        let mut changed = 0;
        for &edge in edges {
            if let Some(segment) = self.graph.edge_weight_mut(edge) {
                let before = segment.clone();
                update(segment);
                if *segment != before {
                    changed += 1;
                }
            }
        }
        Some(changed)
    }

    /// Hash of the current traffic state (speed, factor and closure of every
    /// segment). Two networks built from the same data with the same traffic
    /// applied share a fingerprint, whatever order the updates came in.
    pub fn traffic_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.graph.edge_count().hash(&mut hasher);
        for segment in self.graph.edge_weights() {
            segment.road_id.hash(&mut hasher);
            segment.speed_kph.to_bits().hash(&mut hasher);
            segment.traffic_factor.to_bits().hash(&mut hasher);
            segment.closed.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Restores free-flow speed on every segment and reopens closed ones
    /// Returns the number of segments that were not at free flow
    pub fn reset_traffic(&mut self) -> usize {
        let mut changed = 0;
        for segment in self.graph.edge_weights_mut() {
            let before = segment.clone();
            segment.reset_traffic();
            if *segment != before {
                changed += 1;
            }
        }
        changed
    }

    /// (min, max) corners as locations; `None` for an empty graph
    pub fn bounds(&self) -> Option<(Location, Location)> {
        let mut nodes = self.graph.node_weights();
        let first = nodes.next()?.location;
        let (mut min, mut max) = (first, first);
        for node in nodes {
            min.lat = min.lat.min(node.location.lat);
            min.lon = min.lon.min(node.location.lon);
            max.lat = max.lat.max(node.location.lat);
            max.lon = max.lon.max(node.location.lon);
        }
        Some((min, max))
    }
}
