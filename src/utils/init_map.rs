use std::fs::{self, File};
use std::io::{self, BufRead};
use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{Result, RouteError};
use crate::models::{Location, NodeId, RoadId, Waypoint};

use super::road_network::{NetworkSpec, NodeSpec, RoadNetwork, RoadSpec};

/// Loads a network from JSON (`.json`) or from a pair of whitespace text
/// files given as `vertices.txt,edges.txt`
pub fn load_network(path: &str, default_speed_kph: f64) -> Result<RoadNetwork> {
    let spec = match path.split_once(',') {
        Some((vertices, edges)) => load_text_network(vertices, edges)?,
        None => load_network_spec(path)?,
    };
    RoadNetwork::from_spec(&spec, default_speed_kph)
}

pub fn load_network_spec<P: AsRef<Path>>(path: P) -> Result<NetworkSpec> {
    let json = fs::read_to_string(path.as_ref())?;
    let spec: NetworkSpec = serde_json::from_str(&json)?;
    info!(
        "Loaded {} road vertices and {} roads from {}",
        spec.nodes.len(),
        spec.roads.len(),
        path.as_ref().display()
    );
    Ok(spec)
}

pub fn save_network_spec<P: AsRef<Path>>(spec: &NetworkSpec, path: P) -> Result<()> {
    let json = serde_json::to_string_pretty(spec)?;
    fs::write(path, json)?;
    Ok(())
}

/// Loads whitespace separated text files:
/// vertices `id lon lat [signal]`, edges `id start end [speed_kph] [oneway]`.
/// Blank lines and lines starting with `#` are skipped.
pub fn load_text_network<P: AsRef<Path>>(vertices: P, edges: P) -> Result<NetworkSpec> {
    let nodes = load_road_vertices(vertices)?;
    info!("Loaded {} road vertices", nodes.len());

    let roads = load_road_edges(edges)?;
    info!("Loaded {} roads", roads.len());

    Ok(NetworkSpec {
        nodes,
        roads,
        restrictions: Vec::new(),
    })
}

fn data_lines<P: AsRef<Path>>(path: P) -> Result<Vec<(usize, String)>> {
    let file = File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut lines = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        lines.push((number + 1, trimmed.to_string()));
    }
    Ok(lines)
}

fn field<T: std::str::FromStr>(parts: &[&str], index: usize, line: usize, what: &str) -> Result<T> {
    parts
        .get(index)
        .and_then(|value| value.parse::<T>().ok())
        .ok_or_else(|| RouteError::InvalidNetwork(format!("line {}: bad or missing {}", line, what)))
}

fn flag(parts: &[&str], index: usize) -> bool {
    matches!(parts.get(index), Some(&"1") | Some(&"true") | Some(&"yes"))
}

// Load road vertex data
fn load_road_vertices<P: AsRef<Path>>(path: P) -> Result<Vec<NodeSpec>> {
    let mut vertices = Vec::new();

    for (line, content) in data_lines(path)? {
        let parts: Vec<&str> = content.split_whitespace().collect();
        let id: NodeId = field(&parts, 0, line, "vertex id")?;
        let lon: f64 = field(&parts, 1, line, "longitude")?;
        let lat: f64 = field(&parts, 2, line, "latitude")?;

        vertices.push(NodeSpec {
            id,
            lat,
            lon,
            signal: flag(&parts, 3),
        });
    }

    Ok(vertices)
}

// Load road edge data
fn load_road_edges<P: AsRef<Path>>(path: P) -> Result<Vec<RoadSpec>> {
    let mut edges = Vec::new();

    for (line, content) in data_lines(path)? {
        let parts: Vec<&str> = content.split_whitespace().collect();
        let id: RoadId = field(&parts, 0, line, "edge id")?;
        let from: NodeId = field(&parts, 1, line, "start vertex")?;
        let to: NodeId = field(&parts, 2, line, "end vertex")?;
        let speed_kph = match parts.get(3) {
            Some(_) => Some(field::<f64>(&parts, 3, line, "speed")?),
            None => None,
        };

        edges.push(RoadSpec {
            id,
            from,
            to,
            speed_kph,
            length_m: None,
            oneway: flag(&parts, 4),
            name: None,
        });
    }

    Ok(edges)
}

/// Parameters of a synthetic street grid
#[derive(Debug, Clone)]
pub struct GridOptions {
    pub rows: usize,
    pub cols: usize,
    pub spacing_m: f64,
    /// South-west corner
    pub origin: Location,
    /// Share of streets made one-way
    pub oneway_ratio: f64,
    /// Share of interior junctions with traffic signals
    pub signal_ratio: f64,
    pub speeds_kph: Vec<f64>,
    pub seed: u64,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            rows: 10,
            cols: 10,
            spacing_m: 100.0,
            // Bengaluru
            origin: Location::new(12.9716, 77.5946),
            oneway_ratio: 0.1,
            signal_ratio: 0.2,
            speeds_kph: vec![20.0, 30.0, 40.0, 50.0],
            seed: 42,
        }
    }
}

/// Generates a seeded street grid. Node ids are `row * cols + col + 1`.
pub fn grid_network(options: &GridOptions) -> NetworkSpec {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let node_id = |row: usize, col: usize| (row * options.cols + col + 1) as NodeId;

    let mut nodes = Vec::with_capacity(options.rows * options.cols);
    for row in 0..options.rows {
        for col in 0..options.cols {
            let location = options.origin.offset_m(
                row as f64 * options.spacing_m,
                col as f64 * options.spacing_m,
            );
            let interior =
                row > 0 && col > 0 && row + 1 < options.rows && col + 1 < options.cols;
            nodes.push(NodeSpec {
                id: node_id(row, col),
                lat: location.lat,
                lon: location.lon,
                signal: interior && rng.gen_bool(options.signal_ratio.clamp(0.0, 1.0)),
            });
        }
    }

    let mut roads = Vec::new();
    let mut next_road: RoadId = 1;
    let mut add_road = |rng: &mut StdRng, a: NodeId, b: NodeId| {
        let speed_kph = options.speeds_kph.choose(rng).copied();
        let oneway = rng.gen_bool(options.oneway_ratio.clamp(0.0, 1.0));
        // One-way streets run in a random direction
        let (from, to) = if oneway && rng.gen_bool(0.5) { (b, a) } else { (a, b) };
        roads.push(RoadSpec {
            id: next_road,
            from,
            to,
            speed_kph,
            length_m: None,
            oneway,
            name: None,
        });
        next_road += 1;
    };

    for row in 0..options.rows {
        for col in 0..options.cols {
            if col + 1 < options.cols {
                add_road(&mut rng, node_id(row, col), node_id(row, col + 1));
            }
            if row + 1 < options.rows {
                add_road(&mut rng, node_id(row, col), node_id(row + 1, col));
            }
        }
    }

    info!(
        "Generated {}x{} grid with {} roads",
        options.rows,
        options.cols,
        roads.len()
    );

    NetworkSpec {
        nodes,
        roads,
        restrictions: Vec::new(),
    }
}

/// Picks `count` distinct intersections as delivery stops
pub fn random_waypoints(network: &RoadNetwork, count: usize, seed: u64) -> Vec<Waypoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let nodes: Vec<_> = network.graph().node_indices().collect();

    nodes
        .choose_multiple(&mut rng, count.min(nodes.len()))
        .enumerate()
        .map(|(i, &index)| Waypoint::numbered(i, network.node(index).location))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_shape() {
        let spec = grid_network(&GridOptions {
            rows: 3,
            cols: 4,
            ..GridOptions::default()
        });

        assert_eq!(spec.nodes.len(), 12);
        // 3 rows x 3 horizontal + 2 x 4 vertical
        assert_eq!(spec.roads.len(), 17);
        assert!(RoadNetwork::from_spec(&spec, 30.0).is_ok());
    }

    #[test]
    fn test_grid_is_deterministic() {
        let options = GridOptions::default();
        assert_eq!(grid_network(&options), grid_network(&options));

        let other = GridOptions {
            seed: 7,
            ..GridOptions::default()
        };
        assert_ne!(grid_network(&options).roads, grid_network(&other).roads);
    }

    #[test]
    fn test_no_oneway_when_ratio_is_zero() {
        let spec = grid_network(&GridOptions {
            oneway_ratio: 0.0,
            ..GridOptions::default()
        });
        assert!(spec.roads.iter().all(|road| !road.oneway));
    }

    #[test]
    fn test_random_waypoints_are_distinct() {
        let network = RoadNetwork::from_spec(&grid_network(&GridOptions::default()), 30.0).unwrap();
        let waypoints = random_waypoints(&network, 6, 1);

        assert_eq!(waypoints.len(), 6);
        assert_eq!(waypoints[0].label, "Stop 1");
        for i in 0..waypoints.len() {
            for j in i + 1..waypoints.len() {
                assert_ne!(waypoints[i].location, waypoints[j].location);
            }
        }
    }

    #[test]
    fn test_text_format() {
        let dir = tempfile::tempdir().unwrap();
        let vertices = dir.path().join("vertices.txt");
        let edges = dir.path().join("edges.txt");
        fs::write(
            &vertices,
            "# id lon lat signal\n1 77.5946 12.9716\n2 77.5956 12.9716 1\n\n3 77.5956 12.9726\n",
        )
        .unwrap();
        fs::write(&edges, "10 1 2\n11 2 3 40 1\n").unwrap();

        let spec = load_text_network(&vertices, &edges).unwrap();
        assert_eq!(spec.nodes.len(), 3);
        assert!(spec.nodes[1].signal);
        assert_eq!(spec.roads[1].speed_kph, Some(40.0));
        assert!(spec.roads[1].oneway);
        assert!(!spec.roads[0].oneway);

        let network = RoadNetwork::from_spec(&spec, 30.0).unwrap();
        assert_eq!(network.segment_count(), 3);

        fs::write(&edges, "10 1 x\n").unwrap();
        assert!(matches!(
            load_text_network(&vertices, &edges),
            Err(RouteError::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let spec = grid_network(&GridOptions {
            rows: 2,
            cols: 2,
            ..GridOptions::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");

        save_network_spec(&spec, &path).unwrap();
        let loaded = load_network_spec(&path).unwrap();
        assert_eq!(loaded.roads, spec.roads);

        let network = load_network(path.to_str().unwrap(), 30.0).unwrap();
        assert_eq!(network.node_count(), 4);
    }
}
