//! # smart-route CLI
//!
//! Turn-aware delivery route planning from the command line.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};

use smart_route::server::run_server;
use smart_route::traffic::load_updates;
use smart_route::utils::init_map::{grid_network, load_network, random_waypoints, save_network_spec, GridOptions};
use smart_route::utils::road_network::RoadNetwork;
use smart_route::utils::visualize::plot_route;
use smart_route::{
    FileTrafficFeed, LegMatrix, Location, RouteEngine, RouterConfig, SolverKind, TrafficRefresher, Waypoint,
};

#[derive(Parser)]
#[command(name = "smart-route")]
#[command(about = "Delivery route optimizer that avoids turns across oncoming traffic")]
#[command(long_about = "Orders delivery stops on a road network so the tour avoids turns
across oncoming traffic (right turns under left-hand traffic).

  smart-route generate --rows 20 --cols 20 --out city.json
  smart-route optimize --network city.json --stop 12.972,77.595 --stop 12.975,77.598
  smart-route optimize --network vertices.txt,edges.txt --stops stops.json --round-trip
  smart-route serve --network city.json --feed traffic.json")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration (turn penalties, solver, network defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a synthetic grid network as JSON
    Generate {
        #[arg(long, default_value_t = 10)]
        rows: usize,
        #[arg(long, default_value_t = 10)]
        cols: usize,
        /// Block length in meters
        #[arg(long, default_value_t = 100.0)]
        spacing: f64,
        #[arg(long, default_value_t = 0.1)]
        oneway_ratio: f64,
        #[arg(long, default_value_t = 0.2)]
        signal_ratio: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        out: PathBuf,
        /// Also write this many random stops next to the network
        #[arg(long)]
        stops: Option<usize>,
        #[arg(long)]
        stops_out: Option<PathBuf>,
    },
    /// Turn-aware path between two coordinates
    Route {
        #[command(flatten)]
        network: NetworkArgs,
        #[arg(long)]
        from: Location,
        #[arg(long)]
        to: Location,
    },
    /// Compute the leg matrix of a set of stops and cache it as JSON
    Matrix {
        #[command(flatten)]
        network: NetworkArgs,
        #[command(flatten)]
        stops: StopArgs,
        #[arg(long)]
        out: PathBuf,
    },
    /// Order the stops, the first one is the depot
    Optimize {
        #[command(flatten)]
        network: NetworkArgs,
        #[command(flatten)]
        stops: StopArgs,
        #[command(flatten)]
        solver: SolverArgs,
        /// Reuse a matrix written by `matrix`
        #[arg(long)]
        matrix: Option<PathBuf>,
        /// Save the route as PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Poll a traffic file and re-optimize after every change
    Watch {
        #[command(flatten)]
        network: NetworkArgs,
        #[command(flatten)]
        stops: StopArgs,
        #[command(flatten)]
        solver: SolverArgs,
        /// JSON list of traffic updates, re-read on every poll
        #[arg(long)]
        feed: PathBuf,
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
        /// Stop after this many polls
        #[arg(long, default_value_t = 10)]
        rounds: usize,
    },
    /// Serve the optimizer over HTTP
    Serve {
        #[command(flatten)]
        network: NetworkArgs,
        #[arg(long, default_value = "0.0.0.0:8000")]
        addr: SocketAddr,
        /// Traffic file polled in the background while serving
        #[arg(long)]
        feed: Option<PathBuf>,
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
}

#[derive(Args)]
struct NetworkArgs {
    /// Network JSON, or `vertices.txt,edges.txt`
    #[arg(short, long)]
    network: String,

    /// Traffic updates applied before routing
    #[arg(long)]
    traffic: Option<PathBuf>,
}

#[derive(Args)]
struct StopArgs {
    /// JSON list of `{"label", "lat", "lon"}` stops
    #[arg(long)]
    stops: Option<PathBuf>,

    /// A stop as `lat,lon`, may be repeated
    #[arg(long = "stop")]
    stop: Vec<Location>,
}

#[derive(Args)]
struct SolverArgs {
    /// auto, nearest, two-opt or exhaustive
    #[arg(long)]
    solver: Option<SolverKind>,

    /// Return to the depot after the last stop
    #[arg(long)]
    round_trip: bool,
}

fn load_config(path: Option<&Path>) -> Result<RouterConfig> {
    match path {
        Some(path) => RouterConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(RouterConfig::default()),
    }
}

fn load_engine(args: &NetworkArgs, config: RouterConfig) -> Result<RouteEngine> {
    let network = load_network(&args.network, config.network.default_speed_kph)
        .with_context(|| format!("Failed to load network {}", args.network))?;
    info!(
        "Network has {} intersections and {} directed segments",
        network.node_count(),
        network.segment_count()
    );

    let engine = RouteEngine::new(network, config);
    if let Some(path) = &args.traffic {
        let updates =
            load_updates(path).with_context(|| format!("Failed to read traffic from {}", path.display()))?;
        engine.apply_traffic(&updates)?;
    }
    Ok(engine)
}

fn load_stops(args: &StopArgs) -> Result<Vec<Waypoint>> {
    let mut waypoints: Vec<Waypoint> = match &args.stops {
        Some(path) => {
            let json =
                fs::read_to_string(path).with_context(|| format!("Failed to read stops from {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("Invalid stops file {}", path.display()))?
        }
        None => Vec::new(),
    };
    let offset = waypoints.len();
    waypoints.extend(
        args.stop
            .iter()
            .enumerate()
            .map(|(i, &location)| Waypoint::numbered(offset + i, location)),
    );

    if waypoints.len() < 2 {
        bail!("Need at least two stops, got {}", waypoints.len());
    }
    Ok(waypoints)
}

/// How long `watch` waits for a report: two poll intervals plus a second
fn report_timeout(interval_secs: u64) -> Duration {
    Duration::from_secs(interval_secs.saturating_mul(2).saturating_add(1))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr, RUST_LOG wins unless --verbose is given
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.target(env_logger::Target::Stderr).init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Generate {
            rows,
            cols,
            spacing,
            oneway_ratio,
            signal_ratio,
            seed,
            out,
            stops,
            stops_out,
        } => {
            let spec = grid_network(&GridOptions {
                rows,
                cols,
                spacing_m: spacing,
                oneway_ratio,
                signal_ratio,
                seed,
                ..GridOptions::default()
            });
            save_network_spec(&spec, &out).with_context(|| format!("Failed to write {}", out.display()))?;
            info!("Network written to {}", out.display());

            if let Some(count) = stops {
                let network = RoadNetwork::from_spec(&spec, config.network.default_speed_kph)?;
                let waypoints = random_waypoints(&network, count, seed);
                let path = stops_out.unwrap_or_else(|| out.with_extension("stops.json"));
                fs::write(&path, serde_json::to_string_pretty(&waypoints)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("{} stops written to {}", waypoints.len(), path.display());
            }
        }
        Command::Route { network, from, to } => {
            let engine = load_engine(&network, config)?;
            let leg = engine.route(&from, &to)?;
            print_json(&leg)?;
        }
        Command::Matrix { network, stops, out } => {
            let engine = load_engine(&network, config)?;
            let waypoints = load_stops(&stops)?;
            let matrix = engine.matrix(&waypoints)?;
            matrix.save(&out)?;
        }
        Command::Optimize {
            network,
            stops,
            solver,
            matrix,
            plot,
        } => {
            if let Some(kind) = solver.solver {
                config.solver.kind = kind;
            }
            config.solver.round_trip |= solver.round_trip;
            let options = config.solver.clone();

            let engine = load_engine(&network, config)?;
            let waypoints = load_stops(&stops)?;
            let route = match matrix {
                Some(path) => {
                    let matrix = LegMatrix::load(&path)
                        .with_context(|| format!("Failed to load matrix {}", path.display()))?;
                    engine.optimize_with_matrix(&waypoints, &matrix, &options)?
                }
                None => engine.optimize(&waypoints, &options)?,
            };

            if let Some(path) = plot {
                plot_route(&engine.network(), &route, &path)?;
            }
            print_json(&route)?;
        }
        Command::Watch {
            network,
            stops,
            solver,
            feed,
            interval_secs,
            rounds,
        } => {
            if let Some(kind) = solver.solver {
                config.solver.kind = kind;
            }
            config.solver.round_trip |= solver.round_trip;
            let options = config.solver.clone();

            let engine = Arc::new(load_engine(&network, config)?);
            let waypoints = load_stops(&stops)?;
            let mut matrix = engine.matrix(&waypoints)?;

            let refresher = TrafficRefresher::spawn(
                Arc::clone(&engine),
                Box::new(FileTrafficFeed::new(feed)),
                Duration::from_secs(interval_secs),
            );
            let mut last_order: Option<Vec<usize>> = None;
            for _ in 0..rounds {
                // Allow a missed poll before giving up on this round
                let Some(report) = refresher.recv_report_timeout(report_timeout(interval_secs)) else {
                    continue;
                };
                if matrix.is_stale(engine.traffic_fingerprint()) || last_order.is_none() {
                    matrix = engine.matrix(&waypoints)?;
                    let route = engine.optimize_with_matrix(&waypoints, &matrix, &options)?;
                    if last_order.as_ref() != Some(&route.optimized_order) {
                        info!("Traffic version {}: new order {:?}", report.version, route.optimized_order);
                        print_json(&route)?;
                    }
                    last_order = Some(route.optimized_order);
                }
            }
            refresher.stop();
        }
        Command::Serve {
            network,
            addr,
            feed,
            interval_secs,
        } => {
            let engine = Arc::new(load_engine(&network, config)?);
            let refresher = feed.map(|path| {
                TrafficRefresher::spawn(
                    Arc::clone(&engine),
                    Box::new(FileTrafficFeed::new(path)),
                    Duration::from_secs(interval_secs),
                )
            });

            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime
                .block_on(run_server(engine, addr))
                .with_context(|| format!("Server on {} failed", addr))?;

            if let Some(refresher) = refresher {
                refresher.stop();
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_timeout() {
        assert_eq!(report_timeout(30), Duration::from_secs(61));
        assert_eq!(report_timeout(0), Duration::from_secs(1));
        assert_eq!(report_timeout(u64::MAX), Duration::from_secs(u64::MAX));
        assert_eq!(report_timeout(u64::MAX / 2 + 1), Duration::from_secs(u64::MAX));
    }
}
