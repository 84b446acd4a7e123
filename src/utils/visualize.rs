use std::fmt::Display;
use std::path::Path;

use log::info;
use plotters::prelude::*;

use crate::error::{Result, RouteError};
use crate::models::{Location, OptimizedRoute};

use super::road_network::RoadNetwork;

fn plot_error<E: Display>(e: E) -> RouteError {
    RouteError::Plot(e.to_string())
}

/// Image settings for [`plot_route_with`]
#[derive(Debug, Clone, Copy)]
pub struct PlotOptions {
    pub width: u32,
    pub height: u32,
    /// Caption, axis labels, stop numbers and legend. These need system fonts.
    pub labels: bool,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 800,
            labels: true,
        }
    }
}

/// Draws the street network with the optimized tour on top.
/// Closed segments are red, the depot blue and the other stops green.
pub fn plot_route<P: AsRef<Path>>(network: &RoadNetwork, route: &OptimizedRoute, output_path: P) -> Result<()> {
    plot_route_with(network, route, output_path, &PlotOptions::default())
}

pub fn plot_route_with<P: AsRef<Path>>(
    network: &RoadNetwork,
    route: &OptimizedRoute,
    output_path: P,
    options: &PlotOptions,
) -> Result<()> {
    let (mut min, mut max) = network
        .bounds()
        .ok_or_else(|| RouteError::Plot("network has no intersections".into()))?;
    for location in &route.coordinates {
        min.lat = min.lat.min(location.lat);
        min.lon = min.lon.min(location.lon);
        max.lat = max.lat.max(location.lat);
        max.lon = max.lon.max(location.lon);
    }
    // Margin so stops on the border stay visible
    let pad_x = ((max.lon - min.lon) * 0.05).max(1e-4);
    let pad_y = ((max.lat - min.lat) * 0.05).max(1e-4);

    let root = BitMapBackend::new(output_path.as_ref(), (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if options.labels {
        builder
            .caption(
                format!(
                    "{} stops, {:.1} min, {:.2} km, {} crossing turns",
                    route.optimized_order.len(),
                    route.total_cost_s / 60.0,
                    route.total_distance_km,
                    route.crossing_turns
                ),
                ("sans-serif", 20).into_font(),
            )
            .x_label_area_size(30)
            .y_label_area_size(40);
    }
    let mut chart = builder
        .build_cartesian_2d(min.lon - pad_x..max.lon + pad_x, min.lat - pad_y..max.lat + pad_y)
        .map_err(plot_error)?;

    if options.labels {
        chart.configure_mesh().draw().map_err(plot_error)?;
    }

    let graph = network.graph();
    let streets = graph.edge_indices().filter_map(|edge| {
        let (tail, head) = graph.edge_endpoints(edge)?;
        let (a, b) = (graph[tail].location, graph[head].location);
        let style = if graph[edge].closed {
            RED.mix(0.6).stroke_width(2)
        } else {
            RGBColor(190, 190, 190).stroke_width(1)
        };
        Some(PathElement::new(vec![(a.lon, a.lat), (b.lon, b.lat)], style))
    });
    chart.draw_series(streets).map_err(plot_error)?;

    let colors = [
        RGBColor(255, 165, 0),  // Orange
        RGBColor(128, 0, 128),  // Purple
        RGBColor(0, 128, 128),  // Teal
        RGBColor(70, 130, 180), // Steel blue
    ];
    for (i, leg) in route.legs.iter().enumerate() {
        let points: Vec<(f64, f64)> = leg
            .nodes
            .iter()
            .filter_map(|&id| network.node_index(id))
            .map(|index| {
                let location = network.node(index).location;
                (location.lon, location.lat)
            })
            .collect();
        let color = colors[i % colors.len()];
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(3)))
            .map_err(plot_error)?
            .label(format!("Leg {} ({:.1} min)", i + 1, leg.cost_s / 60.0))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(3)));
    }

    for (position, &stop) in route.optimized_order.iter().enumerate() {
        let Some(location) = route.coordinates.get(stop) else {
            continue;
        };
        let Location { lat, lon } = *location;
        let style = if position == 0 {
            ShapeStyle::from(&BLUE).filled()
        } else {
            ShapeStyle::from(&GREEN).filled()
        };
        chart
            .draw_series(std::iter::once(Circle::new((lon, lat), 8, style)))
            .map_err(plot_error)?;
        if options.labels {
            chart
                .draw_series(std::iter::once(Text::new(
                    format!("{}", position + 1),
                    (lon, lat),
                    ("sans-serif", 14).into_font(),
                )))
                .map_err(plot_error)?;
        }
    }

    if options.labels {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .position(SeriesLabelPosition::UpperLeft)
            .draw()
            .map_err(plot_error)?;
    }

    root.present().map_err(plot_error)?;
    info!("Route plot saved to {}", output_path.as_ref().display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::tsp::{SolverKind, SolverOptions};
    use crate::config::RouterConfig;
    use crate::engine::RouteEngine;
    use crate::models::Waypoint;
    use crate::traffic::TrafficUpdate;
    use crate::utils::init_map::{grid_network, GridOptions};

    #[test]
    fn test_plot_small_grid_route() {
        let spec = grid_network(&GridOptions {
            rows: 4,
            cols: 4,
            oneway_ratio: 0.0,
            ..GridOptions::default()
        });
        let config = RouterConfig::default();
        let network = RoadNetwork::from_spec(&spec, config.network.default_speed_kph).unwrap();
        let engine = RouteEngine::new(network, config);
        engine.apply_traffic(&[TrafficUpdate::closure(5)]).unwrap();

        let waypoints: Vec<Waypoint> = {
            let network = engine.network();
            [1, 16, 4, 13]
                .iter()
                .enumerate()
                .map(|(i, &id)| Waypoint::numbered(i, network.node(network.node_index(id).unwrap()).location))
                .collect()
        };
        let options = SolverOptions {
            kind: SolverKind::Exhaustive,
            round_trip: true,
            ..SolverOptions::default()
        };
        let route = engine.optimize(&waypoints, &options).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("route.png");
        let plot = PlotOptions {
            width: 320,
            height: 240,
            labels: false,
        };
        plot_route_with(&engine.network(), &route, &path, &plot).unwrap();

        let size = std::fs::metadata(&path).unwrap().len();
        assert!(size > 0);
    }
}
