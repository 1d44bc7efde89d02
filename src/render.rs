//! Turns planned routes into a map artifact.

use geo::Point;
use serde_json::{Value, json};

use crate::graph::{Path, RouteNetwork};
use crate::heatmap::HeatCell;
use crate::planner::RouteKind;
use crate::stats::PathStats;

/// One route variant to draw.
pub struct RouteLayer<'a> {
    pub kind: RouteKind,
    pub path: &'a Path,
    pub stats: PathStats,
}

/// Everything a renderer needs for one response.
pub struct MapView<'a> {
    pub network: &'a RouteNetwork,
    pub origin: (Point<f64>, &'a str),
    pub destination: (Point<f64>, &'a str),
    pub routes: Vec<RouteLayer<'a>>,
    pub crime_cells: &'a [HeatCell],
}

pub trait MapRenderer {
    type Artifact;

    fn render(&self, view: &MapView<'_>) -> Self::Artifact;
}

/// Renders a GeoJSON FeatureCollection with one LineString per route,
/// start/end markers and the crime heat cells.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoJsonRenderer;

impl GeoJsonRenderer {
    fn color(kind: RouteKind) -> &'static str {
        match kind {
            RouteKind::Safest => "blue",
            RouteKind::Fastest => "green",
            RouteKind::MostUnsafe => "red",
        }
    }
}

pub(crate) fn line_coordinates(network: &RouteNetwork, path: &Path) -> Vec<[f64; 2]> {
    // GeoJSON is [lon, lat]
    path.iter()
        .map(|&n| {
            let node = network.node(n);
            [node.lon, node.lat]
        })
        .collect()
}

fn marker(point: Point<f64>, role: &str, label: &str) -> Value {
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [point.x(), point.y()] },
        "properties": { "role": role, "label": label },
    })
}

impl MapRenderer for GeoJsonRenderer {
    type Artifact = Value;

    fn render(&self, view: &MapView<'_>) -> Value {
        let mut features = vec![
            marker(view.origin.0, "start", view.origin.1),
            marker(view.destination.0, "end", view.destination.1),
        ];

        for layer in &view.routes {
            features.push(json!({
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": line_coordinates(view.network, layer.path),
                },
                "properties": {
                    "route": layer.kind.to_string(),
                    "color": Self::color(layer.kind),
                    "distance_km": layer.stats.distance_km,
                    "crime_score": layer.stats.crime_score,
                },
            }));
        }

        for cell in view.crime_cells {
            features.push(json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [cell.lon, cell.lat] },
                "properties": {
                    "layer": "crime_heatmap",
                    "incidents": cell.incidents,
                    "score": cell.score,
                },
            }));
        }

        json!({ "type": "FeatureCollection", "features": features })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NetworkBuilder;

    #[test]
    fn renders_routes_markers_and_cells() {
        let mut builder = NetworkBuilder::new();
        builder.add_node(1, 38.90, -77.03);
        builder.add_node(2, 38.91, -77.02);
        builder.add_road(1, 2, 1400.0).unwrap();
        let network = builder.build();
        let path = vec![network.node_index(1).unwrap(), network.node_index(2).unwrap()];
        let cells = [HeatCell {
            cell: 1,
            lat: 38.905,
            lon: -77.025,
            incidents: 4,
            score: 9.0,
        }];

        let view = MapView {
            network: &network,
            origin: (Point::new(-77.03, 38.90), "A"),
            destination: (Point::new(-77.02, 38.91), "B"),
            routes: vec![RouteLayer {
                kind: RouteKind::Safest,
                path: &path,
                stats: PathStats {
                    distance_km: 1.4,
                    crime_score: 0.0,
                },
            }],
            crime_cells: &cells,
        };
        let map = GeoJsonRenderer.render(&view);

        let features = map["features"].as_array().unwrap();
        assert_eq!(features.len(), 4);
        assert_eq!(features[2]["properties"]["route"], "safest");
        assert_eq!(features[2]["geometry"]["coordinates"], json!([[-77.03, 38.90], [-77.02, 38.91]]));
        assert_eq!(features[3]["properties"]["incidents"], 4);
    }
}
