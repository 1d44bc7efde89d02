//! Collaborators that feed the routing core: road networks, crime data and
//! place-name lookup.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use geo::Point;
use geo::prelude::*;
use osmpbf::{Element, ElementReader};
use tracing::{info, warn};

use crate::Error;
use crate::crime::{ColumnHints, CrimeDataset};
use crate::graph::{NetworkBuilder, RouteNetwork};

pub trait GraphProvider: Send + Sync {
    /// Loads the routable road network for a named area.
    fn load(&self, area: &str) -> Result<RouteNetwork, Error>;
}

pub trait CrimeSource: Send + Sync {
    fn load(&self) -> Result<CrimeDataset, Error>;
}

pub trait Geocoder: Send + Sync {
    /// Resolves a place name to a point (x = longitude, y = latitude).
    fn resolve(&self, name: &str) -> Option<Point<f64>>;
}

/// Drivable road network read from an OpenStreetMap PBF extract.
pub struct PbfGraphProvider {
    pub path: PathBuf,
}

impl PbfGraphProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GraphProvider for PbfGraphProvider {
    fn load(&self, area: &str) -> Result<RouteNetwork, Error> {
        info!("Loading road network for {area} from {}", self.path.display());
        let graph_error = |e: osmpbf::Error| Error::GraphLoad(format!("{}: {e}", self.path.display()));

        let mut coords = HashMap::new();

        // PASS 1: Nodes
        let reader = ElementReader::from_path(&self.path).map_err(graph_error)?;
        reader
            .for_each(|element| match element {
                Element::Node(node) => {
                    coords.insert(node.id(), (node.lat(), node.lon()));
                }
                Element::DenseNode(node) => {
                    coords.insert(node.id(), (node.lat(), node.lon()));
                }
                _ => {}
            })
            .map_err(graph_error)?;
        info!("Loaded {} nodes. Building edges...", coords.len());

        // PASS 2: Ways
        let mut builder = NetworkBuilder::new();
        let mut failure = None;
        let reader = ElementReader::from_path(&self.path).map_err(graph_error)?;
        reader
            .for_each(|element| {
                let Element::Way(way) = element else {
                    return;
                };
                let tags: HashMap<&str, &str> = way.tags().collect();
                let Some(direction) = drivable_direction(&tags) else {
                    return;
                };

                let refs: Vec<i64> = way.refs().collect();
                for window in refs.windows(2) {
                    let (id_a, id_b) = (window[0], window[1]);
                    let (Some(&(lat_a, lon_a)), Some(&(lat_b, lon_b))) = (coords.get(&id_a), coords.get(&id_b)) else {
                        continue;
                    };
                    builder.add_node(id_a, lat_a, lon_a);
                    builder.add_node(id_b, lat_b, lon_b);
                    let length = Point::new(lon_a, lat_a).haversine_distance(&Point::new(lon_b, lat_b));

                    let added = match direction {
                        Direction::Both => builder.add_road(id_a, id_b, length),
                        Direction::Forward => builder.add_edge(id_a, id_b, length).map(|_| ()),
                        Direction::Backward => builder.add_edge(id_b, id_a, length).map(|_| ()),
                    };
                    if let Err(e) = added {
                        failure.get_or_insert(e);
                    }
                }
            })
            .map_err(graph_error)?;
        if let Some(e) = failure {
            return Err(e);
        }

        let network = builder.build();
        info!(
            "Graph built: {} nodes, {} edges",
            network.node_count(),
            network.edge_count()
        );
        if network.node_count() == 0 {
            return Err(Error::GraphLoad(format!("no drivable roads found for {area}")));
        }
        Ok(network)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Both,
    Forward,
    Backward,
}

/// Which directions a way may be driven in, `None` if it is not a road for cars.
fn drivable_direction(tags: &HashMap<&str, &str>) -> Option<Direction> {
    let highway = tags.get("highway").copied().unwrap_or("");
    let is_drivable = matches!(
        highway,
        "motorway" | "trunk" | "primary" | "secondary" | "tertiary" | "unclassified" | "residential"
            | "living_street" | "service" | "road" | "motorway_link" | "trunk_link" | "primary_link"
            | "secondary_link" | "tertiary_link"
    );
    let access_denied = matches!(tags.get("access").copied(), Some("no" | "private"))
        || matches!(tags.get("motor_vehicle").copied(), Some("no"));
    if !is_drivable || access_denied {
        return None;
    }

    let implied_oneway = matches!(highway, "motorway" | "motorway_link")
        || tags.get("junction").copied() == Some("roundabout");
    match tags.get("oneway").copied() {
        Some("yes" | "true" | "1") => Some(Direction::Forward),
        Some("-1" | "reverse") => Some(Direction::Backward),
        Some("no" | "false" | "0") => Some(Direction::Both),
        _ if implied_oneway => Some(Direction::Forward),
        _ => Some(Direction::Both),
    }
}

/// Crime records read from a CSV file.
pub struct CsvCrimeSource {
    pub path: PathBuf,
    pub hints: ColumnHints,
}

impl CrimeSource for CsvCrimeSource {
    fn load(&self) -> Result<CrimeDataset, Error> {
        CrimeDataset::from_path(&self.path, &self.hints)
    }
}

/// Place-name lookup table loaded from `name,lat,lon` rows.
#[derive(Debug, Default, Clone)]
pub struct Gazetteer {
    places: HashMap<String, Point<f64>>,
}

impl Gazetteer {
    pub fn from_path(path: &std::path::Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| {
            Error::DataSourceUnavailable(format!("{}: {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Error> {
        let mut gazetteer = Self::default();
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        for row in reader.records() {
            let row = row.map_err(|e| Error::DataSourceUnavailable(e.to_string()))?;
            let parsed = (
                row.get(0),
                row.get(1).and_then(|v| v.trim().parse::<f64>().ok()),
                row.get(2).and_then(|v| v.trim().parse::<f64>().ok()),
            );
            match parsed {
                (Some(name), Some(lat), Some(lon)) => gazetteer.insert(name, lat, lon),
                _ => warn!("Skipping gazetteer row {:?}", row),
            }
        }
        info!("Gazetteer loaded: {} places", gazetteer.places.len());
        Ok(gazetteer)
    }

    pub fn insert(&mut self, name: &str, lat: f64, lon: f64) {
        self.places.insert(normalize(name), Point::new(lon, lat));
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Geocoder for Gazetteer {
    fn resolve(&self, name: &str) -> Option<Point<f64>> {
        self.places.get(&normalize(name)).copied()
    }
}
