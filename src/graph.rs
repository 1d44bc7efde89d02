use std::collections::HashMap;

use geo::Point;
use geo::prelude::*;
use petgraph::graph::{EdgeIndex, Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use rstar::RTree;
use rstar::primitives::{GeomWithData, Line};

use crate::Error;

/// Identifier assigned to a node by the graph source (an OSM id for PBF input).
pub type NodeId = i64;

/// Ordered node sequence; empty means no route.
pub type Path = Vec<NodeIndex>;

/// Share of the normalized crime component in the combined edge cost.
pub const CRIME_SHARE: f64 = 0.6;
/// Share of the normalized distance component in the combined edge cost.
pub const DISTANCE_SHARE: f64 = 0.4;

#[derive(Debug, Clone, Copy)]
pub struct GeoNode {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
}

impl GeoNode {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// Normalized per-edge costs. Only [`EdgeWeights::new`] derives the combined
/// value, so the blend coefficients live in one place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EdgeWeights {
    pub crime: f64,
    pub distance: f64,
    pub combined: f64,
}

impl EdgeWeights {
    pub fn new(crime: f64, distance: f64) -> Self {
        Self {
            crime,
            distance,
            combined: CRIME_SHARE * crime + DISTANCE_SHARE * distance,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RoadEdge {
    /// Disambiguates parallel edges between the same ordered node pair.
    pub key: u32,
    pub length_meters: f64,
    pub weights: EdgeWeights,
}

/// `(from, to, key)` identity of a directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId {
    pub from: NodeId,
    pub to: NodeId,
    pub key: u32,
}

type NodeEntry = GeomWithData<[f64; 2], NodeIndex>;
type EdgeEntry = GeomWithData<Line<[f64; 2]>, EdgeIndex>;

/// Collects nodes and edges from a graph source before indexing.
#[derive(Default)]
pub struct NetworkBuilder {
    graph: Graph<GeoNode, RoadEdge>,
    ids: HashMap<NodeId, NodeIndex>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, or returns the existing index if the id is already known.
    pub fn add_node(&mut self, id: NodeId, lat: f64, lon: f64) -> NodeIndex {
        let graph = &mut self.graph;
        *self
            .ids
            .entry(id)
            .or_insert_with(|| graph.add_node(GeoNode { id, lat, lon }))
    }

    /// Adds a directed edge; parallel edges get increasing keys starting at 0.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, length_meters: f64) -> Result<EdgeId, Error> {
        let a = *self
            .ids
            .get(&from)
            .ok_or_else(|| Error::GraphLoad(format!("edge references unknown node {from}")))?;
        let b = *self
            .ids
            .get(&to)
            .ok_or_else(|| Error::GraphLoad(format!("edge references unknown node {to}")))?;
        if !length_meters.is_finite() || length_meters < 0.0 {
            return Err(Error::GraphLoad(format!(
                "edge {from}->{to} has invalid length {length_meters}"
            )));
        }
        let key = self.graph.edges_connecting(a, b).count() as u32;
        self.graph.add_edge(
            a,
            b,
            RoadEdge {
                key,
                length_meters,
                weights: EdgeWeights::default(),
            },
        );
        Ok(EdgeId { from, to, key })
    }

    /// Adds the edge in both directions, as for an undirected road segment.
    pub fn add_road(&mut self, a: NodeId, b: NodeId, length_meters: f64) -> Result<(), Error> {
        self.add_edge(a, b, length_meters)?;
        self.add_edge(b, a, length_meters)?;
        Ok(())
    }

    pub fn build(self) -> RouteNetwork {
        let graph = self.graph;
        let node_index = RTree::bulk_load(
            graph
                .node_indices()
                .map(|n| GeomWithData::new([graph[n].lon, graph[n].lat], n))
                .collect(),
        );
        let edge_index = RTree::bulk_load(
            graph
                .edge_references()
                .map(|e| {
                    let a = graph[e.source()];
                    let b = graph[e.target()];
                    GeomWithData::new(Line::new([a.lon, a.lat], [b.lon, b.lat]), e.id())
                })
                .collect(),
        );
        let max_length = graph
            .edge_weights()
            .map(|e| e.length_meters)
            .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |m| m.max(l))))
            .filter(|m| *m > 0.0)
            .unwrap_or(1.0);
        let detour_ratio = graph
            .edge_references()
            .filter_map(|e| {
                let straight = graph[e.source()].point().haversine_distance(&graph[e.target()].point());
                (straight > 0.0).then(|| e.weight().length_meters / straight)
            })
            .fold(1.0, f64::min);

        RouteNetwork {
            graph,
            ids: self.ids,
            node_index,
            edge_index,
            max_length,
            detour_ratio,
            max_crime: 1.0,
        }
    }
}

/// Road graph with per-edge cost annotations and spatial indices for
/// snapping coordinates to nodes and edges. Read-only once weights are set.
pub struct RouteNetwork {
    pub graph: Graph<GeoNode, RoadEdge>,
    ids: HashMap<NodeId, NodeIndex>,
    node_index: RTree<NodeEntry>,
    edge_index: RTree<EdgeEntry>,
    max_length: f64,
    detour_ratio: f64,
    max_crime: f64,
}

impl RouteNetwork {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, idx: NodeIndex) -> &GeoNode {
        &self.graph[idx]
    }

    pub fn node_index(&self, id: NodeId) -> Option<NodeIndex> {
        self.ids.get(&id).copied()
    }

    pub fn node_ids(&self, path: &[NodeIndex]) -> Vec<NodeId> {
        path.iter().map(|&n| self.graph[n].id).collect()
    }

    /// Longest edge in meters (1 for a graph without edges).
    pub fn max_length(&self) -> f64 {
        self.max_length
    }

    /// Smallest ratio of edge length to the great-circle distance between its
    /// endpoints, capped at 1. Scaling straight-line estimates by it keeps
    /// them below the length of any path.
    pub fn detour_ratio(&self) -> f64 {
        self.detour_ratio
    }

    /// Largest accumulated crime score of any edge at the last weighting run.
    pub fn max_crime(&self) -> f64 {
        self.max_crime
    }

    pub(crate) fn set_max_crime(&mut self, max_crime: f64) {
        self.max_crime = max_crime;
    }

    pub fn edge_id(&self, edge: EdgeIndex) -> Option<EdgeId> {
        let (a, b) = self.graph.edge_endpoints(edge)?;
        Some(EdgeId {
            from: self.graph[a].id,
            to: self.graph[b].id,
            key: self.graph[edge].key,
        })
    }

    pub fn find_edge(&self, id: EdgeId) -> Option<EdgeIndex> {
        let a = self.node_index(id.from)?;
        let b = self.node_index(id.to)?;
        self.graph
            .edges_connecting(a, b)
            .find(|e| e.weight().key == id.key)
            .map(|e| e.id())
    }

    pub fn edge(&self, id: EdgeId) -> Option<&RoadEdge> {
        self.find_edge(id).map(|e| &self.graph[e])
    }

    /// Edge used for statistics between consecutive path nodes: the lowest
    /// key among parallel edges.
    pub fn canonical_edge(&self, from: NodeIndex, to: NodeIndex) -> Option<&RoadEdge> {
        self.graph
            .edges_connecting(from, to)
            .map(|e| e.weight())
            .min_by_key(|e| e.key)
    }

    pub fn find_nearest_node(&self, lat: f64, lon: f64) -> Option<NodeIndex> {
        self.node_index.nearest_neighbor(&[lon, lat]).map(|entry| entry.data)
    }

    /// Nearest edge by distance from the point to the edge's segment.
    /// Equidistant candidates resolve to the lowest edge index.
    pub fn find_nearest_edge(&self, lat: f64, lon: f64) -> Option<EdgeIndex> {
        let mut candidates = self.edge_index.nearest_neighbor_iter_with_distance_2(&[lon, lat]);
        let (first, best) = candidates.next()?;
        let mut chosen = first.data;
        for (entry, distance_2) in candidates {
            if distance_2 > best {
                break;
            }
            chosen = chosen.min(entry.data);
        }
        Some(chosen)
    }

    /// Great-circle distance between two nodes in meters.
    pub fn haversine_meters(&self, a: NodeIndex, b: NodeIndex) -> f64 {
        self.graph[a].point().haversine_distance(&self.graph[b].point())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> RouteNetwork {
        let mut builder = NetworkBuilder::new();
        builder.add_node(1, 38.900, -77.030);
        builder.add_node(2, 38.900, -77.020);
        builder.add_node(3, 38.910, -77.025);
        builder.add_road(1, 2, 870.0).unwrap();
        builder.add_road(2, 3, 1200.0).unwrap();
        builder.add_edge(1, 3, 1250.0).unwrap();
        builder.build()
    }

    #[test]
    fn parallel_edges_get_increasing_keys() {
        let mut builder = NetworkBuilder::new();
        builder.add_node(1, 1.0, 1.0);
        builder.add_node(2, 1.0, 1.1);
        assert_eq!(builder.add_edge(1, 2, 10.0).unwrap().key, 0);
        assert_eq!(builder.add_edge(1, 2, 12.0).unwrap().key, 1);
        assert_eq!(builder.add_edge(2, 1, 10.0).unwrap().key, 0);

        let network = builder.build();
        let a = network.node_index(1).unwrap();
        let b = network.node_index(2).unwrap();
        let canonical = network.canonical_edge(a, b).unwrap();
        assert_eq!(canonical.key, 0);
        assert_eq!(canonical.length_meters, 10.0);
    }

    #[test]
    fn edge_to_unknown_node_is_rejected() {
        let mut builder = NetworkBuilder::new();
        builder.add_node(1, 1.0, 1.0);
        assert!(matches!(builder.add_edge(1, 99, 5.0), Err(Error::GraphLoad(_))));
    }

    #[test]
    fn duplicate_node_ids_are_merged() {
        let mut builder = NetworkBuilder::new();
        let a = builder.add_node(7, 1.0, 1.0);
        let b = builder.add_node(7, 2.0, 2.0);
        assert_eq!(a, b);
        assert_eq!(builder.build().node_count(), 1);
    }

    #[test]
    fn max_length_defaults_to_one_without_edges() {
        let network = NetworkBuilder::new().build();
        assert_eq!(network.max_length(), 1.0);
        assert!(network.find_nearest_node(38.9, -77.0).is_none());
        assert!(network.find_nearest_edge(38.9, -77.0).is_none());
    }

    #[test]
    fn snaps_to_nearest_node_and_edge() {
        let network = triangle();
        assert_eq!(network.max_length(), 1250.0);
        assert_eq!(network.detour_ratio(), 1.0);

        let node = network.find_nearest_node(38.9101, -77.0251).unwrap();
        assert_eq!(network.node(node).id, 3);

        // Just north of the 1-2 segment, far from both of its endpoints.
        let edge = network.find_nearest_edge(38.9001, -77.025).unwrap();
        let id = network.edge_id(edge).unwrap();
        assert_eq!((id.from.min(id.to), id.from.max(id.to)), (1, 2));
    }

    #[test]
    fn edges_shorter_than_their_chord_lower_the_detour_ratio() {
        let mut builder = NetworkBuilder::new();
        builder.add_node(1, 38.900, -77.030);
        builder.add_node(2, 38.900, -77.020);
        builder.add_node(3, 38.900, -77.020);
        builder.add_edge(1, 2, 433.0).unwrap();
        // Coincident endpoints carry no straight-line distance to compare with.
        builder.add_edge(2, 3, 0.0).unwrap();
        let network = builder.build();

        let chord = network.haversine_meters(network.node_index(1).unwrap(), network.node_index(2).unwrap());
        assert!((network.detour_ratio() - 433.0 / chord).abs() < 1e-12);
        assert!(network.detour_ratio() < 0.51);
    }

    #[test]
    fn edge_lookup_round_trips_through_ids() {
        let network = triangle();
        for edge in network.graph.edge_indices() {
            let id = network.edge_id(edge).unwrap();
            assert_eq!(network.find_edge(id), Some(edge));
        }
        assert!(network.edge(EdgeId { from: 3, to: 1, key: 0 }).is_none());
    }
}
