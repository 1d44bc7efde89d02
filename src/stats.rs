use itertools::Itertools;
use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::warn;

use crate::graph::RouteNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathStats {
    pub distance_km: f64,
    /// Sum of normalized crime weights, not the blended cost.
    pub crime_score: f64,
}

/// Total distance and crime exposure along a path; `None` for an empty path.
///
/// Between consecutive nodes joined by parallel edges, the lowest-keyed edge
/// is counted.
pub fn path_stats(network: &RouteNetwork, path: &[NodeIndex]) -> Option<PathStats> {
    if path.is_empty() {
        return None;
    }

    let mut meters = 0.0;
    let mut crime_score = 0.0;
    for (u, v) in path.iter().copied().tuple_windows() {
        match network.canonical_edge(u, v) {
            Some(edge) => {
                meters += edge.length_meters;
                crime_score += edge.weights.crime;
            }
            None => warn!(
                "No edge between consecutive path nodes {} and {}",
                network.node(u).id,
                network.node(v).id
            ),
        }
    }

    Some(PathStats {
        distance_km: meters / 1000.0,
        crime_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crime::CrimeRecord;
    use crate::graph::NetworkBuilder;
    use crate::weights::assign_crime_weights;

    fn network_with_parallel_edges() -> RouteNetwork {
        let mut builder = NetworkBuilder::new();
        builder.add_node(1, 38.9000, -77.0300);
        builder.add_node(2, 38.9000, -77.0290);
        builder.add_node(3, 38.9000, -77.0270);
        builder.add_edge(1, 2, 100.0).unwrap();
        builder.add_edge(1, 2, 400.0).unwrap();
        builder.add_edge(2, 3, 200.0).unwrap();
        let mut network = builder.build();
        assign_crime_weights(
            &mut network,
            &[CrimeRecord {
                lat: 38.9001,
                lon: -77.0280,
                score: 2.0,
            }],
        );
        network
    }

    fn path(network: &RouteNetwork, ids: &[i64]) -> Vec<NodeIndex> {
        ids.iter().map(|&id| network.node_index(id).unwrap()).collect()
    }

    #[test]
    fn empty_path_has_no_stats() {
        let network = network_with_parallel_edges();
        assert_eq!(path_stats(&network, &[]), None);
    }

    #[test]
    fn single_node_path_is_zero() {
        let network = network_with_parallel_edges();
        let stats = path_stats(&network, &path(&network, &[2])).unwrap();
        assert_eq!(stats, PathStats { distance_km: 0.0, crime_score: 0.0 });
    }

    #[test]
    fn sums_lowest_keyed_edges() {
        let network = network_with_parallel_edges();
        let stats = path_stats(&network, &path(&network, &[1, 2, 3])).unwrap();
        assert!((stats.distance_km - 0.3).abs() < 1e-12);
        assert_eq!(stats.crime_score, 1.0);

        let again = path_stats(&network, &path(&network, &[1, 2, 3])).unwrap();
        assert_eq!(stats, again);
    }
}
