//! Snaps crime records onto road edges and normalizes edge costs.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::crime::CrimeRecord;
use crate::graph::{EdgeId, EdgeWeights, RouteNetwork};

/// Outcome of one weighting run, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSummary {
    pub snapped_records: usize,
    pub unsnapped_records: usize,
    pub crime_edges: usize,
    pub max_crime: f64,
    pub max_length: f64,
}

/// Assigns `crime`, `distance` and `combined` weights to every edge.
///
/// Each record's score is added to its single nearest directed edge. Totals
/// are rebuilt from scratch on every call, so running it again with the same
/// records reproduces the same weights.
pub fn assign_crime_weights(network: &mut RouteNetwork, records: &[CrimeRecord]) -> WeightSummary {
    let mut totals: HashMap<EdgeId, f64> = HashMap::new();
    let mut unsnapped_records = 0;

    for record in records {
        let Some(edge) = network.find_nearest_edge(record.lat, record.lon) else {
            unsnapped_records += 1;
            continue;
        };
        let Some(id) = network.edge_id(edge) else {
            unsnapped_records += 1;
            continue;
        };
        *totals.entry(id).or_default() += record.score;
    }

    let max_crime = totals
        .values()
        .copied()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
        .unwrap_or(1.0);
    let max_length = network.max_length();
    debug!("Normalizing by max_crime={max_crime}, max_length={max_length}");

    let edges: Vec<_> = network.graph.edge_indices().collect();
    for edge in edges {
        let Some(id) = network.edge_id(edge) else {
            continue;
        };
        let total = totals.get(&id).copied().unwrap_or(0.0);
        let crime = if max_crime > 0.0 { total / max_crime } else { 0.0 };
        let road = &mut network.graph[edge];
        road.weights = EdgeWeights::new(crime, road.length_meters / max_length);
    }
    network.set_max_crime(max_crime);

    let summary = WeightSummary {
        snapped_records: records.len() - unsnapped_records,
        unsnapped_records,
        crime_edges: totals.len(),
        max_crime,
        max_length,
    };
    info!(
        "Crime weights assigned: {} records on {} edges",
        summary.snapped_records, summary.crime_edges
    );
    summary
}
