//! Safest, fastest and most-unsafe route searches over a weighted network.

use std::fmt;

use geo::Point;
use petgraph::algo::astar;
use petgraph::graph::NodeIndex;
use thiserror::Error;
use tracing::{info, warn};

use crate::Error;
use crate::graph::{DISTANCE_SHARE, NodeId, Path, RoadEdge, RouteNetwork};

/// Floor added to the crime weight before inversion in the most-unsafe search.
pub const UNSAFE_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Safest,
    Fastest,
    MostUnsafe,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteKind::Safest => "safest",
            RouteKind::Fastest => "fastest",
            RouteKind::MostUnsafe => "most unsafe",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no {kind} path from node {from} to node {to}")]
pub struct NoPathFound {
    pub kind: RouteKind,
    pub from: NodeId,
    pub to: NodeId,
}

/// The three searches for one origin/destination pair.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub origin: NodeIndex,
    pub destination: NodeIndex,
    pub safest: Result<Path, NoPathFound>,
    pub fastest: Result<Path, NoPathFound>,
    pub most_unsafe: Result<Path, NoPathFound>,
    /// Set when `most_unsafe` holds the fastest path because its own search failed.
    pub unsafe_is_fallback: bool,
}

impl RoutePlan {
    /// The safest path, or the request-level "no route" error.
    pub fn require_safest(&self) -> Result<&Path, Error> {
        self.safest.as_ref().map_err(|e| Error::NoRoute(e.clone()))
    }
}

/// Snaps both endpoints (`Point` x = longitude, y = latitude) to their
/// nearest nodes and runs all three searches.
pub fn plan_routes(network: &RouteNetwork, origin: Point<f64>, destination: Point<f64>) -> Result<RoutePlan, Error> {
    let from = network
        .find_nearest_node(origin.y(), origin.x())
        .ok_or(Error::NoNearbyNode)?;
    let to = network
        .find_nearest_node(destination.y(), destination.x())
        .ok_or(Error::NoNearbyNode)?;
    info!(
        "Nearest graph nodes found: {} -> {}",
        network.node(from).id,
        network.node(to).id
    );

    let safest = log_search(network, safest_path(network, from, to));
    let fastest = log_search(network, fastest_path(network, from, to));
    let (most_unsafe, unsafe_is_fallback) = match most_unsafe_path(network, from, to) {
        Ok(path) => (Ok(path), false),
        Err(err) => {
            warn!("{err}; using fastest path as unsafe path");
            let fallback = fastest.clone().map_err(|_| err);
            (fallback, true)
        }
    };

    Ok(RoutePlan {
        origin: from,
        destination: to,
        safest,
        fastest,
        most_unsafe,
        unsafe_is_fallback,
    })
}

fn log_search(network: &RouteNetwork, result: Result<Path, NoPathFound>) -> Result<Path, NoPathFound> {
    match &result {
        Ok(path) => {
            let ends = network.node_ids(&[path[0], path[path.len() - 1]]);
            info!("Path found: {} nodes ({} to {})", path.len(), ends[0], ends[1]);
        }
        Err(err) => warn!("{err}"),
    }
    result
}

/// A* over `combined` weight. Distance contributes `DISTANCE_SHARE * length /
/// max_length` to every edge, so the great-circle distance rescaled the same
/// way, and shrunk by the network's detour ratio, stays a lower bound.
pub fn safest_path(network: &RouteNetwork, from: NodeIndex, to: NodeIndex) -> Result<Path, NoPathFound> {
    let scale = DISTANCE_SHARE * network.detour_ratio() / network.max_length();
    search(
        network,
        RouteKind::Safest,
        from,
        to,
        |edge| edge.weights.combined,
        |n| scale * network.haversine_meters(n, to),
    )
}

/// A* over edge length in meters with the great-circle heuristic.
pub fn fastest_path(network: &RouteNetwork, from: NodeIndex, to: NodeIndex) -> Result<Path, NoPathFound> {
    let scale = network.detour_ratio();
    search(
        network,
        RouteKind::Fastest,
        from,
        to,
        |edge| edge.length_meters,
        |n| scale * network.haversine_meters(n, to),
    )
}

/// Uniform-cost search over `1 / (crime + UNSAFE_FLOOR)`, preferring the
/// edges with the most crime.
pub fn most_unsafe_path(network: &RouteNetwork, from: NodeIndex, to: NodeIndex) -> Result<Path, NoPathFound> {
    search(
        network,
        RouteKind::MostUnsafe,
        from,
        to,
        |edge| 1.0 / (edge.weights.crime + UNSAFE_FLOOR),
        |_| 0.0,
    )
}

fn search<C, H>(
    network: &RouteNetwork,
    kind: RouteKind,
    from: NodeIndex,
    to: NodeIndex,
    cost: C,
    estimate: H,
) -> Result<Path, NoPathFound>
where
    C: Fn(&RoadEdge) -> f64,
    H: Fn(NodeIndex) -> f64,
{
    let found = astar(
        &network.graph,
        from,
        |n| n == to,
        |e| cost(e.weight()),
        estimate,
    );
    match found {
        Some((total, path)) if total.is_finite() => Ok(path),
        _ => Err(NoPathFound {
            kind,
            from: network.node(from).id,
            to: network.node(to).id,
        }),
    }
}
