//! Request pipeline over a road network that is built once and then shared.

use std::sync::Arc;

use geo::Point;
use h3o::Resolution;
use tokio::sync::OnceCell;
use tracing::info;

use crate::Error;
use crate::crime::CrimeDataset;
use crate::graph::RouteNetwork;
use crate::heatmap::CrimeHeatmap;
use crate::planner::{RouteKind, RoutePlan, plan_routes};
use crate::provider::{CrimeSource, Geocoder, GraphProvider};
use crate::render::RouteLayer;
use crate::stats::{PathStats, path_stats};
use crate::weights::{WeightSummary, assign_crime_weights};

/// Where the shared state comes from.
pub struct DataSources {
    pub area: String,
    pub graph: Box<dyn GraphProvider>,
    pub crimes: Box<dyn CrimeSource>,
    pub heatmap_resolution: Resolution,
}

/// Weighted road network plus the crime data it was weighted with.
pub struct LoadedArea {
    pub network: RouteNetwork,
    pub crimes: CrimeDataset,
    pub heatmap: CrimeHeatmap,
    pub weights: WeightSummary,
}

impl LoadedArea {
    pub fn load(sources: &DataSources) -> Result<Self, Error> {
        let network = sources.graph.load(&sources.area)?;
        let crimes = sources.crimes.load()?;
        Ok(Self::from_parts(network, crimes, sources.heatmap_resolution))
    }

    pub fn from_parts(mut network: RouteNetwork, crimes: CrimeDataset, resolution: Resolution) -> Self {
        let weights = assign_crime_weights(&mut network, &crimes.records);
        let heatmap = CrimeHeatmap::from_records(&crimes.records, resolution);
        Self {
            network,
            crimes,
            heatmap,
            weights,
        }
    }
}

/// Routes and statistics for one request.
pub struct RouteOutcome {
    pub area: Arc<LoadedArea>,
    pub plan: RoutePlan,
    pub safest: PathStats,
    pub fastest: Option<PathStats>,
    pub most_unsafe: Option<PathStats>,
}

impl RouteOutcome {
    /// Route variants worth drawing: fastest is skipped when it repeats the
    /// safest path, most-unsafe when it repeats either.
    pub fn distinct_layers(&self) -> Vec<RouteLayer<'_>> {
        let safest = self.plan.safest.as_ref().ok();
        let fastest = self.plan.fastest.as_ref().ok();
        let unsafe_path = self.plan.most_unsafe.as_ref().ok();

        let mut layers = Vec::new();
        if let Some(path) = safest {
            layers.push(RouteLayer {
                kind: RouteKind::Safest,
                path,
                stats: self.safest,
            });
        }
        if let (Some(path), Some(stats)) = (fastest, self.fastest) {
            if Some(path) != safest {
                layers.push(RouteLayer {
                    kind: RouteKind::Fastest,
                    path,
                    stats,
                });
            }
        }
        if let (Some(path), Some(stats)) = (unsafe_path, self.most_unsafe) {
            if Some(path) != safest && Some(path) != fastest {
                layers.push(RouteLayer {
                    kind: RouteKind::MostUnsafe,
                    path,
                    stats,
                });
            }
        }
        layers
    }
}

/// Owns the shared road network. The first caller builds it; concurrent
/// callers wait for that build, and a failed build is retried by the next
/// request instead of being cached. The build runs in its own task, so a
/// caller that goes away mid-build neither cancels it nor lets a second one
/// start.
pub struct RouteService {
    sources: Option<Arc<DataSources>>,
    area: Arc<OnceCell<Arc<LoadedArea>>>,
}

impl RouteService {
    pub fn new(sources: DataSources) -> Self {
        Self {
            sources: Some(Arc::new(sources)),
            area: Arc::new(OnceCell::new()),
        }
    }

    /// Service over an already built area.
    pub fn ready(area: LoadedArea) -> Self {
        Self {
            sources: None,
            area: Arc::new(OnceCell::new_with(Some(Arc::new(area)))),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.area.initialized()
    }

    pub async fn area(&self) -> Result<Arc<LoadedArea>, Error> {
        if let Some(area) = self.area.get() {
            return Ok(area.clone());
        }
        let cell = self.area.clone();
        let sources = self.sources.clone();
        tokio::spawn(async move { cell.get_or_try_init(|| build_area(sources)).await.cloned() })
            .await
            .map_err(|e| Error::Initialization(e.to_string()))?
    }

    /// Plans all three variants between two points. Fails with
    /// [`Error::NoRoute`] only when the safest path is missing.
    pub async fn plan(&self, origin: Point<f64>, destination: Point<f64>) -> Result<RouteOutcome, Error> {
        let area = self.area().await?;
        let plan = plan_routes(&area.network, origin, destination)?;
        let safest = path_stats(&area.network, plan.require_safest()?)
            .ok_or_else(|| Error::Initialization("planner returned an empty path".to_string()))?;
        let fastest = plan
            .fastest
            .as_ref()
            .ok()
            .and_then(|p| path_stats(&area.network, p));
        let most_unsafe = plan
            .most_unsafe
            .as_ref()
            .ok()
            .and_then(|p| path_stats(&area.network, p));

        Ok(RouteOutcome {
            area,
            plan,
            safest,
            fastest,
            most_unsafe,
        })
    }

    /// Geocodes both names, then plans between them.
    pub async fn plan_by_name(
        &self,
        geocoder: &dyn Geocoder,
        source: &str,
        destination: &str,
    ) -> Result<(Point<f64>, Point<f64>, RouteOutcome), Error> {
        let from = geocoder
            .resolve(source)
            .ok_or_else(|| Error::GeocodeFailure(source.to_string()))?;
        let to = geocoder
            .resolve(destination)
            .ok_or_else(|| Error::GeocodeFailure(destination.to_string()))?;
        info!("Geocoded {source} -> ({:.4}, {:.4})", from.y(), from.x());
        info!("Geocoded {destination} -> ({:.4}, {:.4})", to.y(), to.x());
        let outcome = self.plan(from, to).await?;
        Ok((from, to, outcome))
    }
}

async fn build_area(sources: Option<Arc<DataSources>>) -> Result<Arc<LoadedArea>, Error> {
    let sources = sources.ok_or_else(|| Error::Initialization("no data sources configured".to_string()))?;
    info!("Building road network for {}", sources.area);
    let area = tokio::task::spawn_blocking(move || LoadedArea::load(&sources))
        .await
        .map_err(|e| Error::Initialization(e.to_string()))??;
    info!(
        "Road network ready: {} nodes, {} edges, {} crime records",
        area.network.node_count(),
        area.network.edge_count(),
        area.crimes.records.len()
    );
    Ok(Arc::new(area))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crime::ColumnHints;
    use crate::graph::NetworkBuilder;
    use crate::provider::Gazetteer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingGraph {
        loads: Arc<AtomicUsize>,
        fail_first: bool,
        delay: Duration,
    }

    impl GraphProvider for CountingGraph {
        fn load(&self, _area: &str) -> Result<RouteNetwork, Error> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail_first && attempt == 0 {
                return Err(Error::GraphLoad("service unreachable".to_string()));
            }
            let mut builder = NetworkBuilder::new();
            builder.add_node(1, 38.9000, -77.0300);
            builder.add_node(2, 38.9000, -77.0290);
            builder.add_road(1, 2, 90.0)?;
            Ok(builder.build())
        }
    }

    struct InlineCrimes;

    impl CrimeSource for InlineCrimes {
        fn load(&self) -> Result<CrimeDataset, Error> {
            let csv = "lat,lon,score\n38.9001,-77.0295,2\n";
            CrimeDataset::from_reader(csv.as_bytes(), &ColumnHints::default())
        }
    }

    fn service(loads: Arc<AtomicUsize>, fail_first: bool) -> RouteService {
        slow_service(loads, fail_first, Duration::ZERO)
    }

    fn slow_service(loads: Arc<AtomicUsize>, fail_first: bool, delay: Duration) -> RouteService {
        RouteService::new(DataSources {
            area: "test".to_string(),
            graph: Box::new(CountingGraph {
                loads,
                fail_first,
                delay,
            }),
            crimes: Box::new(InlineCrimes),
            heatmap_resolution: Resolution::Nine,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_build_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let service = Arc::new(service(loads.clone(), false));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.area().await.map(|a| a.network.node_count()) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 2);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_first_request_does_not_start_a_second_build() {
        let loads = Arc::new(AtomicUsize::new(0));
        let service = Arc::new(slow_service(loads.clone(), false, Duration::from_millis(300)));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.area().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.abort();

        let area = service.area().await.unwrap();
        assert_eq!(area.network.node_count(), 2);
        assert!(service.is_ready());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_is_not_cached() {
        let loads = Arc::new(AtomicUsize::new(0));
        let service = service(loads.clone(), true);

        assert!(matches!(service.area().await, Err(Error::GraphLoad(_))));
        assert!(!service.is_ready());
        assert!(service.area().await.is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn plans_between_named_places() {
        let service = service(Arc::new(AtomicUsize::new(0)), false);
        let mut gazetteer = Gazetteer::default();
        gazetteer.insert("West", 38.9000, -77.0300);
        gazetteer.insert("East", 38.9000, -77.0290);

        let (_, _, outcome) = service.plan_by_name(&gazetteer, "west", "EAST").await.unwrap();
        assert_eq!(outcome.safest.distance_km, 0.09);
        assert_eq!(outcome.safest.crime_score, 1.0);
        // All three variants share the single edge.
        assert_eq!(outcome.distinct_layers().len(), 1);

        let err = service.plan_by_name(&gazetteer, "west", "Nowhere").await.err().unwrap();
        assert!(matches!(err, Error::GeocodeFailure(name) if name == "Nowhere"));
    }
}
