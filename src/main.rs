use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use saferoute::api::{AppState, router};
use saferoute::config::Config;
use saferoute::provider::{CsvCrimeSource, Gazetteer, Geocoder, PbfGraphProvider};
use saferoute::service::{DataSources, RouteService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("saferoute=info".parse()?))
        .init();

    let config = Config::parse();

    let geocoder: Option<Box<dyn Geocoder>> = match &config.gazetteer {
        Some(path) => Some(Box::new(Gazetteer::from_path(path)?)),
        None => {
            warn!("No gazetteer configured; /getSafeRoute cannot resolve place names");
            None
        }
    };

    let service = RouteService::new(DataSources {
        area: config.area.clone(),
        graph: Box::new(PbfGraphProvider::new(&config.osm_pbf)),
        crimes: Box::new(CsvCrimeSource {
            path: config.crime_csv.clone(),
            hints: config.column_hints(),
        }),
        heatmap_resolution: config.resolution(),
    });

    if config.lazy {
        info!("Road network and crime data will load on the first request");
    } else {
        service.area().await?;
    }

    let app = router(Arc::new(AppState { service, geocoder }));

    info!("API server running on http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
