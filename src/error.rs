use thiserror::Error;

use crate::planner::NoPathFound;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Crime data unavailable: {0}")]
    DataSourceUnavailable(String),
    #[error("No crime score column found among headers [{0}]")]
    MissingScoreColumn(String),
    #[error("No {0} column found in crime data")]
    MissingCoordinateColumn(&'static str),
    #[error("Road network could not be loaded: {0}")]
    GraphLoad(String),
    #[error("Could not geocode location: {0}")]
    GeocodeFailure(String),
    #[error("Road network has no nodes to snap to")]
    NoNearbyNode,
    #[error("No route found: {0}")]
    NoRoute(#[from] NoPathFound),
    #[error("Network initialization failed: {0}")]
    Initialization(String),
}

impl Error {
    /// Stable identifier for the failure class, used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DataSourceUnavailable(_) => "data_source_unavailable",
            Error::MissingScoreColumn(_) => "missing_score_column",
            Error::MissingCoordinateColumn(_) => "missing_coordinate_column",
            Error::GraphLoad(_) => "graph_load",
            Error::GeocodeFailure(_) => "geocode_failure",
            Error::NoNearbyNode => "no_nearby_node",
            Error::NoRoute(_) => "no_route",
            Error::Initialization(_) => "initialization",
        }
    }

    /// Whether the failure happened while building shared state rather than
    /// while serving one request.
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            Error::DataSourceUnavailable(_)
                | Error::MissingScoreColumn(_)
                | Error::MissingCoordinateColumn(_)
                | Error::GraphLoad(_)
                | Error::Initialization(_)
        )
    }
}
