//! HTTP surface of the routing service.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use geo::Point;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::Error;
use crate::graph::NodeId;
use crate::heatmap::HeatCell;
use crate::planner::RouteKind;
use crate::provider::Geocoder;
use crate::render::{GeoJsonRenderer, MapRenderer, MapView, RouteLayer, line_coordinates};
use crate::service::{RouteOutcome, RouteService};

pub struct AppState {
    pub service: RouteService,
    pub geocoder: Option<Box<dyn Geocoder>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/route", post(route_by_coordinates))
        .route("/getSafeRoute", post(route_by_name))
        .route("/heatmap", get(heatmap))
        .layer(cors)
        .with_state(state)
}

// --- API DTOs ---

#[derive(Deserialize)]
pub struct CoordinateRequest {
    pub origin: [f64; 2],      // [lat, lon]
    pub destination: [f64; 2], // [lat, lon]
}

#[derive(Deserialize)]
pub struct NamedRequest {
    pub source: Option<String>,
    pub destination: Option<String>,
}

#[derive(Serialize)]
pub struct GeoJsonLineString {
    r#type: &'static str,
    coordinates: Vec<[f64; 2]>,
}

#[derive(Serialize)]
pub struct RouteSummary {
    pub nodes: Vec<NodeId>,
    pub distance_km: f64,
    pub crime_score: f64,
    pub geometry: GeoJsonLineString,
}

#[derive(Serialize)]
pub struct RouteResponse {
    pub status: &'static str,
    pub origin_node: NodeId,
    pub destination_node: NodeId,
    pub safe_path_distance_km: f64,
    pub crime_score: f64,
    pub safest: Option<RouteSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fastest: Option<RouteSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_unsafe: Option<RouteSummary>,
    pub unsafe_is_fallback: bool,
    pub map: Value,
}

#[derive(Serialize)]
pub struct HeatmapResponse {
    pub resolution: u8,
    pub cells: Vec<HeatCell>,
}

/// Error body: `{status: "error", kind, message}`.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::GeocodeFailure(_) => StatusCode::BAD_REQUEST,
            Error::NoRoute(_) | Error::NoNearbyNode => StatusCode::NOT_FOUND,
            err if err.is_initialization() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            info!("Request rejected: {}", self.0);
        }
        let body = json!({
            "status": "error",
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

fn bad_request(message: &str) -> Response {
    let body = json!({ "status": "error", "kind": "bad_request", "message": message });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// --- Handlers ---

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "Safe Route API" }))
}

async fn route_by_coordinates(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CoordinateRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let origin = Point::new(payload.origin[1], payload.origin[0]);
    let destination = Point::new(payload.destination[1], payload.destination[0]);
    match state.service.plan(origin, destination).await {
        Ok(outcome) => Json(respond(&outcome, (origin, "Start"), (destination, "End"))).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

async fn route_by_name(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NamedRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let (Some(source), Some(destination)) = (payload.source, payload.destination) else {
        return bad_request("Source and destination are required");
    };
    if source.trim().is_empty() || destination.trim().is_empty() {
        return bad_request("Source and destination are required");
    }
    let Some(geocoder) = state.geocoder.as_deref() else {
        return ApiError(Error::GeocodeFailure("no geocoder configured".to_string())).into_response();
    };
    info!("Route request: {source} -> {destination}");

    match state.service.plan_by_name(geocoder, &source, &destination).await {
        Ok((from, to, outcome)) => Json(respond(&outcome, (from, source.as_str()), (to, destination.as_str()))).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

async fn heatmap(State(state): State<Arc<AppState>>) -> Result<Json<HeatmapResponse>, ApiError> {
    let area = state.service.area().await?;
    Ok(Json(HeatmapResponse {
        resolution: u8::from(area.heatmap.resolution()),
        cells: area.heatmap.cells(),
    }))
}

/// Builds the response body. Fastest and most-unsafe summaries are left out
/// when missing or identical to a route already listed.
fn respond(outcome: &RouteOutcome, origin: (Point<f64>, &str), destination: (Point<f64>, &str)) -> RouteResponse {
    let network = &outcome.area.network;
    let layers = outcome.distinct_layers();

    let summary = |layer: &RouteLayer<'_>| RouteSummary {
        nodes: network.node_ids(layer.path),
        distance_km: round2(layer.stats.distance_km),
        crime_score: round2(layer.stats.crime_score),
        geometry: GeoJsonLineString {
            r#type: "LineString",
            coordinates: line_coordinates(network, layer.path),
        },
    };
    let find = |kind: RouteKind| layers.iter().find(|l| l.kind == kind).map(summary);

    let safest = find(RouteKind::Safest);
    let fastest = find(RouteKind::Fastest);
    let most_unsafe = find(RouteKind::MostUnsafe);

    let cells = outcome.area.heatmap.cells();
    let map = GeoJsonRenderer.render(&MapView {
        network,
        origin,
        destination,
        routes: layers,
        crime_cells: &cells,
    });

    RouteResponse {
        status: "success",
        origin_node: network.node(outcome.plan.origin).id,
        destination_node: network.node(outcome.plan.destination).id,
        safe_path_distance_km: round2(outcome.safest.distance_km),
        crime_score: round2(outcome.safest.crime_score),
        safest,
        fastest,
        most_unsafe,
        unsafe_is_fallback: outcome.plan.unsafe_is_fallback,
        map,
    }
}
