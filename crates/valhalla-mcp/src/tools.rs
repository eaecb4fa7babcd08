//! MCP tool implementations
//!
//! - `route`: route between two points as a GeoJSON LineString collection
//! - `isochrone`: reachability polygons around a point
//!
//! Both follow the same pipeline: validate, fingerprint, consult the cache,
//! call the engine on a miss, enrich, store, and record exactly one metric.

use std::sync::Arc;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoJsonValue};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use valhalla_lib::engine::{RouteResponse, Summary};
use valhalla_lib::polyline;
use valhalla_lib::validation::{Validate, ValidationError};
use valhalla_lib::{RemoteError, StandardError};

use crate::invocation::{Invocation, TOOL_CALL};
use crate::request::RequestId;
use crate::server::{CachedCollection, McpServerState, ISOCHRONE_TOOL, ROUTE_TOOL};
use crate::types::{IsochroneInput, RouteInput};

const NO_ROUTE: &str =
    "no route returned; check that the coordinates are within map data coverage";

/// Deserialize and validate raw tool arguments.
fn parse_input<T: DeserializeOwned + Validate>(arguments: Value) -> Result<T, ValidationError> {
    let input: T =
        serde_json::from_value(arguments).map_err(|err| ValidationError::from_serde(&err))?;
    input.validate()?;
    Ok(input)
}

/// Route calculation tool
pub struct RouteTool;

impl RouteTool {
    pub async fn execute(
        state: &McpServerState,
        arguments: Value,
        request_id: RequestId,
    ) -> Result<CachedCollection, StandardError> {
        let invocation = Invocation::start(state.metrics(), ROUTE_TOOL, TOOL_CALL, request_id);
        let outcome = Self::run(state, arguments).await;
        invocation.finish(outcome)
    }

    async fn run(state: &McpServerState, arguments: Value) -> valhalla_lib::Result<CachedCollection> {
        let input: RouteInput = parse_input(arguments)?;

        let key = input.fingerprint();
        if let Some(cached) = state.route_cache().get(&key) {
            state.metrics().record_cache_hit();
            debug!(fingerprint = %key, "route served from cache");
            return Ok(cached);
        }
        state.metrics().record_cache_miss();

        info!(
            origin_lat = input.origin.lat,
            origin_lon = input.origin.lon,
            destination_lat = input.destination.lat,
            destination_lon = input.destination.lon,
            mode = %input.mode,
            "calculating route"
        );
        let response = state.engine().route(&input.to_request()).await?;
        let collection = Arc::new(route_collection(&input, &response)?);
        state.route_cache().set(key, Arc::clone(&collection));
        Ok(collection)
    }
}

/// Convert an engine route response into a GeoJSON FeatureCollection.
///
/// The primary route is the first feature; each alternate that carries a
/// shape follows it with `alternative: true`.
pub fn route_collection(
    input: &RouteInput,
    response: &RouteResponse,
) -> Result<FeatureCollection, RemoteError> {
    let trip = response
        .trip
        .as_ref()
        .ok_or_else(|| RemoteError::invalid_response(NO_ROUTE))?;
    let shape = trip
        .first_shape()
        .ok_or_else(|| RemoteError::invalid_response(NO_ROUTE))?;

    let mut properties = summary_properties(&trip.summary, input);
    properties.insert("mode".into(), json!(input.mode));
    properties.insert("bbox".into(), json!(trip.summary.bbox()));
    let mut features = vec![line_feature(shape, properties)?];

    for alternate in &response.alternates {
        let Some(trip) = alternate.trip.as_ref() else {
            continue;
        };
        let Some(shape) = trip.first_shape() else {
            continue;
        };
        let mut properties = summary_properties(&trip.summary, input);
        properties.insert("alternative".into(), json!(true));
        features.push(line_feature(shape, properties)?);
    }

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn summary_properties(summary: &Summary, input: &RouteInput) -> JsonObject {
    let mut properties = JsonObject::new();
    properties.insert("distance".into(), json!(summary.length));
    properties.insert("distance_units".into(), json!(input.units));
    properties.insert("duration_seconds".into(), json!(summary.time));
    properties.insert(
        "duration_minutes".into(),
        json!((summary.time / 60.0).round()),
    );
    properties.insert("units".into(), json!(input.units));
    properties
}

fn line_feature(shape: &str, properties: JsonObject) -> Result<Feature, RemoteError> {
    let positions = polyline::decode(shape)?
        .into_iter()
        .map(|coordinate| coordinate.to_position())
        .collect();
    Ok(Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoJsonValue::LineString(positions))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Isochrone generation tool
///
/// The engine's FeatureCollection is returned as is.
pub struct IsochroneTool;

impl IsochroneTool {
    pub async fn execute(
        state: &McpServerState,
        arguments: Value,
        request_id: RequestId,
    ) -> Result<CachedCollection, StandardError> {
        let invocation =
            Invocation::start(state.metrics(), ISOCHRONE_TOOL, TOOL_CALL, request_id);
        let outcome = Self::run(state, arguments).await;
        invocation.finish(outcome)
    }

    async fn run(state: &McpServerState, arguments: Value) -> valhalla_lib::Result<CachedCollection> {
        let input: IsochroneInput = parse_input(arguments)?;

        let key = input.fingerprint();
        if let Some(cached) = state.isochrone_cache().get(&key) {
            state.metrics().record_cache_hit();
            debug!(fingerprint = %key, "isochrone served from cache");
            return Ok(cached);
        }
        state.metrics().record_cache_miss();

        info!(
            origin_lat = input.origin.lat,
            origin_lon = input.origin.lon,
            minutes = input.minutes,
            distance_km = input.distance_km,
            mode = %input.mode,
            "generating isochrone"
        );
        let collection = Arc::new(state.engine().isochrone(&input.to_request()).await?);
        state.isochrone_cache().set(key, Arc::clone(&collection));
        Ok(collection)
    }
}
