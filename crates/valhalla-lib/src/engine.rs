//! Contract with the remote routing engine.
//!
//! The request and response types mirror the subset of the Valhalla HTTP API
//! the adapter uses. Response fields the adapter does not inspect are either
//! defaulted or carried through untouched.

use std::fmt;

use async_trait::async_trait;
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RemoteError;

/// Costing model used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Auto,
    Bicycle,
    Pedestrian,
    Taxi,
    Bus,
}

impl TravelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Auto => "auto",
            TravelMode::Bicycle => "bicycle",
            TravelMode::Pedestrian => "pedestrian",
            TravelMode::Taxi => "taxi",
            TravelMode::Bus => "bus",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance units for narrative and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Kilometers,
    Miles,
}

impl Units {
    pub fn as_str(self) -> &'static str {
        match self {
            Units::Kilometers => "kilometers",
            Units::Miles => "miles",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Break,
    Through,
    Via,
    BreakThrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<LocationType>,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            kind: None,
        }
    }

    pub fn stop(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            kind: Some(LocationType::Break),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsOptions {
    pub units: Units,
    pub narrative: bool,
}

/// Body of `POST /route`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub locations: Vec<Location>,
    pub costing: TravelMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directions_options: Option<DirectionsOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternates: Option<u8>,
}

/// Length/time summary with the bounding box of a trip or leg.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    /// Seconds.
    pub time: f64,
    /// Distance in the requested units.
    pub length: f64,
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Summary {
    /// Bounding box in GeoJSON order: `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn bbox(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Leg {
    /// Encoded polyline at precision 1e6.
    #[serde(default)]
    pub shape: Option<String>,
    #[serde(default)]
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trip {
    #[serde(default)]
    pub legs: Vec<Leg>,
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub units: String,
}

impl Trip {
    /// Shape of the first leg, if the engine produced one.
    pub fn first_shape(&self) -> Option<&str> {
        self.legs
            .first()
            .and_then(|leg| leg.shape.as_deref())
            .filter(|shape| !shape.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlternateRoute {
    #[serde(default)]
    pub trip: Option<Trip>,
}

/// Body returned by `POST /route`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(default)]
    pub trip: Option<Trip>,
    #[serde(default)]
    pub alternates: Vec<AlternateRoute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    /// Minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    /// Kilometres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Body of `POST /isochrone`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochroneRequest {
    pub locations: Vec<Location>,
    pub costing: TravelMode,
    pub contours: Vec<Contour>,
    pub polygons: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denoise: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generalize: Option<f64>,
}

/// Body returned by `GET /status`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub version: String,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub tileset_last_modified: Option<i64>,
    #[serde(default)]
    pub available_actions: Vec<String>,
    #[serde(default)]
    pub has_tiles: bool,
    #[serde(default)]
    pub has_admins: bool,
    #[serde(default)]
    pub has_timezones: bool,
    #[serde(default)]
    pub has_live_traffic: bool,
    #[serde(default)]
    pub has_transit_tiles: bool,
    /// Fields the adapter does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Operations the adapter needs from a routing engine.
///
/// [`ValhallaClient`](crate::client::ValhallaClient) implements this over
/// HTTP; tests substitute in-memory engines.
#[async_trait]
pub trait RoutingEngine: Send + Sync {
    async fn route(&self, request: &RouteRequest) -> Result<RouteResponse, RemoteError>;

    async fn isochrone(&self, request: &IsochroneRequest)
        -> Result<FeatureCollection, RemoteError>;

    async fn status(&self) -> Result<StatusResponse, RemoteError>;

    /// Raw vector tile bytes.
    async fn tile(&self, z: u8, x: u32, y: u32) -> Result<Vec<u8>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_request_serialization() {
        let request = RouteRequest {
            locations: vec![Location::stop(45.0, 7.0), Location::stop(45.1, 7.1)],
            costing: TravelMode::Bicycle,
            directions_options: Some(DirectionsOptions {
                units: Units::Miles,
                narrative: true,
            }),
            alternates: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["locations"][0]["type"], "break");
        assert_eq!(json["costing"], "bicycle");
        assert_eq!(json["directions_options"]["units"], "miles");
        assert!(json.get("alternates").is_none());
    }

    #[test]
    fn test_route_response_tolerates_missing_fields() {
        let response: RouteResponse = serde_json::from_value(json!({
            "trip": { "legs": [{}], "summary": { "time": 60.0 } }
        }))
        .unwrap();
        let trip = response.trip.unwrap();
        assert_eq!(trip.first_shape(), None);
        assert_eq!(trip.summary.time, 60.0);
        assert!(response.alternates.is_empty());
    }

    #[test]
    fn test_first_shape_ignores_empty_string() {
        let trip = Trip {
            legs: vec![Leg {
                shape: Some(String::new()),
                summary: Summary::default(),
            }],
            ..Trip::default()
        };
        assert_eq!(trip.first_shape(), None);
    }

    #[test]
    fn test_isochrone_request_omits_unset_fields() {
        let request = IsochroneRequest {
            locations: vec![Location::new(45.0, 7.0)],
            costing: TravelMode::Auto,
            contours: vec![Contour {
                time: Some(15.0),
                distance: None,
                color: Some("ff0000".into()),
            }],
            polygons: true,
            denoise: None,
            generalize: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contours"][0], json!({"time": 15.0, "color": "ff0000"}));
        assert!(json["locations"][0].get("type").is_none());
        assert!(json.get("denoise").is_none());
    }

    #[test]
    fn test_status_response_keeps_unknown_fields() {
        let status: StatusResponse = serde_json::from_value(json!({
            "version": "3.4.0",
            "tileset_last_modified": 1700000000,
            "available_actions": ["route", "isochrone"],
            "has_admins": true,
            "osm_changeset": 42
        }))
        .unwrap();
        assert_eq!(status.version, "3.4.0");
        assert_eq!(status.tileset_last_modified, Some(1_700_000_000));
        assert!(status.has_admins);
        assert_eq!(status.extra["osm_changeset"], 42);
    }

    #[test]
    fn test_bbox_order() {
        let summary = Summary {
            min_lat: 1.0,
            min_lon: 2.0,
            max_lat: 3.0,
            max_lon: 4.0,
            ..Summary::default()
        };
        assert_eq!(summary.bbox(), [2.0, 1.0, 4.0, 3.0]);
    }
}
