//! In-memory routing engine for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use geojson::FeatureCollection;
use serde_json::json;

use valhalla_lib::engine::{
    AlternateRoute, IsochroneRequest, Leg, RouteRequest, RouteResponse, RoutingEngine,
    StatusResponse, Summary, Trip,
};
use valhalla_lib::polyline::{self, Coordinate};
use valhalla_lib::RemoteError;

#[derive(Default)]
pub struct StubEngine {
    calls: Mutex<HashMap<&'static str, usize>>,
    fail: bool,
    missing_shape: bool,
    delay: Option<Duration>,
    tile: Vec<u8>,
}

impl StubEngine {
    /// Every call answers 503.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Routes come back without a leg shape.
    pub fn without_shape(mut self) -> Self {
        self.missing_shape = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_tile(mut self, bytes: Vec<u8>) -> Self {
        self.tile = bytes;
        self
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, operation: &'static str, path: &str) -> Result<(), RemoteError> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(RemoteError::Status {
                status: 503,
                status_text: "Service Unavailable".into(),
                body: None,
                method: "POST".into(),
                url: format!("http://stub{path}"),
            });
        }
        Ok(())
    }
}

pub fn sample_trip(length: f64, time: f64) -> Trip {
    let shape = polyline::encode(&[
        Coordinate::new(38.5, -120.2),
        Coordinate::new(40.7, -120.95),
        Coordinate::new(43.252, -126.453),
    ]);
    let summary = Summary {
        time,
        length,
        min_lat: 38.5,
        min_lon: -126.453,
        max_lat: 43.252,
        max_lon: -120.2,
    };
    Trip {
        legs: vec![Leg {
            shape: Some(shape),
            summary,
        }],
        summary,
        status_message: "Found route between points".into(),
        status: 0,
        units: "kilometers".into(),
    }
}

pub fn sample_isochrone() -> FeatureCollection {
    serde_json::from_value(json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "contour": 15, "color": "#ff0000" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[7.0, 45.0], [7.1, 45.0], [7.1, 45.1], [7.0, 45.0]]]
            }
        }]
    }))
    .unwrap()
}

#[async_trait]
impl RoutingEngine for StubEngine {
    async fn route(&self, request: &RouteRequest) -> Result<RouteResponse, RemoteError> {
        self.enter("route", "/route").await?;
        let mut trip = sample_trip(650.2, 25_200.0);
        if self.missing_shape {
            trip.legs[0].shape = None;
        }
        let alternates = (0..request.alternates.unwrap_or(0))
            .map(|i| AlternateRoute {
                trip: Some(sample_trip(700.0 + f64::from(i), 27_000.0)),
            })
            .collect();
        Ok(RouteResponse {
            trip: Some(trip),
            alternates,
        })
    }

    async fn isochrone(
        &self,
        _request: &IsochroneRequest,
    ) -> Result<FeatureCollection, RemoteError> {
        self.enter("isochrone", "/isochrone").await?;
        Ok(sample_isochrone())
    }

    async fn status(&self) -> Result<StatusResponse, RemoteError> {
        self.enter("status", "/status").await?;
        Ok(StatusResponse {
            version: "3.4.0".into(),
            tileset_last_modified: Some(1_700_000_000),
            available_actions: vec!["status".into(), "route".into(), "isochrone".into()],
            has_tiles: true,
            ..StatusResponse::default()
        })
    }

    async fn tile(&self, _z: u8, _x: u32, _y: u32) -> Result<Vec<u8>, RemoteError> {
        self.enter("tile", "/tile").await?;
        Ok(self.tile.clone())
    }
}
