//! End-to-end behaviour through the JSON-RPC dispatcher with an in-memory
//! routing engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geojson::FeatureCollection;
use serde_json::{json, Value};

use valhalla_lib::engine::{
    IsochroneRequest, Leg, RouteRequest, RouteResponse, RoutingEngine, StatusResponse, Summary,
    Trip,
};
use valhalla_lib::polyline::{self, Coordinate};
use valhalla_lib::RemoteError;
use valhalla_mcp::{handle_message, McpServerState, ServerSettings};

#[derive(Default)]
struct MockEngine {
    route_calls: AtomicUsize,
    status_calls: AtomicUsize,
    timeout: bool,
}

#[async_trait]
impl RoutingEngine for MockEngine {
    async fn route(&self, _request: &RouteRequest) -> Result<RouteResponse, RemoteError> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        if self.timeout {
            return Err(RemoteError::Timeout {
                method: "POST".into(),
                url: "http://mock/route".into(),
            });
        }
        let shape = polyline::encode(&[Coordinate::new(52.5, 13.4), Coordinate::new(52.52, 13.41)]);
        let summary = Summary {
            time: 300.0,
            length: 2.5,
            min_lat: 52.5,
            min_lon: 13.4,
            max_lat: 52.52,
            max_lon: 13.41,
        };
        Ok(RouteResponse {
            trip: Some(Trip {
                legs: vec![Leg {
                    shape: Some(shape),
                    summary,
                }],
                summary,
                status_message: "Found route between points".into(),
                status: 0,
                units: "kilometers".into(),
            }),
            alternates: Vec::new(),
        })
    }

    async fn isochrone(
        &self,
        _request: &IsochroneRequest,
    ) -> Result<FeatureCollection, RemoteError> {
        Err(RemoteError::invalid_response("isochrone body was not GeoJSON"))
    }

    async fn status(&self) -> Result<StatusResponse, RemoteError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(StatusResponse {
            version: "3.5.1".into(),
            has_tiles: true,
            ..StatusResponse::default()
        })
    }

    async fn tile(&self, _z: u8, _x: u32, _y: u32) -> Result<Vec<u8>, RemoteError> {
        Err(RemoteError::Status {
            status: 404,
            status_text: "Not Found".into(),
            body: None,
            method: "GET".into(),
            url: "http://mock/tile/0/0/0.pbf".into(),
        })
    }
}

fn route_call(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": "route",
            "arguments": {
                "origin": {"lat": 52.5, "lon": 13.4},
                "destination": {"lat": 52.52, "lon": 13.41}
            }
        }
    })
}

fn read(id: i64, uri: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": "resources/read", "params": {"uri": uri}})
}

fn text_body(value: &Value) -> Value {
    serde_json::from_str(value.as_str().expect("text payload")).expect("JSON text payload")
}

#[tokio::test]
async fn same_route_twice_calls_engine_once() {
    let engine = Arc::new(MockEngine::default());
    let state = McpServerState::with_defaults(engine.clone());

    let first = handle_message(&state, route_call(1)).await.unwrap();
    let second = handle_message(&state, route_call(2)).await.unwrap();

    assert_eq!(engine.route_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first["result"]["isError"], false);
    assert_eq!(
        first["result"]["content"][0]["text"],
        second["result"]["content"][0]["text"]
    );

    let history = state.metrics().slowest_requests(10);
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|m| m.success && m.endpoint == "route"));
    // Slowest first: the miss paid for the engine call, the hit did not.
    assert!(history[1].duration_ms < history[0].duration_ms);
    assert_eq!(state.metrics().summary().cache.hits, 1);
}

#[tokio::test]
async fn expired_route_goes_back_to_engine() {
    let engine = Arc::new(MockEngine::default());
    let settings = ServerSettings {
        route_ttl: Duration::from_millis(20),
        ..ServerSettings::default()
    };
    let state = McpServerState::new(engine.clone(), &settings);

    handle_message(&state, route_call(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle_message(&state, route_call(2)).await.unwrap();

    assert_eq!(engine.route_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn engine_timeout_is_classified() {
    let engine = Arc::new(MockEngine {
        timeout: true,
        ..MockEngine::default()
    });
    let state = McpServerState::with_defaults(engine);

    let response = handle_message(&state, route_call(3)).await.unwrap();
    assert_eq!(response["result"]["isError"], true);
    let body = text_body(&response["result"]["content"][0]["text"]);
    assert_eq!(body["error"], "REMOTE_ENGINE_TIMEOUT");
    assert_eq!(body["code"], 521);
    assert_eq!(body["details"]["url"], "http://mock/route");

    let errors = state.metrics().recent_errors(5);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_code, Some(521));
    assert_eq!(errors[0].request_id.as_deref(), body["request_id"].as_str());
}

#[tokio::test]
async fn malformed_isochrone_is_invalid_response() {
    let state = McpServerState::with_defaults(Arc::new(MockEngine::default()));
    let call = json!({
        "jsonrpc": "2.0",
        "id": 4,
        "method": "tools/call",
        "params": {
            "name": "isochrone",
            "arguments": {"origin": {"lat": 52.5, "lon": 13.4}, "distance_km": 2.5}
        }
    });

    let response = handle_message(&state, call).await.unwrap();
    let body = text_body(&response["result"]["content"][0]["text"]);
    assert_eq!(body["code"], 522);
    assert_eq!(state.isochrone_cache().size(), 0);
}

#[tokio::test]
async fn health_and_metrics_resources() {
    let engine = Arc::new(MockEngine::default());
    let state = McpServerState::with_defaults(engine.clone());

    for id in [5, 6] {
        let response = handle_message(&state, read(id, "health://status")).await.unwrap();
        let body = text_body(&response["result"]["contents"][0]["text"]);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["valhalla"]["version"], "3.5.1");
    }
    assert_eq!(engine.status_calls.load(Ordering::SeqCst), 1);

    let response = handle_message(&state, read(7, "tile://0/0/0")).await.unwrap();
    let body = text_body(&response["result"]["contents"][0]["text"]);
    assert_eq!(body["code"], 520);
    assert_eq!(body["details"]["status"], 404);

    let response = handle_message(&state, read(8, "metrics://summary")).await.unwrap();
    let body = text_body(&response["result"]["contents"][0]["text"]);
    let endpoints = &body["performance_metrics"]["endpoints"];
    assert_eq!(endpoints["READ health://status"]["count"], 2);
    assert_eq!(endpoints["READ tile://{z}/{x}/{y}"]["error_count"], 1);
    assert!(endpoints.get("READ metrics://summary").is_none());
    assert_eq!(body["debugging_info"]["recent_errors"][0]["error_code"], 520);
}
