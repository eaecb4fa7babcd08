//! MCP server state and capability descriptors
//!
//! [`McpServerState`] owns the routing-engine handle, one TTL cache per
//! response category and the metrics collector. It is built once at startup
//! and shared by reference with every request handler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::info;

use valhalla_lib::cache::{self, CacheStats, TtlCache};
use valhalla_lib::engine::{RoutingEngine, StatusResponse};
use valhalla_lib::metrics::{MetricsCollector, DEFAULT_HISTORY_CAPACITY};

use crate::resources::{HEALTH_URI, METRICS_URI, TILE_TEMPLATE};
use crate::types::{IsochroneInput, RouteInput};

/// Name reported in `initialize` and the health resource.
pub const SERVER_NAME: &str = "valhalla-mcp";

/// Server version reported to clients.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP protocol revision implemented by the dispatcher.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const ROUTE_TOOL: &str = "route";
pub const ISOCHRONE_TOOL: &str = "isochrone";

/// Cached route and isochrone responses are shared, not copied, on a hit.
pub type CachedCollection = Arc<FeatureCollection>;

/// Tunables for the state built at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub route_ttl: Duration,
    pub isochrone_ttl: Duration,
    pub health_ttl: Duration,
    pub metrics_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            route_ttl: cache::ROUTE_TTL,
            isochrone_ttl: cache::ISOCHRONE_TTL,
            health_ttl: cache::HEALTH_TTL,
            metrics_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Main server state holding all runtime resources
pub struct McpServerState {
    engine: Arc<dyn RoutingEngine>,
    route_cache: Arc<TtlCache<CachedCollection>>,
    isochrone_cache: Arc<TtlCache<CachedCollection>>,
    health_cache: Arc<TtlCache<StatusResponse>>,
    metrics: MetricsCollector,
    initialized_at: DateTime<Utc>,
}

/// Descriptor for a tool listed by `tools/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Descriptor for a fixed resource listed by `resources/list`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

/// Descriptor for a parameterised resource listed by `resources/templates/list`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDescriptor {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

impl McpServerState {
    pub fn new(engine: Arc<dyn RoutingEngine>, settings: &ServerSettings) -> Self {
        info!(
            route_ttl_secs = settings.route_ttl.as_secs(),
            isochrone_ttl_secs = settings.isochrone_ttl.as_secs(),
            health_ttl_secs = settings.health_ttl.as_secs(),
            metrics_capacity = settings.metrics_capacity,
            "initialising MCP server state"
        );
        Self {
            engine,
            route_cache: Arc::new(TtlCache::new("route", settings.route_ttl)),
            isochrone_cache: Arc::new(TtlCache::new("isochrone", settings.isochrone_ttl)),
            health_cache: Arc::new(TtlCache::new("health", settings.health_ttl)),
            metrics: MetricsCollector::new(settings.metrics_capacity),
            initialized_at: Utc::now(),
        }
    }

    pub fn with_defaults(engine: Arc<dyn RoutingEngine>) -> Self {
        Self::new(engine, &ServerSettings::default())
    }

    pub fn engine(&self) -> &dyn RoutingEngine {
        self.engine.as_ref()
    }

    pub fn route_cache(&self) -> &TtlCache<CachedCollection> {
        &self.route_cache
    }

    pub fn isochrone_cache(&self) -> &TtlCache<CachedCollection> {
        &self.isochrone_cache
    }

    pub fn health_cache(&self) -> &TtlCache<StatusResponse> {
        &self.health_cache
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn initialized_at(&self) -> DateTime<Utc> {
        self.initialized_at
    }

    /// Start the background expiry sweep for every cache.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_cache_sweepers(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.route_cache.spawn_sweeper(interval),
            self.isochrone_cache.spawn_sweeper(interval),
            self.health_cache.spawn_sweeper(interval),
        ]
    }

    /// Size and TTL of each cache, keyed by cache name.
    pub fn cache_stats(&self) -> BTreeMap<&'static str, CacheStats> {
        BTreeMap::from([
            (self.route_cache.name(), self.route_cache.stats()),
            (self.isochrone_cache.name(), self.isochrone_cache.stats()),
            (self.health_cache.name(), self.health_cache.stats()),
        ])
    }

    /// Tools exposed by this server
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: ROUTE_TOOL,
                title: "Calculate Route",
                description: "Calculate a route between two points. Returns a GeoJSON \
                              FeatureCollection with a LineString and summary statistics.",
                input_schema: input_schema::<RouteInput>(),
            },
            ToolDescriptor {
                name: ISOCHRONE_TOOL,
                title: "Generate Isochrone",
                description: "Generate a polygon of the area reachable from a point within \
                              a travel time or distance budget.",
                input_schema: input_schema::<IsochroneInput>(),
            },
        ]
    }

    /// Fixed resources exposed by this server
    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        vec![
            ResourceDescriptor {
                uri: HEALTH_URI,
                name: "health",
                title: "Routing Engine Health",
                description: "Routing engine version, tileset age and capabilities, plus adapter health",
                mime_type: "application/json",
            },
            ResourceDescriptor {
                uri: METRICS_URI,
                name: "metrics",
                title: "Adapter Metrics",
                description: "Request statistics, cache statistics, recent errors and uptime",
                mime_type: "application/json",
            },
        ]
    }

    /// Parameterised resources exposed by this server
    pub fn resource_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        vec![ResourceTemplateDescriptor {
            uri_template: TILE_TEMPLATE,
            name: "tile",
            title: "Vector Tile",
            description: "Routing engine vector tile in Mapbox protobuf format, base64 encoded",
            mime_type: "application/x-protobuf",
        }]
    }
}

fn input_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| json!({ "type": "object" }))
}
