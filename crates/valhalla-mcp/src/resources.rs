//! MCP resource implementations
//!
//! - `health://status`: routing-engine status enriched with adapter health
//! - `tile://{z}/{x}/{y}`: raw vector tiles, base64 encoded
//! - `metrics://summary`: request, cache and health statistics

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use valhalla_lib::engine::StatusResponse;
use valhalla_lib::validation::{Issues, Rule, ValidationError};
use valhalla_lib::StandardError;

use crate::invocation::{Invocation, RESOURCE_READ};
use crate::request::RequestId;
use crate::server::{McpServerState, ISOCHRONE_TOOL, ROUTE_TOOL, SERVER_NAME, SERVER_VERSION};

pub const HEALTH_URI: &str = "health://status";
pub const METRICS_URI: &str = "metrics://summary";
pub const TILE_TEMPLATE: &str = "tile://{z}/{x}/{y}";

pub const TILE_SCHEME: &str = "tile://";
const HEALTH_CACHE_KEY: &str = "status";
const MAX_ZOOM: i64 = 18;
const DEBUG_LIST_LIMIT: usize = 5;

pub const JSON_MIME: &str = "application/json";
pub const TILE_MIME: &str = "application/x-protobuf";

/// One entry of a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded binary payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ResourceContents {
    pub fn json(uri: impl Into<String>, value: &Value) -> Self {
        Self {
            uri: uri.into(),
            mime_type: JSON_MIME,
            text: Some(pretty(value)),
            blob: None,
        }
    }

    pub fn blob(uri: impl Into<String>, mime_type: &'static str, bytes: &[u8]) -> Self {
        Self {
            uri: uri.into(),
            mime_type,
            text: None,
            blob: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Routing engine health resource
///
/// Engine status is cached for the health TTL. A failed status call still
/// yields a payload, with `status: "unhealthy"` and the classified error.
pub struct HealthResource;

impl HealthResource {
    pub async fn read(state: &McpServerState, request_id: RequestId) -> Value {
        let invocation = Invocation::start(state.metrics(), HEALTH_URI, RESOURCE_READ, request_id);
        let outcome = Self::fetch(state).await;
        match invocation.finish(outcome) {
            Ok(status) => Self::healthy(state, &status),
            Err(err) => Self::unhealthy(&err),
        }
    }

    async fn fetch(state: &McpServerState) -> valhalla_lib::Result<StatusResponse> {
        if let Some(status) = state.health_cache().get(HEALTH_CACHE_KEY) {
            state.metrics().record_cache_hit();
            debug!("health status served from cache");
            return Ok(status);
        }
        state.metrics().record_cache_miss();

        info!("fetching routing engine status");
        let status = state.engine().status().await?;
        state.health_cache().set(HEALTH_CACHE_KEY, status.clone());
        Ok(status)
    }

    fn healthy(state: &McpServerState, status: &StatusResponse) -> Value {
        let tileset_last_modified = status
            .tileset_last_modified
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(rfc3339);

        json!({
            "status": "healthy",
            "timestamp": rfc3339(Utc::now()),
            "valhalla": {
                "version": status.version,
                "tileset_last_modified": tileset_last_modified,
                "available_actions": status.available_actions,
                "capabilities": {
                    "has_tiles": status.has_tiles,
                    "has_transit_tiles": status.has_transit_tiles,
                    "has_admins": status.has_admins,
                    "has_timezones": status.has_timezones,
                    "has_live_traffic": status.has_live_traffic,
                },
            },
            "adapter_health": state.metrics().health_status(),
            "mcp_server": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
                "supported_tools": [ROUTE_TOOL, ISOCHRONE_TOOL],
                "supported_resources": ["health", "tile", "metrics"],
            },
        })
    }

    fn unhealthy(err: &StandardError) -> Value {
        json!({
            "status": "unhealthy",
            "timestamp": rfc3339(Utc::now()),
            "error": err.to_response(),
            "mcp_server": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            },
        })
    }
}

/// Validated slippy-map tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoords {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoords {
    /// Parse and validate a `tile://{z}/{x}/{y}` URI.
    pub fn parse(uri: &str) -> Result<Self, ValidationError> {
        let Some(path) = uri.strip_prefix(TILE_SCHEME) else {
            return Err(ValidationError::field(
                "uri",
                format!("Tile URI must match {TILE_TEMPLATE}"),
                Rule::Type,
            ));
        };
        let parts: Vec<&str> = path.split('/').collect();
        let [z, x, y] = parts.as_slice() else {
            return Err(ValidationError::field(
                "uri",
                format!("Tile URI must match {TILE_TEMPLATE}"),
                Rule::Type,
            ));
        };

        let mut issues = Issues::default();
        let mut integer = |name: &str, raw: &str| match canonical_integer(raw) {
            Some(value) => Some(value),
            None => {
                issues.push(name, "Tile coordinates must be integers", Rule::Integer);
                None
            }
        };
        let (z, x, y) = (integer("z", *z), integer("x", *x), integer("y", *y));

        if let Some(zoom) = z {
            if !(0..=MAX_ZOOM).contains(&zoom) {
                issues.push("z", "Zoom level must be between 0 and 18", Rule::Range);
            } else {
                let max_index = (1_i64 << zoom) - 1;
                for (name, value) in [("x", x), ("y", y)] {
                    if matches!(value, Some(v) if !(0..=max_index).contains(&v)) {
                        issues.push(
                            name,
                            format!("Tile coordinates out of range for zoom level {zoom}"),
                            Rule::Range,
                        );
                    }
                }
            }
        }
        issues.finish()?;

        match (z, x, y) {
            (Some(z), Some(x), Some(y)) => Ok(Self {
                z: z as u8,
                x: x as u32,
                y: y as u32,
            }),
            _ => Err(ValidationError::field(
                "uri",
                "Tile coordinates must be integers",
                Rule::Integer,
            )),
        }
    }
}

/// Parse a plain decimal integer: optional `-`, no `+`, no leading zeros.
fn canonical_integer(raw: &str) -> Option<i64> {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let canonical = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));
    if canonical {
        raw.parse().ok()
    } else {
        None
    }
}

/// Vector tile resource
///
/// Tiles are not cached; every read reaches the engine once its coordinates
/// validate.
pub struct TileResource;

impl TileResource {
    pub async fn read(
        state: &McpServerState,
        uri: &str,
        request_id: RequestId,
    ) -> Result<ResourceContents, StandardError> {
        let invocation = Invocation::start(state.metrics(), TILE_TEMPLATE, RESOURCE_READ, request_id);
        let outcome = Self::fetch(state, uri).await;
        invocation
            .finish(outcome)
            .map(|bytes| ResourceContents::blob(uri, TILE_MIME, &bytes))
    }

    async fn fetch(state: &McpServerState, uri: &str) -> valhalla_lib::Result<Vec<u8>> {
        let coords = TileCoords::parse(uri)?;
        info!(z = coords.z, x = coords.x, y = coords.y, "fetching tile");
        Ok(state.engine().tile(coords.z, coords.x, coords.y).await?)
    }
}

/// Metrics resource
///
/// Read-only view of the collector and caches; reading it records nothing.
pub struct MetricsResource;

impl MetricsResource {
    pub fn read(state: &McpServerState, request_id: &RequestId) -> Value {
        let metrics = state.metrics();
        let summary = metrics.summary();
        let uptime = metrics.uptime();

        json!({
            "timestamp": rfc3339(Utc::now()),
            "request_id": request_id.as_str(),
            "system_health": metrics.health_status(),
            "performance_metrics": {
                "requests": summary.requests,
                "error_rate_percentage": format!("{:.2}", summary.requests.error_rate * 100.0),
                "response_times": summary.performance,
                "endpoints": summary.endpoints,
            },
            "cache_metrics": {
                "hits": summary.cache.hits,
                "misses": summary.cache.misses,
                "hit_rate": summary.cache.hit_rate,
                "hit_rate_percentage": format!("{:.2}", summary.cache.hit_rate * 100.0),
                "individual_caches": state.cache_stats(),
            },
            "debugging_info": {
                "recent_errors": metrics.recent_errors(DEBUG_LIST_LIMIT),
                "slowest_requests": metrics.slowest_requests(DEBUG_LIST_LIMIT),
            },
            "uptime": {
                "since": rfc3339(summary.last_reset),
                "server_started": rfc3339(state.initialized_at()),
                "duration_seconds": uptime.num_milliseconds() as f64 / 1000.0,
                "duration_hours": format!("{:.2}", uptime.num_seconds() as f64 / 3600.0),
            },
        })
    }
}
