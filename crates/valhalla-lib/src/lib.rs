//! Request-handling middleware for the Valhalla MCP adapter.
//!
//! This crate holds everything between the protocol layer and the remote
//! routing engine: the polyline codec, per-category TTL caches, the metrics
//! collector, the error taxonomy with its classifier, input validation and
//! the engine contract with its HTTP client. The MCP server crate should only
//! depend on what is exported here instead of reimplementing behavior.

pub mod cache;
pub mod client;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod polyline;
pub mod problem;
pub mod validation;

pub use cache::{CacheStats, TtlCache};
pub use client::ValhallaClient;
pub use engine::{RoutingEngine, TravelMode, Units};
pub use error::{Error, RemoteError, Result};
pub use metrics::{HealthReport, HealthState, MetricsCollector, MetricsSummary, RequestMetric};
pub use polyline::Coordinate;
pub use problem::{classify, ErrorCode, ErrorResponse, StandardError};
pub use validation::{Validate, ValidationError};
