//! Command-line and environment configuration, read once at startup.

use std::time::Duration;

use clap::Parser;

use valhalla_lib::client::DEFAULT_BASE_URL;

use crate::logging::{LogFormat, LoggingConfig};
use crate::server::ServerSettings;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "valhalla-mcp",
    version,
    about = "MCP stdio server exposing a Valhalla routing engine"
)]
pub struct Config {
    /// Base URL of the Valhalla routing engine.
    #[arg(long, env = "VALHALLA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Log filter directives, e.g. `info` or `valhalla_mcp=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format (always written to stderr).
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Timeout for each routing engine request, in seconds.
    #[arg(long, env = "VALHALLA_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Route cache TTL in seconds. Zero disables the cache; it does not fall
    /// back to the default.
    #[arg(long, env = "VALHALLA_ROUTE_CACHE_TTL_SECS", default_value_t = 300)]
    pub route_cache_ttl_secs: u64,

    /// Isochrone cache TTL in seconds. Zero disables the cache.
    #[arg(long, env = "VALHALLA_ISOCHRONE_CACHE_TTL_SECS", default_value_t = 600)]
    pub isochrone_cache_ttl_secs: u64,

    /// Engine status cache TTL in seconds. Zero disables the cache.
    #[arg(long, env = "VALHALLA_HEALTH_CACHE_TTL_SECS", default_value_t = 30)]
    pub health_cache_ttl_secs: u64,

    /// Number of request metrics retained for statistics.
    #[arg(long, env = "VALHALLA_METRICS_HISTORY", default_value_t = 1000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub metrics_history: u64,

    /// Interval between background sweeps of expired cache entries.
    #[arg(long, env = "VALHALLA_CACHE_SWEEP_SECS", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub cache_sweep_secs: u64,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs)
    }

    pub fn settings(&self) -> ServerSettings {
        ServerSettings {
            route_ttl: Duration::from_secs(self.route_cache_ttl_secs),
            isochrone_ttl: Duration::from_secs(self.isochrone_cache_ttl_secs),
            health_ttl: Duration::from_secs(self.health_cache_ttl_secs),
            metrics_capacity: usize::try_from(self.metrics_history).unwrap_or(usize::MAX),
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig::new(self.log_format, self.log_level.clone())
    }
}
