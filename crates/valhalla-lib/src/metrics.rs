//! In-memory request metrics for the MCP adapter.
//!
//! [`MetricsCollector`] keeps a bounded FIFO history of [`RequestMetric`]s
//! together with cache hit/miss counters, and derives summary statistics and
//! a coarse health verdict from them on demand. State lives only in memory
//! and is lost on restart.
//!
//! # Example
//!
//! ```
//! use valhalla_lib::metrics::{MetricsCollector, RequestMetric};
//!
//! let metrics = MetricsCollector::new(1000);
//! metrics.record_request(RequestMetric::new("route", "CALL", 120.0, true));
//! metrics.record_cache_miss();
//!
//! let summary = metrics.summary();
//! assert_eq!(summary.requests.total, 1);
//! assert_eq!(summary.cache.misses, 1);
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default number of request records retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Number of most recent records considered by [`MetricsCollector::health_status`].
pub const HEALTH_WINDOW: usize = 50;

/// Error rate at or above which the health check fails.
pub const MAX_HEALTHY_ERROR_RATE: f64 = 0.10;

/// Average latency (milliseconds) at or above which the health check fails.
pub const MAX_HEALTHY_AVG_MS: f64 = 5000.0;

/// Outcome of a single orchestrated request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMetric {
    pub endpoint: String,
    pub method: String,
    pub duration_ms: f64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
}

impl RequestMetric {
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        duration_ms: f64,
        success: bool,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            duration_ms,
            success,
            timestamp: Utc::now(),
            request_id: None,
            error_code: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_error_code(mut self, code: u16) -> Self {
        self.error_code = Some(code);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub count: usize,
    pub average_ms: f64,
    pub error_count: usize,
}

/// Statistics over the entire retained history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub requests: RequestStats,
    pub performance: PerformanceStats,
    pub cache: CacheCounters,
    /// Keyed by `"METHOD endpoint"`.
    pub endpoints: BTreeMap<String, EndpointStats>,
    pub last_reset: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthChecks {
    pub error_rate: bool,
    pub response_time: bool,
    pub has_recent_activity: bool,
}

impl HealthChecks {
    fn failed(&self) -> usize {
        [self.error_rate, self.response_time, self.has_recent_activity]
            .iter()
            .filter(|passed| !**passed)
            .count()
    }
}

/// Health verdict derived from the most recent records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub checks: HealthChecks,
    pub details: Vec<String>,
}

#[derive(Debug)]
struct State {
    history: VecDeque<RequestMetric>,
    cache_hits: u64,
    cache_misses: u64,
    started_at: DateTime<Utc>,
}

impl State {
    fn empty(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            cache_hits: 0,
            cache_misses: 0,
            started_at: Utc::now(),
        }
    }
}

/// Bounded ledger of request outcomes and cache activity.
///
/// Shared by reference between concurrent handlers; all state sits behind a
/// single mutex that is never held across an await point.
#[derive(Debug)]
pub struct MetricsCollector {
    capacity: usize,
    state: Mutex<State>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl MetricsCollector {
    /// Create a collector retaining at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(State::empty(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record, dropping the oldest once capacity is exceeded.
    pub fn record_request(&self, metric: RequestMetric) {
        let mut state = self.lock();
        state.history.push_back(metric);
        while state.history.len() > self.capacity {
            state.history.pop_front();
        }
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.lock().cache_misses += 1;
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> MetricsSummary {
        let state = self.lock();
        let history = &state.history;

        let total = history.len();
        let successful = history.iter().filter(|m| m.success).count();
        let failed = total - successful;

        let mut durations: Vec<f64> = history.iter().map(|m| m.duration_ms).collect();
        durations.sort_by(f64::total_cmp);

        let performance = if durations.is_empty() {
            PerformanceStats {
                average_ms: 0.0,
                min_ms: 0.0,
                max_ms: 0.0,
                p95_ms: 0.0,
            }
        } else {
            let n = durations.len();
            let p95_index = ((n as f64 * 0.95).floor() as usize).min(n - 1);
            PerformanceStats {
                average_ms: durations.iter().sum::<f64>() / n as f64,
                min_ms: durations[0],
                max_ms: durations[n - 1],
                p95_ms: durations[p95_index],
            }
        };

        let mut endpoints: BTreeMap<String, EndpointStats> = BTreeMap::new();
        for metric in history {
            let stats = endpoints
                .entry(format!("{} {}", metric.method, metric.endpoint))
                .or_insert(EndpointStats {
                    count: 0,
                    average_ms: 0.0,
                    error_count: 0,
                });
            stats.count += 1;
            stats.average_ms += (metric.duration_ms - stats.average_ms) / stats.count as f64;
            if !metric.success {
                stats.error_count += 1;
            }
        }

        MetricsSummary {
            requests: RequestStats {
                total,
                successful,
                failed,
                error_rate: ratio(failed as f64, total as f64),
            },
            performance,
            cache: CacheCounters {
                hits: state.cache_hits,
                misses: state.cache_misses,
                hit_rate: ratio(
                    state.cache_hits as f64,
                    (state.cache_hits + state.cache_misses) as f64,
                ),
            },
            endpoints,
            last_reset: state.started_at,
        }
    }

    /// Evaluate health over the last [`HEALTH_WINDOW`] records.
    pub fn health_status(&self) -> HealthReport {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(HEALTH_WINDOW);
        let recent: Vec<&RequestMetric> = state.history.iter().skip(skip).collect();

        let count = recent.len() as f64;
        let errors = recent.iter().filter(|m| !m.success).count() as f64;
        let error_rate = ratio(errors, count);
        let avg_ms = ratio(recent.iter().map(|m| m.duration_ms).sum(), count);

        let checks = HealthChecks {
            error_rate: error_rate < MAX_HEALTHY_ERROR_RATE,
            response_time: avg_ms < MAX_HEALTHY_AVG_MS,
            has_recent_activity: !recent.is_empty(),
        };

        let mut details = Vec::new();
        if !checks.error_rate {
            details.push(format!("High error rate: {:.1}%", error_rate * 100.0));
        }
        if !checks.response_time {
            details.push(format!("Slow response time: {:.0}ms", avg_ms));
        }
        if !checks.has_recent_activity {
            details.push("No recent activity".to_string());
        }

        let status = match checks.failed() {
            0 => HealthState::Healthy,
            1 => HealthState::Degraded,
            _ => HealthState::Unhealthy,
        };

        HealthReport {
            status,
            checks,
            details,
        }
    }

    /// Failed requests, most recent first.
    pub fn recent_errors(&self, limit: usize) -> Vec<RequestMetric> {
        self.lock()
            .history
            .iter()
            .rev()
            .filter(|m| !m.success)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Requests sorted by duration, slowest first.
    pub fn slowest_requests(&self, limit: usize) -> Vec<RequestMetric> {
        let mut all: Vec<RequestMetric> = self.lock().history.iter().cloned().collect();
        all.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        all.truncate(limit);
        all
    }

    /// Time since construction or the last [`reset`](Self::reset).
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.lock().started_at
    }

    /// Drop all history and counters and restart the uptime clock.
    pub fn reset(&self) {
        *self.lock() = State::empty(self.capacity);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
