use std::time::Instant;

use tracing::{debug, warn};
use valhalla_lib::metrics::{MetricsCollector, RequestMetric};
use valhalla_lib::{classify, StandardError};

use crate::request::RequestId;

/// Method label recorded for tool calls.
pub const TOOL_CALL: &str = "CALL";

/// Method label recorded for resource reads.
pub const RESOURCE_READ: &str = "READ";

/// Timing and outcome bookkeeping for one orchestrated call.
///
/// Every path out of an orchestrator goes through [`finish`](Self::finish),
/// so each invocation records exactly one metric and failures are classified
/// exactly once.
pub struct Invocation<'a> {
    metrics: &'a MetricsCollector,
    endpoint: &'static str,
    method: &'static str,
    request_id: RequestId,
    started: Instant,
}

impl<'a> Invocation<'a> {
    pub fn start(
        metrics: &'a MetricsCollector,
        endpoint: &'static str,
        method: &'static str,
        request_id: RequestId,
    ) -> Self {
        Self {
            metrics,
            endpoint,
            method,
            request_id,
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Record the outcome and classify a failure.
    pub fn finish<T>(self, outcome: valhalla_lib::Result<T>) -> Result<T, StandardError> {
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let metric = RequestMetric::new(self.endpoint, self.method, duration_ms, outcome.is_ok())
            .with_request_id(self.request_id.as_str());

        match outcome {
            Ok(value) => {
                debug!(
                    request_id = %self.request_id,
                    endpoint = self.endpoint,
                    duration_ms,
                    "request succeeded"
                );
                self.metrics.record_request(metric);
                Ok(value)
            }
            Err(cause) => {
                let err = classify(cause, Some(self.request_id.as_str()));
                warn!(
                    request_id = %self.request_id,
                    endpoint = self.endpoint,
                    duration_ms,
                    code = err.code(),
                    error = %err,
                    "request failed"
                );
                self.metrics
                    .record_request(metric.with_error_code(err.code()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valhalla_lib::{Error, ErrorCode, RemoteError};

    #[test]
    fn test_success_records_one_metric() {
        let metrics = MetricsCollector::default();
        let invocation = Invocation::start(&metrics, "route", TOOL_CALL, RequestId::from("r1"));
        let value = invocation.finish(Ok::<_, Error>(7)).unwrap();

        assert_eq!(value, 7);
        let summary = metrics.summary();
        assert_eq!(summary.requests.successful, 1);
        assert!(summary.endpoints.contains_key("CALL route"));
    }

    #[test]
    fn test_failure_is_classified_and_recorded() {
        let metrics = MetricsCollector::default();
        let invocation =
            Invocation::start(&metrics, "health://status", RESOURCE_READ, RequestId::from("r2"));
        let cause = RemoteError::Timeout {
            method: "GET".into(),
            url: "http://engine/status".into(),
        };
        let err = invocation.finish::<()>(Err(cause.into())).unwrap_err();

        assert_eq!(err.kind, ErrorCode::RemoteEngineTimeout);
        assert_eq!(err.request_id.as_deref(), Some("r2"));
        let errors = metrics.recent_errors(5);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code, Some(521));
        assert_eq!(errors[0].request_id.as_deref(), Some("r2"));
    }
}
