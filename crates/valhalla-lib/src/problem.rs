//! Stable error taxonomy and failure classification.
//!
//! Every failure that reaches a caller is a [`StandardError`] carrying one of
//! the closed set of [`ErrorCode`]s, a human-readable message, optional
//! structured details, a timestamp and (when known) the request id used for
//! correlation with metrics records. [`classify`] maps any [`Error`] cause
//! onto that shape.
//!
//! # Example
//!
//! ```
//! use valhalla_lib::problem::{ErrorCode, StandardError};
//!
//! let err = StandardError::new(ErrorCode::RateLimited, "Rate limit exceeded")
//!     .with_request_id("0192f1c4-0000-7000-8000-000000000000");
//! assert_eq!(err.code(), 429);
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::{Error, RemoteError};

/// Closed set of error kinds with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    InternalError,
    ServiceUnavailable,
    Timeout,
    RemoteEngineError,
    RemoteEngineTimeout,
    RemoteEngineInvalidResponse,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::ValidationError,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::RateLimited,
        ErrorCode::InternalError,
        ErrorCode::ServiceUnavailable,
        ErrorCode::Timeout,
        ErrorCode::RemoteEngineError,
        ErrorCode::RemoteEngineTimeout,
        ErrorCode::RemoteEngineInvalidResponse,
    ];

    /// Numeric code, HTTP-like for 4xx/5xx and 52x for routing-engine failures.
    pub fn code(self) -> u16 {
        match self {
            ErrorCode::ValidationError => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::RateLimited => 429,
            ErrorCode::InternalError => 500,
            ErrorCode::ServiceUnavailable => 503,
            ErrorCode::Timeout => 504,
            ErrorCode::RemoteEngineError => 520,
            ErrorCode::RemoteEngineTimeout => 521,
            ErrorCode::RemoteEngineInvalidResponse => 522,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::RemoteEngineError => "REMOTE_ENGINE_ERROR",
            ErrorCode::RemoteEngineTimeout => "REMOTE_ENGINE_TIMEOUT",
            ErrorCode::RemoteEngineInvalidResponse => "REMOTE_ENGINE_INVALID_RESPONSE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure. Created where the failure is detected, never mutated
/// afterwards except to attach correlation data.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct StandardError {
    pub kind: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
}

/// Wire shape of a [`StandardError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Symbolic kind, e.g. `REMOTE_ENGINE_TIMEOUT`.
    pub error: String,
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl StandardError {
    pub fn new(kind: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
            request_id: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn remote_timeout() -> Self {
        Self::new(ErrorCode::RemoteEngineTimeout, "Routing engine timeout")
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind.as_str().to_string(),
            code: self.code(),
            message: self.message.clone(),
            details: self.details.clone(),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            request_id: self.request_id.clone(),
        }
    }
}

/// Map any failure cause onto the taxonomy.
///
/// Rules, in order: already-classified errors pass through; routing-engine
/// failures become 52x errors; validation failures become
/// `VALIDATION_ERROR` with one issue per field; everything else becomes
/// `INTERNAL_ERROR` with diagnostics confined to `details`.
///
/// An already-classified error keeps its kind, message, details and
/// timestamp. Its request id is the one exception: when it has none,
/// `request_id` is attached so every failure can be correlated. An existing
/// id is never replaced.
pub fn classify(cause: Error, request_id: Option<&str>) -> StandardError {
    let classified = match cause {
        Error::Classified(err) => err,
        Error::Remote(err) => classify_remote(err),
        Error::Validation(err) => StandardError::new(ErrorCode::ValidationError, err.message)
            .with_details(json!(err.issues)),
        Error::Internal(err) => classify_internal(&err),
    };

    match (classified.request_id.is_none(), request_id) {
        (true, Some(id)) => classified.with_request_id(id),
        _ => classified,
    }
}

fn classify_remote(err: RemoteError) -> StandardError {
    match err {
        RemoteError::Timeout { method, url } => StandardError::remote_timeout().with_details(json!({
            "url": url,
            "method": method,
        })),
        RemoteError::Status {
            status,
            status_text,
            body,
            method,
            url,
        } => {
            let message = if status >= 500 {
                format!(
                    "Routing engine service error: {}",
                    non_empty(&status_text, "Unknown error")
                )
            } else {
                format!(
                    "Routing engine API error: {status} {}",
                    non_empty(&status_text, "")
                )
                .trim_end()
                .to_string()
            };
            StandardError::new(ErrorCode::RemoteEngineError, message).with_details(json!({
                "status": status,
                "status_text": status_text,
                "data": body,
                "url": url,
                "method": method,
            }))
        }
        RemoteError::InvalidResponse {
            message,
            method,
            url,
        } => StandardError::new(
            ErrorCode::RemoteEngineInvalidResponse,
            format!("Invalid routing engine response: {message}"),
        )
        .with_details(json!({ "url": url, "method": method })),
        RemoteError::Transport {
            message,
            method,
            url,
        } => StandardError::new(
            ErrorCode::RemoteEngineError,
            format!("Routing engine API error: {message}"),
        )
        .with_details(json!({ "url": url, "method": method })),
    }
}

fn classify_internal(err: &anyhow::Error) -> StandardError {
    let message = err.to_string();
    let message = if message.is_empty() {
        "An unexpected error occurred".to_string()
    } else {
        message
    };
    let chain: Vec<String> = err.chain().skip(1).map(|cause| cause.to_string()).collect();
    let root = err.root_cause();
    StandardError::new(ErrorCode::InternalError, message).with_details(json!({
        "original_error": format!("{root:?}"),
        "chain": chain,
        "backtrace": err.backtrace().to_string(),
    }))
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{Issues, ValidationError};

    #[test]
    fn test_codes_are_stable() {
        let codes: Vec<u16> = ErrorCode::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(
            codes,
            vec![400, 401, 403, 404, 429, 500, 503, 504, 520, 521, 522]
        );
        for kind in ErrorCode::ALL {
            assert_eq!(ErrorCode::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorCode::from_code(418), None);
    }

    #[test]
    fn test_kind_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::RemoteEngineInvalidResponse).unwrap();
        assert_eq!(json, "\"REMOTE_ENGINE_INVALID_RESPONSE\"");
        assert_eq!(ErrorCode::RateLimited.to_string(), "RATE_LIMITED");
    }

    #[test]
    fn test_classified_error_passes_through() {
        let original = StandardError::new(ErrorCode::RateLimited, "slow down")
            .with_details(json!({"retry_after": 5}));
        let classified = classify(original.clone().into(), Some("req-1"));
        assert_eq!(classified.kind, ErrorCode::RateLimited);
        assert_eq!(classified.message, "slow down");
        assert_eq!(classified.details, original.details);
        assert_eq!(classified.timestamp, original.timestamp);
        assert_eq!(classified.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_classified_error_without_request_id_is_unchanged() {
        let original = StandardError::validation("bad input");
        assert_eq!(classify(original.clone().into(), None), original);
    }

    #[test]
    fn test_classified_error_keeps_existing_request_id() {
        let original = StandardError::internal("boom").with_request_id("first");
        let classified = classify(original.into(), Some("second"));
        assert_eq!(classified.request_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_timeout_classifies_as_remote_timeout() {
        let cause = RemoteError::Timeout {
            method: "POST".into(),
            url: "http://engine/route".into(),
        };
        let err = classify(cause.into(), Some("req-t"));
        assert_eq!(err.kind, ErrorCode::RemoteEngineTimeout);
        assert_eq!(err.code(), 521);
        assert_eq!(err.details.as_ref().unwrap()["method"], "POST");
        assert_eq!(err.request_id.as_deref(), Some("req-t"));
    }

    #[test]
    fn test_server_status_classifies_as_remote_error_with_details() {
        let cause = RemoteError::Status {
            status: 503,
            status_text: "Service Unavailable".into(),
            body: Some(json!({"error": "overloaded"})),
            method: "POST".into(),
            url: "http://engine/route".into(),
        };
        let err = classify(cause.into(), None);
        assert_eq!(err.kind, ErrorCode::RemoteEngineError);
        assert_eq!(err.code(), 520);
        assert_eq!(
            err.message,
            "Routing engine service error: Service Unavailable"
        );
        let details = err.details.unwrap();
        assert_eq!(details["status"], 503);
        assert_eq!(details["url"], "http://engine/route");
        assert_eq!(details["method"], "POST");
        assert_eq!(details["data"]["error"], "overloaded");
    }

    #[test]
    fn test_client_status_is_api_error() {
        let cause = RemoteError::Status {
            status: 400,
            status_text: "Bad Request".into(),
            body: None,
            method: "POST".into(),
            url: "http://engine/route".into(),
        };
        let err = classify(cause.into(), None);
        assert_eq!(err.kind, ErrorCode::RemoteEngineError);
        assert_eq!(err.message, "Routing engine API error: 400 Bad Request");
    }

    #[test]
    fn test_transport_failure_keeps_raw_message() {
        let cause = RemoteError::Transport {
            message: "connection refused".into(),
            method: "GET".into(),
            url: "http://engine/status".into(),
        };
        let err = classify(cause.into(), None);
        assert_eq!(err.kind, ErrorCode::RemoteEngineError);
        assert!(err.message.contains("connection refused"));
    }

    #[test]
    fn test_invalid_response_classification() {
        let err = classify(RemoteError::invalid_response("missing trip").into(), None);
        assert_eq!(err.code(), 522);
        assert!(err.message.contains("missing trip"));
    }

    #[test]
    fn test_validation_failure_lists_field_issues() {
        let mut issues = Issues::default();
        issues.check_coordinate("origin", 200.0, 0.0);
        let cause: ValidationError = issues.finish().unwrap_err();

        let err = classify(cause.into(), Some("req-v"));
        assert_eq!(err.kind, ErrorCode::ValidationError);
        assert_eq!(err.code(), 400);
        let details = err.details.unwrap();
        assert_eq!(details[0]["path"], "origin.lat");
        assert_eq!(details[0]["rule"], "range");
    }

    #[test]
    fn test_unknown_failure_is_internal_without_leaking_diagnostics() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let cause = anyhow::Error::new(io).context("failed to render");
        let err = classify(cause.into(), None);

        assert_eq!(err.kind, ErrorCode::InternalError);
        assert_eq!(err.message, "failed to render");
        let details = err.details.unwrap();
        assert!(details["original_error"].as_str().unwrap().contains("disk on fire"));
        assert_eq!(details["chain"][0], "disk on fire");
        assert!(details.get("backtrace").is_some());
    }

    #[test]
    fn test_to_response_shape() {
        let response = StandardError::remote_timeout()
            .with_request_id("req-9")
            .to_response();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "REMOTE_ENGINE_TIMEOUT");
        assert_eq!(json["code"], 521);
        assert_eq!(json["request_id"], "req-9");
        assert!(json.get("details").is_none());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
