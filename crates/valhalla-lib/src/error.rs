use serde_json::Value;
use thiserror::Error;

use crate::polyline::PolylineError;
use crate::problem::StandardError;
use crate::validation::ValidationError;

/// Convenient result alias for the adapter library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level failure cause threaded through the request orchestrators.
///
/// Every variant is turned into a [`StandardError`] by
/// [`classify`](crate::problem::classify) at the response boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// An error that has already been classified.
    #[error(transparent)]
    Classified(#[from] StandardError),

    /// The call to the routing engine failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Caller input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Anything the adapter did not anticipate.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(anyhow::Error::msg(message.into()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(anyhow::Error::new(err).context("failed to serialize response"))
    }
}

/// Failure talking to the remote routing engine.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request did not complete within the client timeout.
    #[error("{method} {url} timed out")]
    Timeout { method: String, url: String },

    /// The engine answered with a non-success HTTP status.
    #[error("routing engine responded with {status} {status_text}")]
    Status {
        status: u16,
        status_text: String,
        body: Option<Value>,
        method: String,
        url: String,
    },

    /// The engine answered but the payload could not be used.
    #[error("invalid response from routing engine: {message}")]
    InvalidResponse {
        message: String,
        method: Option<String>,
        url: Option<String>,
    },

    /// Connection refused, DNS failure, TLS failure and similar.
    #[error("routing engine request failed: {message}")]
    Transport {
        message: String,
        method: String,
        url: String,
    },
}

impl RemoteError {
    /// Build an [`InvalidResponse`](Self::InvalidResponse) without request context.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
            method: None,
            url: None,
        }
    }

    /// Map a reqwest failure for `method url` onto the remote taxonomy.
    pub fn from_reqwest(err: reqwest::Error, method: &str, url: &str) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                method: method.to_string(),
                url: url.to_string(),
            };
        }
        if err.is_decode() {
            return Self::InvalidResponse {
                message: err.to_string(),
                method: Some(method.to_string()),
                url: Some(url.to_string()),
            };
        }
        Self::Transport {
            message: full_message(&err),
            method: method.to_string(),
            url: url.to_string(),
        }
    }
}

impl From<PolylineError> for RemoteError {
    fn from(err: PolylineError) -> Self {
        Self::invalid_response(format!("route shape could not be decoded: {err}"))
    }
}

/// Join an error with its sources; reqwest hides the useful part in `source()`.
fn full_message(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
