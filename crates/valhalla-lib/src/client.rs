use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use geojson::FeatureCollection;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::engine::{IsochroneRequest, RouteRequest, RouteResponse, RoutingEngine, StatusResponse};
use crate::error::{self, RemoteError};

/// Default engine address when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8002";

/// Default bound on a single engine call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a Valhalla routing engine.
///
/// No retries: a failed call is reported once and classified by the caller.
#[derive(Debug, Clone)]
pub struct ValhallaClient {
    client: Client,
    base_url: String,
}

impl ValhallaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> error::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<Response, RemoteError> {
        let url = self.url(path);
        let mut request: RequestBuilder = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(method = %method, url = %url, "calling routing engine");
        let response = request
            .send()
            .await
            .map_err(|err| RemoteError::from_reqwest(err, method.as_str(), &url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // The body is best-effort diagnostics; a read failure leaves it empty.
        let text = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: error_body(&text),
            method: method.to_string(),
            url,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        let response = self.send(method.clone(), path, body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| RemoteError::from_reqwest(err, method.as_str(), &url))?;
        serde_json::from_slice(&bytes).map_err(|err| RemoteError::InvalidResponse {
            message: err.to_string(),
            method: Some(method.to_string()),
            url: Some(url),
        })
    }
}

#[async_trait]
impl RoutingEngine for ValhallaClient {
    async fn route(&self, request: &RouteRequest) -> Result<RouteResponse, RemoteError> {
        self.send_json(Method::POST, "/route", Some(request)).await
    }

    async fn isochrone(
        &self,
        request: &IsochroneRequest,
    ) -> Result<FeatureCollection, RemoteError> {
        self.send_json(Method::POST, "/isochrone", Some(request)).await
    }

    async fn status(&self) -> Result<StatusResponse, RemoteError> {
        self.send_json(Method::GET, "/status", None::<&()>).await
    }

    async fn tile(&self, z: u8, x: u32, y: u32) -> Result<Vec<u8>, RemoteError> {
        let path = format!("/tile/{z}/{x}/{y}.pbf");
        let url = self.url(&path);
        let response = self.send(Method::GET, &path, None::<&()>).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| RemoteError::from_reqwest(err, "GET", &url))?;
        Ok(bytes.to_vec())
    }
}

/// Parse an error body as JSON, falling back to the raw text.
fn error_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

fn user_agent() -> String {
    format!("valhalla-lib/{}", env!("CARGO_PKG_VERSION"))
}
