//! JSON-RPC 2.0 dispatch for the MCP methods this server implements.
//!
//! [`handle_message`] takes one decoded frame and returns the response frame,
//! or `None` for notifications. Tool failures are not protocol errors: they
//! come back as tool results with `isError: true`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info_span, warn, Instrument};

use valhalla_lib::StandardError;

use crate::request::RequestId;
use crate::resources::{
    HealthResource, MetricsResource, ResourceContents, TileResource, HEALTH_URI, METRICS_URI,
    TILE_SCHEME,
};
use crate::server::{
    CachedCollection, McpServerState, ISOCHRONE_TOOL, PROTOCOL_VERSION, ROUTE_TOOL, SERVER_NAME,
    SERVER_VERSION,
};
use crate::tools::{IsochroneTool, RouteTool};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Protocol-level failure, sent as the `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(PARSE_ERROR, format!("Parse error: {detail}"))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Unknown method: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

pub fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result })
}

pub fn failure(id: Value, error: RpcError) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error })
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

/// Handle one decoded JSON-RPC frame.
pub async fn handle_message(state: &McpServerState, message: Value) -> Option<Value> {
    let Value::Object(frame) = message else {
        return Some(failure(
            Value::Null,
            RpcError::invalid_request("Request must be a JSON object"),
        ));
    };

    let id = frame.get("id").cloned();
    let Some(method) = frame.get("method").and_then(Value::as_str) else {
        // Responses from the client carry no method and need no reply.
        if id.is_some() && (frame.contains_key("result") || frame.contains_key("error")) {
            return None;
        }
        return Some(failure(
            id.unwrap_or(Value::Null),
            RpcError::invalid_request("Missing method"),
        ));
    };

    if frame.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Some(failure(
            id.unwrap_or(Value::Null),
            RpcError::invalid_request("jsonrpc must be \"2.0\""),
        ));
    }

    let Some(id) = id else {
        debug!(method, "notification received");
        return None;
    };

    let params = frame.get("params").cloned().unwrap_or(Value::Null);
    let request_id = RequestId::generate();
    let span = info_span!("rpc", method, request_id = %request_id);

    let outcome = dispatch(state, method, params, request_id)
        .instrument(span)
        .await;
    Some(match outcome {
        Ok(result) => success(id, result),
        Err(error) => {
            warn!(method, code = error.code, message = %error.message, "rpc error");
            failure(id, error)
        }
    })
}

async fn dispatch(
    state: &McpServerState,
    method: &str,
    params: Value,
    request_id: RequestId,
) -> Result<Value, RpcError> {
    match method {
        "initialize" => Ok(initialize_result()),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": state.tools() })),
        "tools/call" => call_tool(state, parse_params(params)?, request_id).await,
        "resources/list" => Ok(json!({ "resources": state.resources() })),
        "resources/templates/list" => {
            Ok(json!({ "resourceTemplates": state.resource_templates() }))
        }
        "resources/read" => read_resource(state, parse_params(params)?, request_id).await,
        other => Err(RpcError::method_not_found(other)),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params)
        .map_err(|err| RpcError::invalid_params(format!("Invalid params: {err}")))
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false }
        }
    })
}

async fn call_tool(
    state: &McpServerState,
    params: CallToolParams,
    request_id: RequestId,
) -> Result<Value, RpcError> {
    let arguments = params.arguments.unwrap_or_else(|| json!({}));
    let outcome = match params.name.as_str() {
        ROUTE_TOOL => RouteTool::execute(state, arguments, request_id).await,
        ISOCHRONE_TOOL => IsochroneTool::execute(state, arguments, request_id).await,
        other => return Err(RpcError::invalid_params(format!("Unknown tool: {other}"))),
    };
    Ok(tool_result(outcome))
}

/// Wrap a tool outcome in the MCP `CallToolResult` shape.
pub fn tool_result(outcome: Result<CachedCollection, StandardError>) -> Value {
    let (body, is_error) = match outcome {
        Ok(collection) => match serde_json::to_value(&*collection) {
            Ok(value) => (value, false),
            Err(err) => (
                error_body(&StandardError::internal(format!(
                    "failed to serialize tool result: {err}"
                ))),
                true,
            ),
        },
        Err(err) => (error_body(&err), true),
    };
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

fn error_body(err: &StandardError) -> Value {
    serde_json::to_value(err.to_response()).unwrap_or_else(|_| {
        json!({ "error": err.kind.as_str(), "code": err.code(), "message": err.message })
    })
}

async fn read_resource(
    state: &McpServerState,
    params: ReadResourceParams,
    request_id: RequestId,
) -> Result<Value, RpcError> {
    let uri = params.uri;
    let contents = if uri == HEALTH_URI {
        ResourceContents::json(&uri, &HealthResource::read(state, request_id).await)
    } else if uri == METRICS_URI {
        ResourceContents::json(&uri, &MetricsResource::read(state, &request_id))
    } else if uri.starts_with(TILE_SCHEME) {
        match TileResource::read(state, &uri, request_id).await {
            Ok(contents) => contents,
            Err(err) => ResourceContents::json(&uri, &error_body(&err)),
        }
    } else {
        return Err(RpcError::invalid_params(format!("Unknown resource: {uri}")));
    };
    Ok(json!({ "contents": [contents] }))
}
