//! MCP (Model Context Protocol) server for a Valhalla routing engine
//!
//! This crate provides a stdio-based MCP server that exposes routing and
//! isochrone generation as tools, and engine health, adapter metrics and
//! vector tiles as resources.
//!
//! # Architecture
//!
//! - `server`: shared state (engine handle, caches, metrics) and descriptors
//! - `tools`: the `route` and `isochrone` orchestrators
//! - `resources`: the health, metrics and tile resources
//! - `rpc`: JSON-RPC 2.0 method dispatch
//! - `transport`: newline-delimited stdio loop
//! - `config` and `logging`: startup configuration
//!
//! # Transport
//!
//! The server communicates via stdio using JSON-RPC 2.0 message format
//! as specified by the MCP specification. All logging is redirected to
//! stderr to prevent stdout protocol corruption.

pub mod config;
pub mod invocation;
pub mod logging;
pub mod request;
pub mod resources;
pub mod rpc;
pub mod server;
pub mod tools;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use request::RequestId;
pub use rpc::handle_message;
pub use server::{McpServerState, ServerSettings};
pub use transport::{run_server_loop, StdioTransport};
