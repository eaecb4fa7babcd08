use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use valhalla_lib::ValhallaClient;
use valhalla_mcp::logging::init_logging;
use valhalla_mcp::{run_server_loop, Config, McpServerState, StdioTransport};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(&config.logging())?;

    info!(
        base_url = %config.base_url,
        timeout_secs = config.timeout_secs,
        "starting valhalla-mcp"
    );

    let client = ValhallaClient::new(config.base_url.clone(), config.timeout())
        .context("failed to build routing engine client")?;
    let state = Arc::new(McpServerState::new(Arc::new(client), &config.settings()));
    let sweepers = state.spawn_cache_sweepers(config.sweep_interval());

    let result = run_server_loop(StdioTransport::stdio(), Arc::clone(&state)).await;

    for sweeper in sweepers {
        sweeper.abort();
    }
    result.context("MCP server loop failed")
}
