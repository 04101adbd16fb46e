//! mcp-memento server entry point.
//!
//! Boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use memento_client::ArchiveService;
use memento_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let cache = CacheDb::open(&config.db_path).await?;
    let service = ArchiveService::from_config(&config, cache)?;

    tracing::info!(
        cdx = %config.cdx_server,
        storage = %config.webhdfs_prefix,
        cache = %config.db_path.display(),
        "Starting mcp-memento server on stdio transport"
    );

    let handler = handler::McpMementoServer::new(service);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
