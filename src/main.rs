use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mcp_materialize_server::build_registry;
use mcp_materialize_server::config::ServerConfig;
use mcp_materialize_server::server::McpServer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = ServerConfig::parse();

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout carries the protocol
        .init();

    let registry = match build_registry(&config).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "Cannot read index catalog");
            std::process::exit(1);
        }
    };

    info!(
        tools = registry.tool_names().len(),
        resources = registry.uri_templates().len(),
        "Serving on stdio"
    );

    let mut server = McpServer::new(registry);
    if let Err(e) = server.run().await {
        error!(error = %e, "Fatal server error");
        std::process::exit(1);
    }
}
