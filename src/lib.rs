//! MCP server for Materialize.
//!
//! At startup every user index in the active cluster, schema, and database
//! becomes a lookup, published both as a tool (`Lookup <view>`) and as a
//! resource template (`materialize://<view>/{key}/...`), served over
//! JSON-RPC 2.0 stdio to any MCP-aware agent.

pub mod binder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod rows;
pub mod schema;
pub mod server;

use crate::catalog::fetch_indexes;
use crate::config::ServerConfig;
use crate::error::CatalogError;
use crate::registry::Registry;

/// Read the catalog and register every index. Nothing is served until this
/// returns, and a catalog failure leaves no partial registry behind.
pub async fn build_registry(config: &ServerConfig) -> Result<Registry, CatalogError> {
    let descriptors = fetch_indexes(&config.dsn).await?;
    Ok(Registry::from_descriptors(descriptors, &config.dsn))
}
