use serde_json::Value;
use tracing::{info, warn};

use crate::protocol::{McpErrorCode, McpErrorResponse, ToolCallParams, ToolResult};
use crate::registry::Registry;

/// Handle a `tools/call` for a registered lookup.
///
/// Failures become `isError` results; the JSON-RPC call itself succeeds.
pub async fn handle(params: ToolCallParams, registry: &Registry) -> ToolResult {
    let Some(operation) = registry.tool(&params.name) else {
        return McpErrorResponse::new(
            McpErrorCode::UnknownTool,
            format!("Unknown tool: {}", params.name),
        )
        .into();
    };

    let arguments = params.arguments.unwrap_or(Value::Null);
    match operation.call(&arguments).await {
        Ok(text) => {
            info!(tool = %params.name, "Lookup succeeded");
            ToolResult::text(text)
        }
        Err(e) => {
            warn!(tool = %params.name, error = %e, "Lookup failed");
            McpErrorResponse::from(&e).into()
        }
    }
}
