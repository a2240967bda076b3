use serde_json::Value;
use tracing::{info, warn};

use crate::protocol::{
    JsonRpcError, McpErrorCode, McpErrorResponse, ReadResourceParams, ResourceContents,
};
use crate::registry::Registry;

/// Handle a `resources/read` against the registered URI templates.
pub async fn handle(params: ReadResourceParams, registry: &Registry) -> Result<Value, JsonRpcError> {
    let Some(operation) = registry.resource_for_uri(&params.uri) else {
        return Err(McpErrorResponse::new(
            McpErrorCode::ResourceNotFound,
            format!("No resource template matches {}", params.uri),
        )
        .into());
    };

    match operation.read(&params.uri).await {
        Ok(text) => {
            info!(uri = %params.uri, "Resource read succeeded");
            serde_json::to_value(ResourceContents::json(params.uri, text))
                .map_err(|e| JsonRpcError::internal_error(e.to_string()))
        }
        Err(e) => {
            warn!(uri = %params.uri, error = %e, "Resource read failed");
            Err(McpErrorResponse::from(&e).into())
        }
    }
}
