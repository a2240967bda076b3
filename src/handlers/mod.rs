pub mod call_tool;
pub mod read_resource;

use tracing::info;

use crate::protocol::{
    InitializeParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ReadResourceParams,
    ToolCallParams,
};
use crate::registry::Registry;

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Dispatch a JSON-RPC request to the appropriate handler.
///
/// Returns `None` for notifications (no response required).
pub async fn dispatch(req: &JsonRpcRequest, registry: &Registry) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => {
            if let Some(Ok(init)) = req
                .params
                .clone()
                .map(serde_json::from_value::<InitializeParams>)
            {
                let client = init.client_info.and_then(|c| c.name).unwrap_or_default();
                info!(
                    client = %client,
                    protocol = init.protocol_version.as_deref().unwrap_or("unspecified"),
                    "Client connected"
                );
            }
            let result = serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": {}
                },
                "serverInfo": {
                    "name": "Materialize MCP Server",
                    "version": env!("CARGO_PKG_VERSION")
                }
            });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "notifications/initialized" => None,

        "ping" => Some(JsonRpcResponse::success(req.id.clone(), serde_json::json!({}))),

        "tools/list" => Some(JsonRpcResponse::success(req.id.clone(), registry.tools_json())),

        "tools/call" => {
            let params: ToolCallParams = match parse_params(req, "tools/call") {
                Ok(p) => p,
                Err(e) => return Some(JsonRpcResponse::error(req.id.clone(), e)),
            };

            let tool_result = call_tool::handle(params, registry).await;
            let result_json = match serde_json::to_value(&tool_result) {
                Ok(v) => v,
                Err(e) => {
                    return Some(JsonRpcResponse::error(
                        req.id.clone(),
                        JsonRpcError::internal_error(e.to_string()),
                    ));
                }
            };
            Some(JsonRpcResponse::success(req.id.clone(), result_json))
        }

        // Every lookup needs key values, so nothing is listable as a
        // concrete resource; clients discover templates instead.
        "resources/list" => Some(JsonRpcResponse::success(
            req.id.clone(),
            serde_json::json!({ "resources": [] }),
        )),

        "resources/templates/list" => Some(JsonRpcResponse::success(
            req.id.clone(),
            registry.resource_templates_json(),
        )),

        "resources/read" => {
            let params: ReadResourceParams = match parse_params(req, "resources/read") {
                Ok(p) => p,
                Err(e) => return Some(JsonRpcResponse::error(req.id.clone(), e)),
            };

            Some(match read_resource::handle(params, registry).await {
                Ok(result) => JsonRpcResponse::success(req.id.clone(), result),
                Err(e) => JsonRpcResponse::error(req.id.clone(), e),
            })
        }

        _ => Some(JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::method_not_found(&req.method),
        )),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
    method: &str,
) -> Result<T, JsonRpcError> {
    match &req.params {
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid {method} params: {e}"))),
        None => Err(JsonRpcError::invalid_params(format!(
            "Missing params for {method}"
        ))),
    }
}
