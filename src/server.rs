use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::ServerError;
use crate::handlers;
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::registry::Registry;

/// Maximum bytes per JSON-RPC message (1 MiB).
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// MCP server that communicates over stdio using newline-delimited JSON-RPC 2.0.
///
/// Requests after the handshake run on their own tasks and may complete
/// out of order; a single writer task serializes the responses.
pub struct McpServer {
    registry: Arc<Registry>,
    initialized: bool,
}

impl McpServer {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            initialized: false,
        }
    }

    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until `input` reaches EOF. Requests still running at EOF are
    /// allowed to finish so their responses are flushed.
    pub async fn serve<R, W>(&mut self, input: R, output: W) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_responses(output, rx));
        let mut in_flight = JoinSet::new();

        let mut reader = BufReader::new(input);
        let mut raw = Vec::new();

        loop {
            raw.clear();
            let n = reader.read_until(b'\n', &mut raw).await?;
            if n == 0 {
                break;
            }

            if n > MAX_MESSAGE_BYTES {
                warn!(bytes = n, limit = MAX_MESSAGE_BYTES, "Message too large");
                send(&tx, JsonRpcResponse::error(None, JsonRpcError::parse_error()));
                continue;
            }

            let trimmed = match std::str::from_utf8(&raw) {
                Ok(s) => s.trim(),
                Err(_) => {
                    send(&tx, JsonRpcResponse::error(None, JsonRpcError::parse_error()));
                    continue;
                }
            };

            if trimmed.is_empty() {
                continue;
            }

            let req: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "Parse error");
                    send(&tx, JsonRpcResponse::error(None, JsonRpcError::parse_error()));
                    continue;
                }
            };

            if req.jsonrpc != "2.0" {
                send(
                    &tx,
                    JsonRpcResponse::error(req.id.clone(), JsonRpcError::invalid_request()),
                );
                continue;
            }

            // Initialization gate: only `initialize` is allowed before handshake completes
            if !self.initialized && req.method != "initialize" {
                if req.id.is_none() {
                    continue;
                }
                send(
                    &tx,
                    JsonRpcResponse::error(
                        req.id.clone(),
                        JsonRpcError::invalid_request_with("Server not initialized"),
                    ),
                );
                continue;
            }

            if req.method == "initialize" {
                if let Some(resp) = handlers::dispatch(&req, &self.registry).await {
                    send(&tx, resp);
                }
                self.initialized = true;
                continue;
            }

            let registry = Arc::clone(&self.registry);
            let tx = tx.clone();
            in_flight.spawn(async move {
                if let Some(resp) = handlers::dispatch(&req, &registry).await {
                    send(&tx, resp);
                }
            });

            while let Some(done) = in_flight.try_join_next() {
                if let Err(e) = done {
                    error!(error = %e, "Request task failed");
                }
            }
        }

        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "Request task failed");
            }
        }

        drop(tx);
        writer.await??;
        Ok(())
    }
}

fn send(tx: &mpsc::UnboundedSender<JsonRpcResponse>, resp: JsonRpcResponse) {
    if tx.send(resp).is_err() {
        debug!("Response dropped: writer has stopped");
    }
}

async fn write_responses<W>(
    mut output: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(resp) = rx.recv().await {
        let out = serde_json::to_string(&resp)?;
        output.write_all(out.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}
