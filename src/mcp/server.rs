use crate::app::App;
use crate::errors::{ErrorCode, McpError, ToolError, ToolErrorKind};
use crate::mcp::catalog::tools_list_result;
use crate::mcp::envelope::{partial_envelope, success_envelope};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::services::logger::Logger;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "apibridge";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct McpServer {
    app: Arc<App>,
    logger: Logger,
}

impl McpServer {
    pub fn new(app: App) -> Self {
        let logger = app.logger.child("mcp");
        Self {
            app: Arc::new(app),
            logger,
        }
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        tools_list_result(&self.app.engine)
    }

    async fn handle_tools_call(&self, name: &str, args: Option<&Value>) -> Result<Value, McpError> {
        match self.app.engine.execute_value(name, args).await {
            Ok(response) => Ok(success_envelope(&response)),
            Err(err) if err.kind == ToolErrorKind::PaginationLimitExceeded => {
                Ok(partial_envelope(&err))
            }
            Err(err) => Err(McpError::from_tool_error(name, &err)),
        }
    }

    /// Handles one inbound line; `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let parsed: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError.as_i32(),
                    "Parse error".to_string(),
                ))
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(parsed) {
            Ok(req) => req,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::InvalidRequest.as_i32(),
                    "Invalid request".to_string(),
                ))
            }
        };

        if request.is_notification() {
            self.logger.debug("Notification", Some(&serde_json::json!({ "method": request.method })));
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => {
                let name = request.param_str("name").unwrap_or("").trim();
                if name.is_empty() {
                    JsonRpcResponse::failure(
                        id,
                        ErrorCode::InvalidParams.as_i32(),
                        "Missing tool name".to_string(),
                    )
                } else {
                    match self
                        .handle_tools_call(name, request.params.get("arguments"))
                        .await
                    {
                        Ok(result) => JsonRpcResponse::success(id, result),
                        Err(err) => JsonRpcResponse::from_error(id, err),
                    }
                }
            }
            _ => JsonRpcResponse::failure(
                id,
                ErrorCode::MethodNotFound.as_i32(),
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    /// Reads newline-delimited JSON-RPC from stdin; calls run concurrently.
    pub async fn run_stdio(self) -> Result<(), ToolError> {
        let server = Arc::new(self);
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(tokio::io::stdout());
            while let Some(response) = rx.recv().await {
                let payload = serde_json::to_string(&response).unwrap_or_default();
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let mut reader = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = reader
            .next_line()
            .await
            .map_err(|err| ToolError::internal(err.to_string()))?
        {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                continue;
            }
            let server = server.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle_line(&trimmed).await {
                    let _ = tx.send(response);
                }
            });
        }

        server
            .logger
            .info("stdin closed, shutting down", Some(&server.logger.stats()));
        drop(tx);
        match writer_task.await {
            Ok(result) => result.map_err(ToolError::from),
            Err(err) => Err(ToolError::internal(format!("writer task failed: {}", err))),
        }
    }
}

pub async fn run_stdio() -> Result<(), ToolError> {
    let app = App::initialize()?;
    McpServer::new(app).run_stdio().await
}
