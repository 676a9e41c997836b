use crate::errors::McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const VERSION: &str = "2.0";

/// Inbound JSON-RPC message; `id` is absent on notifications.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(JsonRpcError),
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: VERSION,
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn failure(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: VERSION,
            id,
            outcome: Outcome::Error(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    pub fn from_error(id: Value, error: McpError) -> Self {
        Self {
            jsonrpc: VERSION,
            id,
            outcome: Outcome::Error(JsonRpcError {
                code: error.code.as_i32(),
                message: error.message,
                data: error.data,
            }),
        }
    }
}
