use crate::errors::{ToolError, ToolErrorKind};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    RemoteFailure = -32000,
    RequestTimeout = -32001,
    Unauthorized = -32002,
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Renders a tool failure as a multi-line message the calling agent can read.
    pub fn from_tool_error(tool: &str, error: &ToolError) -> Self {
        let mut lines = vec![
            "ApiBridgeError".to_string(),
            format!("tool: {}", tool),
            format!("kind: {:?}", error.kind).to_lowercase(),
            format!("code: {}", error.code),
            format!("retryable: {}", error.retryable),
            format!("message: {}", error.message),
        ];
        if let Some(status) = error.status {
            lines.push(format!("status: {}", status));
        }
        for field in &error.fields {
            lines.push(format!("field: {}", field));
        }
        if let Some(hint) = &error.hint {
            lines.push(format!("hint: {}", hint));
        }

        let code = match error.kind {
            ToolErrorKind::Validation => ErrorCode::InvalidParams,
            ToolErrorKind::NotFound => ErrorCode::MethodNotFound,
            ToolErrorKind::Authentication => ErrorCode::Unauthorized,
            ToolErrorKind::Transport if error.code == "TIMEOUT" => ErrorCode::RequestTimeout,
            ToolErrorKind::Transport | ToolErrorKind::RemoteApi => ErrorCode::RemoteFailure,
            _ => ErrorCode::InternalError,
        };
        Self {
            code,
            message: lines.join("\n"),
            data: serde_json::to_value(error).ok(),
        }
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for McpError {}
