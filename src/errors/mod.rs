mod load_error;
mod mcp_error;
mod tool_error;

pub use load_error::LoadError;
pub use mcp_error::{ErrorCode, McpError};
pub use tool_error::{FieldError, ToolError, ToolErrorKind};
