pub mod encoding;
pub mod env;
pub mod json_path;
pub mod redact;
pub mod suggest;
pub mod text;
pub mod tool_errors;
