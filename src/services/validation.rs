use crate::constants::protocols::ALLOWED_HTTP;
use crate::errors::ToolError;
use serde_json::{Map, Value};

/// Argument and configuration checks shared by the engine and settings.
#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    /// Tool names: trimmed, non-empty, no whitespace or control characters inside.
    pub fn ensure_identifier(&self, value: &str, label: &str) -> Result<String, ToolError> {
        let name = value.trim();
        if name.is_empty() {
            return Err(ToolError::validation(format!("{} is empty", label)));
        }
        if let Some(bad) = name.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(ToolError::validation(format!(
                "{} contains an invalid character {:?}",
                label, bad
            )));
        }
        Ok(name.to_string())
    }

    /// Tool arguments: absent or null means no arguments.
    pub fn ensure_args_object(&self, value: Option<&Value>) -> Result<Map<String, Value>, ToolError> {
        match value {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(ToolError::validation("Tool arguments must be a JSON object")),
        }
    }

    /// Header values may not carry line breaks.
    pub fn ensure_header_value(&self, name: &str, value: &str) -> Result<(), ToolError> {
        if value.contains(['\r', '\n', '\0']) {
            return Err(ToolError::validation(format!(
                "Header {} must not contain line breaks",
                name
            )));
        }
        Ok(())
    }

    pub fn ensure_positive_int(&self, raw: &str, label: &str) -> Result<u64, ToolError> {
        let parsed = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ToolError::validation(format!("{} must be a positive integer", label)))?;
        if parsed == 0 {
            return Err(ToolError::validation(format!(
                "{} must be a positive integer",
                label
            )));
        }
        Ok(parsed)
    }

    pub fn ensure_http_url(&self, raw: &str, label: &str) -> Result<url::Url, ToolError> {
        let parsed = url::Url::parse(raw.trim())
            .map_err(|err| ToolError::validation(format!("{} is not a valid URL: {}", label, err)))?;
        let scheme = format!("{}:", parsed.scheme());
        if !ALLOWED_HTTP.contains(&scheme.as_str()) {
            return Err(ToolError::validation(format!(
                "{} must use http or https",
                label
            )));
        }
        Ok(parsed)
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}
