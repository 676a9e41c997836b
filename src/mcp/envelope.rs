use crate::errors::ToolError;
use crate::managers::normalize::{NormalizedResponse, ResponseBody};
use serde_json::Value;

fn text_content(text: String) -> Value {
    serde_json::json!({ "type": "text", "text": text })
}

/// `tools/call` result for a successful invocation.
pub fn success_envelope(response: &NormalizedResponse) -> Value {
    let text = match &response.body {
        ResponseBody::Json { value } => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        ResponseBody::Text { text } => text.clone(),
        ResponseBody::Empty => format!("HTTP {} (no content)", response.status),
        ResponseBody::Binary { bytes, .. } => format!(
            "Binary content: {} bytes ({}), base64 in structuredContent.body",
            bytes,
            response.content_type.as_deref().unwrap_or("unknown type")
        ),
    };
    serde_json::json!({
        "content": [text_content(text)],
        "structuredContent": response.to_value(),
        "isError": false,
    })
}

/// Pagination cap hit: the accumulated pages are returned, flagged as an error.
pub fn partial_envelope(error: &ToolError) -> Value {
    let partial = error.partial_result().cloned().unwrap_or(Value::Null);
    let mut lines = vec![error.message.clone()];
    if let Some(hint) = &error.hint {
        lines.push(format!("hint: {}", hint));
    }
    lines.push(serde_json::to_string_pretty(&partial).unwrap_or_else(|_| partial.to_string()));
    let mut summary = serde_json::to_value(error).unwrap_or(Value::Null);
    if let Some(details) = summary.get_mut("details").and_then(Value::as_object_mut) {
        details.remove("partial");
    }
    serde_json::json!({
        "content": [text_content(lines.join("\n"))],
        "structuredContent": {
            "error": summary,
            "partial": partial,
        },
        "isError": true,
    })
}
