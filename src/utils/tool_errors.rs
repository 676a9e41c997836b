use crate::errors::ToolError;
use crate::utils::suggest::suggest;

/// NotFound error for an unknown tool, with did-you-mean hints.
pub fn unknown_tool_error(tool: &str, known_tools: &[String]) -> ToolError {
    let suggestions = suggest(tool, known_tools, 5);
    let mut err = ToolError::not_found(format!("Unknown tool: {}", tool));
    if !suggestions.is_empty() {
        err = err.with_hint(format!("Did you mean: {}?", suggestions.join(", ")));
    } else if !known_tools.is_empty() {
        err = err.with_hint("Call tools/list to see the available tools.");
    }
    err.with_details(serde_json::json!({
        "tool": tool,
        "did_you_mean": suggestions,
        "known_tool_count": known_tools.len(),
    }))
}
