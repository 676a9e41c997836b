use crate::managers::engine::ExecutionEngine;
use serde_json::Value;

/// `tools/list` result: every loaded tool, in descriptor order.
pub fn tools_list_result(engine: &ExecutionEngine) -> Value {
    serde_json::json!({ "tools": engine.list_tools() })
}
