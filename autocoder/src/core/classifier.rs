//! Deterministic routing of task descriptors to a synthesis prompt.

use serde_json::{Map, Value};

use crate::core::types::TaskRoute;

/// Route a parsed task mapping to `Class` or `Function` synthesis.
///
/// - `Class` if the mapping has a `class` key.
/// - `Class` if `description` is text containing the literal substring
///   `class` (case-sensitive), or is a nested mapping with a `class` key.
/// - `Function` otherwise.
pub fn route_task(fields: &Map<String, Value>) -> TaskRoute {
    if fields.contains_key("class") || describes_class(fields.get("description")) {
        TaskRoute::Class
    } else {
        TaskRoute::Function
    }
}

fn describes_class(description: Option<&Value>) -> bool {
    match description {
        Some(Value::String(text)) => text.contains("class"),
        Some(Value::Object(nested)) => nested.contains_key("class"),
        _ => false,
    }
}
