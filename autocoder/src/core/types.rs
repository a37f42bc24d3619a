//! Shared deterministic types for the pipeline core.
//!
//! These types define the contracts between stages. They hold text values
//! only and never touch storage or the model service.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::classifier::route_task;

/// Exact critique response meaning "the design already covers the goal".
pub const NO_CHANGES_SENTINEL: &str = "NO_CHANGES_NEEDED";

/// Pipeline stage, used in logs, error contexts and the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Drafting,
    Critiquing,
    Merging,
    Decomposing,
    Coding,
    Improving,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Drafting => "drafting",
            Stage::Critiquing => "critiquing",
            Stage::Merging => "merging",
            Stage::Decomposing => "decomposing",
            Stage::Coding => "coding",
            Stage::Improving => "improving",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which synthesis prompt a task is sent through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskRoute {
    Class,
    Function,
}

impl fmt::Display for TaskRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRoute::Class => f.write_str("class"),
            TaskRoute::Function => f.write_str("function"),
        }
    }
}

/// One atomic unit of work extracted from a design.
///
/// The variant is decided once, at parse time, by [`route_task`]. The
/// original mapping is kept so prompts can forward it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDescriptor {
    Class(ClassTask),
    Function(FunctionTask),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassTask {
    pub name: Option<String>,
    pub attributes: Vec<String>,
    pub methods: Vec<String>,
    pub description: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionTask {
    pub description: String,
    pub fields: Map<String, Value>,
}

impl TaskDescriptor {
    /// Build a descriptor from a parsed mapping, applying the routing rule.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let description = fields
            .get("description")
            .map(display_value)
            .unwrap_or_default();
        match route_task(&fields) {
            TaskRoute::Class => TaskDescriptor::Class(ClassTask {
                name: class_name(&fields),
                attributes: list_entries(fields.get("attributes")),
                methods: list_entries(fields.get("methods")),
                description,
                fields,
            }),
            TaskRoute::Function => TaskDescriptor::Function(FunctionTask {
                description,
                fields,
            }),
        }
    }

    pub fn route(&self) -> TaskRoute {
        match self {
            TaskDescriptor::Class(_) => TaskRoute::Class,
            TaskDescriptor::Function(_) => TaskRoute::Function,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            TaskDescriptor::Class(task) => &task.description,
            TaskDescriptor::Function(task) => &task.description,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            TaskDescriptor::Class(task) => &task.fields,
            TaskDescriptor::Function(task) => &task.fields,
        }
    }

    /// The mapping as the model emitted it, key order preserved.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(self.fields())
            .unwrap_or_else(|_| self.description().to_string())
    }
}

fn class_name(fields: &Map<String, Value>) -> Option<String> {
    ["class", "class_name", "name"]
        .iter()
        .filter_map(|key| fields.get(*key))
        .find_map(|value| value.as_str().map(str::to_string))
}

/// Flatten an `attributes`/`methods` entry into one line per member.
fn list_entries(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(display_value).collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| format!("{key}: {}", display_value(value)))
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![display_value(other)],
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Result of one critique round.
#[derive(Debug, Clone, PartialEq)]
pub enum Critique {
    NoChangesNeeded,
    SuggestedTasks(Vec<TaskDescriptor>),
}

impl Critique {
    pub fn is_approval(&self) -> bool {
        matches!(self, Critique::NoChangesNeeded)
    }

    /// Text embedded into the merge prompt.
    pub fn render(&self) -> String {
        match self {
            Critique::NoChangesNeeded => NO_CHANGES_SENTINEL.to_string(),
            Critique::SuggestedTasks(tasks) => {
                let items: Vec<Value> = tasks
                    .iter()
                    .map(|task| Value::Object(task.fields().clone()))
                    .collect();
                serde_json::to_string_pretty(&items).unwrap_or_default()
            }
        }
    }
}

/// Accumulating source text for the target program.
///
/// Only the task coder appends to it. Self-improvement never edits a
/// codebase in place; it produces [`CodeVersion`]s instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codebase {
    text: String,
}

impl Codebase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Append one synthesized unit followed by a blank line.
    pub(crate) fn append(&mut self, unit: &str) {
        self.text.push_str(unit);
        self.text.push_str("\n\n");
    }
}

impl From<String> for Codebase {
    fn from(text: String) -> Self {
        Self { text }
    }
}

/// Immutable numbered snapshot produced by one self-improvement round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeVersion {
    pub index: u32,
    pub code: String,
}
