//! Turn free-text model completions into structured values.
//!
//! Task lists are recovered by an ordered chain of strategies, each a pure
//! `&str -> Result<Vec<TaskDescriptor>, String>`; the first success wins:
//!
//! 1. strip a code fence, parse the rest as a literal expression;
//! 2. strip a code fence, parse the rest as JSON;
//! 3. scan the raw text for an opening `[{` and parse the first list literal
//!    that starts there and yields tasks, ignoring surrounding prose.
//!
//! Exhausting the chain is an [`UnparseableResponseError`]; there is no
//! guessing beyond it.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::core::literal::{parse_literal, parse_literal_prefix};
use crate::core::types::{Critique, NO_CHANGES_SENTINEL, TaskDescriptor};
use crate::error::UnparseableResponseError;

type Strategy = fn(&str) -> Result<Vec<TaskDescriptor>, String>;

const STRATEGIES: [(&str, Strategy); 3] = [
    ("fenced literal", fenced_literal),
    ("fenced json", fenced_json),
    ("embedded list", embedded_list),
];

/// Where a list of mappings can begin: `[` followed by `{`.
static LIST_OPENING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*\{").expect("list opening pattern is valid"));

/// Parse a model completion into an ordered, non-empty task list.
pub fn parse_task_list(raw: &str) -> Result<Vec<TaskDescriptor>, UnparseableResponseError> {
    let mut reasons = Vec::with_capacity(STRATEGIES.len());
    for (name, strategy) in STRATEGIES {
        match strategy(raw) {
            Ok(tasks) => {
                debug!(strategy = name, tasks = tasks.len(), "parsed task list");
                return Ok(tasks);
            }
            Err(reason) => {
                debug!(strategy = name, %reason, "task list strategy failed");
                reasons.push(format!("{name}: {reason}"));
            }
        }
    }
    Err(UnparseableResponseError { reasons })
}

/// Parse a critique: the exact sentinel, or a list of suggested tasks.
pub fn parse_critique(raw: &str) -> Result<Critique, UnparseableResponseError> {
    if raw.trim() == NO_CHANGES_SENTINEL {
        return Ok(Critique::NoChangesNeeded);
    }
    parse_task_list(raw).map(Critique::SuggestedTasks)
}

/// Strip leading language-tagged fences and their closing fences.
///
/// Nested fences are peeled until the body no longer opens with one, so
/// reparsing the result is a no-op. Input without a leading fence is returned
/// unchanged. Never fails.
pub fn parse_code_block(raw: &str) -> String {
    let Some(mut body) = strip_fence(raw) else {
        return raw.to_string();
    };
    while let Some(inner) = strip_fence(body) {
        body = inner;
    }
    body.to_string()
}

fn fenced_literal(raw: &str) -> Result<Vec<TaskDescriptor>, String> {
    let body = strip_fence(raw).unwrap_or(raw);
    let value = parse_literal(body.trim()).map_err(|err| err.to_string())?;
    into_tasks(value)
}

fn fenced_json(raw: &str) -> Result<Vec<TaskDescriptor>, String> {
    let body = strip_fence(raw).unwrap_or(raw);
    let value: Value = serde_json::from_str(body.trim()).map_err(|err| err.to_string())?;
    into_tasks(value)
}

fn embedded_list(raw: &str) -> Result<Vec<TaskDescriptor>, String> {
    let mut last_error = None;
    for opening in LIST_OPENING_RE.find_iter(raw) {
        let attempt = parse_literal_prefix(&raw[opening.start()..])
            .map_err(|err| err.to_string())
            .and_then(|(value, _)| into_tasks(value));
        match attempt {
            Ok(tasks) => return Ok(tasks),
            Err(reason) => last_error = Some(reason),
        }
    }
    Err(last_error.unwrap_or_else(|| "no bracket-delimited list in response".to_string()))
}

/// Require a non-empty list whose items are all mappings.
fn into_tasks(value: Value) -> Result<Vec<TaskDescriptor>, String> {
    let Value::Array(items) = value else {
        return Err("expected a list of mappings".to_string());
    };
    if items.is_empty() {
        return Err("task list is empty".to_string());
    }
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(TaskDescriptor::from_fields(fields)),
            other => Err(format!("item {index} is not a mapping: {other}")),
        })
        .collect()
}

/// Return the fenced body when the trimmed text opens with a code fence.
fn strip_fence(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix("```")?;
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '.' | '#')))
        .unwrap_or(rest.len());
    let after_tag = rest[tag_len..].trim_start_matches([' ', '\t']);
    let body = after_tag
        .strip_prefix("\r\n")
        .or_else(|| after_tag.strip_prefix('\n'))
        .unwrap_or(after_tag)
        .trim_end();
    Some(body.strip_suffix("```").unwrap_or(body).trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskRoute;

    fn descriptions(tasks: &[TaskDescriptor]) -> Vec<&str> {
        tasks.iter().map(TaskDescriptor::description).collect()
    }

    #[test]
    fn fenced_json_list_is_returned_in_order() {
        let tasks = parse_task_list("```json\n[{\"description\": \"add two numbers\"}]\n```")
            .expect("parse");
        assert_eq!(descriptions(&tasks), vec!["add two numbers"]);
        assert_eq!(tasks[0].route(), TaskRoute::Function);
    }

    #[test]
    fn python_literal_list_keeps_source_order() {
        let raw = "```python\n[\n  {'class': 'Board', 'description': 'grid'},\n  {'description': 'place a piece'},\n  {'description': 'run the game'},\n]\n```";
        let tasks = parse_task_list(raw).expect("parse");
        assert_eq!(
            descriptions(&tasks),
            vec!["grid", "place a piece", "run the game"]
        );
        assert_eq!(tasks[0].route(), TaskRoute::Class);
        assert_eq!(tasks[1].route(), TaskRoute::Function);
    }

    #[test]
    fn embedded_list_is_extracted_from_prose() {
        let tasks = parse_task_list(
            "Sure! Here is the plan: [{'description': 'class Foo'}] Hope that helps!",
        )
        .expect("parse");
        assert_eq!(descriptions(&tasks), vec!["class Foo"]);
        assert_eq!(tasks[0].route(), TaskRoute::Class);
    }

    #[test]
    fn json_escapes_are_decoded() {
        let tasks =
            parse_task_list("[{\"description\": \"caf\\u00e9 menu \\/ prices\"}]").expect("parse");
        assert_eq!(descriptions(&tasks), vec!["café menu / prices"]);
    }

    /// Surrogate-pair escapes are JSON-only, so the literal strategy must fail
    /// and the JSON strategy must pick the list up.
    #[test]
    fn surrogate_pair_escapes_fall_back_to_json() {
        let raw = "```json\n[{\"description\": \"smile \\ud83d\\ude00\"}]\n```";
        assert!(fenced_literal(raw).is_err());
        let tasks = fenced_json(raw).expect("json strategy");
        assert_eq!(descriptions(&tasks), vec!["smile \u{1f600}"]);

        let tasks = parse_task_list(raw).expect("parse");
        assert_eq!(descriptions(&tasks), vec!["smile \u{1f600}"]);
    }

    #[test]
    fn embedded_list_ignores_later_brackets() {
        let tasks = parse_task_list("Plan: [{'description': 'a'}] see [1]").expect("parse");
        assert_eq!(descriptions(&tasks), vec!["a"]);

        let tasks = parse_task_list("Notes [draft] then [{'description': 'b'}], done [2].")
            .expect("parse");
        assert_eq!(descriptions(&tasks), vec!["b"]);
    }

    #[test]
    fn embedded_list_skips_openings_that_do_not_parse() {
        let tasks = parse_task_list("Try [{oops}] or rather [{'description': 'c'}]!")
            .expect("parse");
        assert_eq!(descriptions(&tasks), vec!["c"]);
    }

    #[test]
    fn prose_without_a_list_is_unparseable() {
        let err = parse_task_list("I could not come up with a design for this.").unwrap_err();
        assert_eq!(err.reasons.len(), 3);
        assert!(err.reasons[2].starts_with("embedded list:"));
    }

    #[test]
    fn empty_list_is_not_a_task_list() {
        assert!(parse_task_list("[]").is_err());
    }

    #[test]
    fn list_of_strings_is_not_a_task_list() {
        let err = parse_task_list("['write add', 'write run']").unwrap_err();
        assert!(err.reasons[0].contains("not a mapping"), "{err}");
    }

    #[test]
    fn critique_sentinel_is_exact_match() {
        assert_eq!(
            parse_critique("  NO_CHANGES_NEEDED\n").expect("parse"),
            Critique::NoChangesNeeded
        );
        assert!(parse_critique("NO_CHANGES_NEEDED, but consider logging").is_err());
    }

    #[test]
    fn critique_with_tasks_is_suggestions() {
        let critique = parse_critique("[{'description': 'save the high score'}]").expect("parse");
        let Critique::SuggestedTasks(tasks) = critique else {
            panic!("expected suggestions");
        };
        assert_eq!(descriptions(&tasks), vec!["save the high score"]);
    }

    #[test]
    fn code_block_strips_language_fence() {
        let code = parse_code_block("```python\ndef add(a, b):\n    return a + b\n```");
        assert_eq!(code, "def add(a, b):\n    return a + b");
    }

    #[test]
    fn code_block_keeps_first_line_indentation() {
        let code = parse_code_block("```\n    def method(self):\n        pass\n```\n");
        assert_eq!(code, "    def method(self):\n        pass");
    }

    #[test]
    fn code_block_without_fence_is_identity() {
        let raw = "def add(a, b):\n    return a + b\n";
        assert_eq!(parse_code_block(raw), raw);
    }

    #[test]
    fn code_block_with_unclosed_fence_strips_opening_only() {
        assert_eq!(parse_code_block("```rust\nfn main() {}"), "fn main() {}");
    }

    #[test]
    fn code_block_peels_nested_fences() {
        let code =
            parse_code_block("```markdown\n```python\ndef add(a, b):\n    return a + b\n```\n```");
        assert_eq!(code, "def add(a, b):\n    return a + b");
    }

    #[test]
    fn code_block_reparse_is_noop() {
        for raw in [
            "```markdown\n```python\ndef add(a, b):\n    return a + b\n```\n```",
            "```python\nclass A:\n    pass\n```",
            "class A:\n    pass",
            "```\n\n```",
            "  ```js\nconsole.log(1)\n```  ",
        ] {
            let once = parse_code_block(raw);
            assert_eq!(parse_code_block(&once), once, "input {raw:?}");
        }
    }
}
