//! Prompt rendering for every model call the pipeline makes.
//!
//! Wording lives in the markdown templates under `prompts/`; this module only
//! decides which values reach which template.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::{Critique, NO_CHANGES_SENTINEL, TaskDescriptor};

const DRAFT_TEMPLATE: &str = include_str!("prompts/draft.md");
const CRITIQUE_TEMPLATE: &str = include_str!("prompts/critique.md");
const MERGE_TEMPLATE: &str = include_str!("prompts/merge.md");
const CLASS_TEMPLATE: &str = include_str!("prompts/class.md");
const FUNCTION_TEMPLATE: &str = include_str!("prompts/function.md");
const IMPROVE_TEMPLATE: &str = include_str!("prompts/improve.md");

const EMPTY_CODEBASE: &str = "(no code yet)";

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    language: String,
}

impl PromptEngine {
    /// Create an engine whose prompts target `language`.
    pub fn new(language: impl Into<String>) -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("draft", DRAFT_TEMPLATE),
            ("critique", CRITIQUE_TEMPLATE),
            ("merge", MERGE_TEMPLATE),
            ("class", CLASS_TEMPLATE),
            ("function", FUNCTION_TEMPLATE),
            ("improve", IMPROVE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt templates should be valid");
        }
        Self {
            env,
            language: language.into(),
        }
    }

    pub fn draft(&self, goal: &str) -> Result<String> {
        let rendered = self.env.get_template("draft")?.render(context! {
            language => self.language.as_str(),
            goal => goal.trim(),
        })?;
        Ok(rendered)
    }

    pub fn critique(&self, goal: &str, design: &str) -> Result<String> {
        let rendered = self.env.get_template("critique")?.render(context! {
            sentinel => NO_CHANGES_SENTINEL,
            goal => goal.trim(),
            design => design.trim(),
        })?;
        Ok(rendered)
    }

    pub fn merge(&self, design: &str, critique: &Critique) -> Result<String> {
        let rendered = self.env.get_template("merge")?.render(context! {
            design => design.trim(),
            critique => critique.render(),
        })?;
        Ok(rendered)
    }

    /// Synthesis prompt for `task`, chosen by its route.
    pub fn synthesize(&self, codebase: &str, task: &TaskDescriptor) -> Result<String> {
        let codebase = non_empty_codebase(codebase);
        let rendered = match task {
            TaskDescriptor::Class(class) => self.env.get_template("class")?.render(context! {
                language => self.language.as_str(),
                class_name => class.name.as_deref(),
                attributes => &class.attributes,
                methods => &class.methods,
                codebase => codebase,
                task => task.render(),
            })?,
            TaskDescriptor::Function(_) => self.env.get_template("function")?.render(context! {
                language => self.language.as_str(),
                codebase => codebase,
                task => task.render(),
            })?,
        };
        Ok(rendered)
    }

    pub fn improve(&self, goal: &str, codebase: &str) -> Result<String> {
        let rendered = self.env.get_template("improve")?.render(context! {
            language => self.language.as_str(),
            goal => goal.trim(),
            codebase => non_empty_codebase(codebase),
        })?;
        Ok(rendered)
    }
}

fn non_empty_codebase(codebase: &str) -> &str {
    if codebase.trim().is_empty() {
        EMPTY_CODEBASE
    } else {
        codebase.trim_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;
    use serde_json::json;

    /// Contract first, then the material it refers to.
    #[test]
    fn critique_sections_are_ordered() {
        let engine = PromptEngine::new("Python");
        let prompt = engine
            .critique("build a calculator", "[{'description': 'add'}]")
            .expect("render");

        let contract = prompt.find("### Critique Contract").expect("contract");
        let goal = prompt.find("### Goal").expect("goal");
        let design = prompt.find("### Current Design").expect("design");
        assert!(contract < goal && goal < design);
        assert!(prompt.contains(NO_CHANGES_SENTINEL));
        assert!(prompt.contains("build a calculator"));
    }

    #[test]
    fn class_task_uses_class_template() {
        let engine = PromptEngine::new("Rust");
        let prompt = engine
            .synthesize(
                "fn existing() {}\n\n",
                &task(json!({"class": "Queue", "description": "a class-based queue"})),
            )
            .expect("render");
        assert!(prompt.contains("### Class Contract"));
        assert!(prompt.contains("new Rust class named `Queue`"));
        assert!(prompt.contains("fn existing() {}"));
        assert!(prompt.contains("\"description\": \"a class-based queue\""));
        assert!(!prompt.contains("Required attributes:"));
        assert!(prompt.contains("implement all described logic.\n</contract>"));
    }

    #[test]
    fn class_members_are_listed_in_the_contract() {
        let engine = PromptEngine::new("Python");
        let prompt = engine
            .synthesize(
                "",
                &task(json!({
                    "class": "Spaceship",
                    "description": "The player ship",
                    "attributes": ["position: tuple", "lives: int"],
                    "methods": {"shoot": "fire a bullet"},
                })),
            )
            .expect("render");
        let contract_end = prompt.find("</contract>").expect("contract");
        let attributes = prompt
            .find("Required attributes:\n- position: tuple\n- lives: int")
            .expect("attributes");
        let methods = prompt
            .find("Required methods:\n- shoot: fire a bullet")
            .expect("methods");
        assert!(attributes < methods && methods < contract_end, "{prompt}");
    }

    #[test]
    fn function_task_uses_function_template() {
        let engine = PromptEngine::new("Python");
        let prompt = engine
            .synthesize("", &task(json!({"description": "sum two integers"})))
            .expect("render");
        assert!(prompt.contains("### Function Contract"));
        assert!(!prompt.contains("### Class Contract"));
        assert!(prompt.contains(EMPTY_CODEBASE));
    }

    #[test]
    fn merge_embeds_design_and_suggestions() {
        let engine = PromptEngine::new("Python");
        let critique =
            Critique::SuggestedTasks(vec![task(json!({"description": "persist high score"}))]);
        let prompt = engine.merge("[{'description': 'draw'}]", &critique).expect("render");
        assert!(prompt.contains("<design>\n[{'description': 'draw'}]\n</design>"));
        assert!(prompt.contains("persist high score"));
    }

    #[test]
    fn templates_use_xml_tags() {
        let engine = PromptEngine::new("Python");
        let draft = engine.draft("write a function that adds two numbers").expect("render");
        assert!(draft.contains("<contract>") && draft.contains("</contract>"));
        assert!(draft.contains("<goal>\nwrite a function that adds two numbers\n</goal>"));

        let improve = engine
            .improve("goal", "def add(a, b):\n    return a + b\n\n")
            .expect("render");
        assert!(improve.contains("<codebase>\ndef add(a, b):\n    return a + b\n</codebase>"));
    }
}
