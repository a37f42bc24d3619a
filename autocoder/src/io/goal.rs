//! Goal text assembly and namespace validation.
//!
//! A goal comes from the command line or a file, optionally followed by
//! attached files (for example the generator's own sources, when asking it
//! to improve itself).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

/// Where the goal text comes from.
#[derive(Debug, Clone, Default)]
pub struct GoalSource {
    pub text: Option<String>,
    pub file: Option<PathBuf>,
    pub attachments: Vec<PathBuf>,
}

/// Build the goal text: inline text or file contents, then each attachment
/// under a header naming it.
pub fn assemble_goal(source: &GoalSource) -> Result<String> {
    let mut goal = match (&source.text, &source.file) {
        (Some(_), Some(_)) => return Err(anyhow!("pass either a goal or a goal file, not both")),
        (Some(text), None) => text.trim().to_string(),
        (None, Some(path)) => read_text(path)?.trim().to_string(),
        (None, None) => return Err(anyhow!("a goal or a goal file is required")),
    };
    if goal.is_empty() {
        return Err(anyhow!("goal must not be empty"));
    }

    for path in &source.attachments {
        let contents = read_text(path)?;
        goal.push_str(&format!(
            "\n\n### Attached file: {}\n```\n{}\n```",
            path.display(),
            contents.trim_end()
        ));
    }
    Ok(goal)
}

/// Validate that a project or folder name is a single safe path component.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("{kind} must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(anyhow!("{kind} must not be '.' or '..'"));
    }
    if name
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("{kind} must be [A-Za-z0-9._-] only (got '{name}')"));
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_goal_is_trimmed() {
        let goal = assemble_goal(&GoalSource {
            text: Some("  write a function that adds two numbers\n".to_string()),
            ..GoalSource::default()
        })
        .expect("goal");
        assert_eq!(goal, "write a function that adds two numbers");
    }

    #[test]
    fn attachments_follow_the_goal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let goal_path = temp.path().join("goal.md");
        let source_path = temp.path().join("utils.py");
        fs::write(&goal_path, "Improve this generator.\n").expect("write goal");
        fs::write(&source_path, "def chat(prompt):\n    pass\n").expect("write source");

        let goal = assemble_goal(&GoalSource {
            text: None,
            file: Some(goal_path),
            attachments: vec![source_path.clone()],
        })
        .expect("goal");

        assert!(goal.starts_with("Improve this generator.\n\n### Attached file: "));
        assert!(goal.contains(&source_path.display().to_string()));
        assert!(goal.ends_with("```\ndef chat(prompt):\n    pass\n```"));
    }

    #[test]
    fn goal_sources_are_exclusive_and_required() {
        assert!(assemble_goal(&GoalSource::default()).is_err());
        let both = GoalSource {
            text: Some("a".to_string()),
            file: Some(PathBuf::from("b")),
            attachments: Vec::new(),
        };
        assert!(assemble_goal(&both).is_err());
        let blank = GoalSource {
            text: Some("   ".to_string()),
            ..GoalSource::default()
        };
        assert!(assemble_goal(&blank).is_err());
    }

    #[test]
    fn names_must_be_single_components() {
        assert!(validate_name("project", "space_invaders").is_ok());
        assert!(validate_name("project", "").is_err());
        assert!(validate_name("project", "..").is_err());
        assert!(validate_name("folder", "a/b").is_err());
    }
}
