//! Pipeline configuration stored in `autocoder.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "autocoder.toml";

/// Pipeline configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub service: ServiceConfig,
    pub models: ModelsConfig,
    pub refine: RefineConfig,
    pub improve: ImproveConfig,
    pub pacing: PacingConfig,
    pub retry: RetryConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// System message sent with every call.
    pub system_context: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            system_context: "You are a helpful assistant for programming tasks.".to_string(),
        }
    }
}

/// Model identifier per stage, so cheap and strong tiers can be mixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelsConfig {
    pub draft: String,
    pub critique: String,
    pub merge: String,
    pub code: String,
    pub improve: String,
}

impl ModelsConfig {
    /// Same model for every stage.
    pub fn uniform(model: &str) -> Self {
        Self {
            draft: model.to_string(),
            critique: model.to_string(),
            merge: model.to_string(),
            code: model.to_string(),
            improve: model.to_string(),
        }
    }

    fn all(&self) -> [(&'static str, &str); 5] {
        [
            ("draft", self.draft.as_str()),
            ("critique", self.critique.as_str()),
            ("merge", self.merge.as_str()),
            ("code", self.code.as_str()),
            ("improve", self.improve.as_str()),
        ]
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self::uniform("gpt-4o")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefineConfig {
    /// Critique/merge rounds after drafting. Zero keeps the draft as is.
    pub iterations: u32,
    /// Skip the merge call in rounds whose critique approves the design.
    pub skip_merge_on_approval: bool,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            skip_merge_on_approval: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImproveConfig {
    pub rounds: u32,
    /// Stop early once a round returns its input unchanged.
    pub stop_when_unchanged: bool,
}

impl Default for ImproveConfig {
    fn default() -> Self {
        Self {
            rounds: 5,
            stop_when_unchanged: false,
        }
    }
}

/// Fixed pauses that keep the run under the service's rate limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PacingConfig {
    pub design_round_secs: u64,
    pub task_secs: u64,
    pub improve_round_secs: u64,
}

impl PacingConfig {
    pub fn none() -> Self {
        Self {
            design_round_secs: 0,
            task_secs: 0,
            improve_round_secs: 0,
        }
    }

    pub fn design_round(&self) -> Duration {
        Duration::from_secs(self.design_round_secs)
    }

    pub fn task(&self) -> Duration {
        Duration::from_secs(self.task_secs)
    }

    pub fn improve_round(&self) -> Duration {
        Duration::from_secs(self.improve_round_secs)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            design_round_secs: 10,
            task_secs: 20,
            improve_round_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory under which project folders are created.
    pub root: String,
    /// Extension for generated code files.
    pub code_extension: String,
    /// Language named in every synthesis prompt.
    pub target_language: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            code_extension: "py".to_string(),
            target_language: "Python".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.service.base_url.trim().is_empty() {
            return Err(anyhow!("service.base_url must be non-empty"));
        }
        if self.service.timeout_secs == 0 {
            return Err(anyhow!("service.timeout_secs must be > 0"));
        }
        for (stage, model) in self.models.all() {
            if model.trim().is_empty() {
                return Err(anyhow!("models.{stage} must be non-empty"));
            }
        }
        if self.improve.rounds == 0 {
            return Err(anyhow!("improve.rounds must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(anyhow!("retry.max_delay_ms must be >= retry.base_delay_ms"));
        }
        if self.output.code_extension.trim().is_empty() {
            return Err(anyhow!("output.code_extension must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autocoder.toml");
        let cfg = PipelineConfig {
            models: ModelsConfig {
                draft: "gpt-4o-mini".to_string(),
                ..ModelsConfig::default()
            },
            ..PipelineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autocoder.toml");
        fs::write(&path, "[refine]\niterations = 0\n\n[models]\ncode = \"o1\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.refine.iterations, 0);
        assert!(cfg.refine.skip_merge_on_approval);
        assert_eq!(cfg.models.code, "o1");
        assert_eq!(cfg.models.draft, "gpt-4o");
        assert_eq!(cfg.pacing, PacingConfig::default());
    }

    #[test]
    fn validate_rejects_zero_rounds_and_blank_models() {
        let mut cfg = PipelineConfig::default();
        cfg.improve.rounds = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("improve.rounds"));

        let mut cfg = PipelineConfig::default();
        cfg.models.merge = " ".to_string();
        assert!(cfg.validate().unwrap_err().to_string().contains("models.merge"));
    }

    #[test]
    fn retry_policy_uses_millis() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }
}
