//! Task coder: synthesize one code unit per task, in order, against the
//! growing codebase.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::agents::{StageIo, complete_with_retry};
use crate::core::parser::parse_code_block;
use crate::core::retry::RetryPolicy;
use crate::core::types::{Codebase, Stage, TaskDescriptor};
use crate::error::{StageFailure, TaskSynthesisFailure};
use crate::io::model::CompletionRequest;
use crate::io::prompt::PromptEngine;
use crate::io::store::{ArtifactKey, Phase, WriteMode};

#[derive(Debug, Clone)]
pub struct CodingSettings {
    pub model: String,
    pub task_pause: Duration,
    pub retry: RetryPolicy,
}

/// Result of one pass over the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingReport {
    pub codebase: Codebase,
    /// Tasks whose output was appended.
    pub synthesized: usize,
    pub failures: Vec<TaskSynthesisFailure>,
}

pub struct TaskCoder<'a> {
    prompts: &'a PromptEngine,
    system_context: &'a str,
    settings: CodingSettings,
}

impl<'a> TaskCoder<'a> {
    pub fn new(
        prompts: &'a PromptEngine,
        system_context: &'a str,
        settings: CodingSettings,
    ) -> Self {
        Self {
            prompts,
            system_context,
            settings,
        }
    }

    /// Generate the code unit for `task` given the codebase so far.
    ///
    /// The result is fence-stripped but otherwise unvalidated.
    pub fn synthesize(
        &self,
        io: StageIo<'_>,
        codebase: &Codebase,
        task: &TaskDescriptor,
    ) -> Result<String> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            system_context: self.system_context.to_string(),
            prompt: self.prompts.synthesize(codebase.as_str(), task)?,
        };
        let raw = complete_with_retry(io.client, io.pause, &self.settings.retry, &request)?;
        debug!(completion_bytes = raw.len(), "task completion received");
        Ok(parse_code_block(&raw))
    }

    /// Code every task in order, starting from `codebase`.
    ///
    /// A task that cannot be synthesized is logged and recorded, and the pass
    /// moves on. Storage errors abort the pass.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub fn code_all(
        &self,
        io: StageIo<'_>,
        codebase: Codebase,
        tasks: &[TaskDescriptor],
    ) -> Result<CodingReport> {
        let mut codebase = codebase;
        let mut synthesized = 0;
        let mut failures = Vec::new();

        for (index, task) in tasks.iter().enumerate() {
            let route = task.route();
            info!(index, %route, description = task.description(), "coding task");
            match self.synthesize(io, &codebase, task) {
                Ok(unit) => {
                    codebase.append(&unit);
                    synthesized += 1;
                    self.persist(io, index, &unit, &codebase)
                        .context(StageFailure::new(Stage::Coding))?;
                }
                Err(err) => {
                    let failure = TaskSynthesisFailure {
                        index,
                        route,
                        reason: format!("{err:#}"),
                    };
                    warn!(error = %failure, "skipping task");
                    failures.push(failure);
                }
            }
            io.pause.pause(self.settings.task_pause);
        }

        info!(synthesized, failed = failures.len(), "coding pass finished");
        Ok(CodingReport {
            codebase,
            synthesized,
            failures,
        })
    }

    fn persist(
        &self,
        io: StageIo<'_>,
        index: usize,
        unit: &str,
        codebase: &Codebase,
    ) -> Result<()> {
        let version = u32::try_from(index).context("task index overflows u32")?;
        io.store
            .write(
                &ArtifactKey::versioned(io.namespace, Phase::TaskOutput, version),
                unit,
                WriteMode::Overwrite,
            )
            .with_context(|| format!("persist output of task {index}"))?;
        io.store
            .write(
                &ArtifactKey::new(io.namespace, Phase::Codebase),
                codebase.as_str(),
                WriteMode::Overwrite,
            )
            .context("persist codebase")
    }
}
