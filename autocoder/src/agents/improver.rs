//! Whole-program rewriting rounds over the accumulated codebase.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument};

use crate::agents::{StageIo, complete_with_retry};
use crate::core::parser::parse_code_block;
use crate::core::retry::RetryPolicy;
use crate::core::types::{CodeVersion, Codebase, Stage};
use crate::error::StageFailure;
use crate::io::model::CompletionRequest;
use crate::io::prompt::PromptEngine;
use crate::io::store::{ArtifactKey, Phase, WriteMode};

#[derive(Debug, Clone)]
pub struct ImproveSettings {
    pub model: String,
    pub round_pause: Duration,
    pub retry: RetryPolicy,
    /// Stop once a round returns its input unchanged.
    pub stop_when_unchanged: bool,
}

pub struct SelfImprovementLoop<'a> {
    prompts: &'a PromptEngine,
    system_context: &'a str,
    settings: ImproveSettings,
}

impl<'a> SelfImprovementLoop<'a> {
    pub fn new(
        prompts: &'a PromptEngine,
        system_context: &'a str,
        settings: ImproveSettings,
    ) -> Self {
        Self {
            prompts,
            system_context,
            settings,
        }
    }

    /// Run `rounds` rewriting rounds, numbering versions from zero.
    pub fn improve(
        &self,
        io: StageIo<'_>,
        goal: &str,
        codebase: &Codebase,
        rounds: u32,
    ) -> Result<Vec<CodeVersion>> {
        self.improve_from(io, goal, codebase, rounds, 0)
    }

    /// Run `rounds` rewriting rounds, numbering versions from `first_version`.
    ///
    /// Round `i` rewrites the output of round `i - 1` (the given codebase for
    /// the first round) and is persisted before the next round starts.
    #[instrument(skip_all, fields(rounds = rounds, first_version = first_version))]
    pub fn improve_from(
        &self,
        io: StageIo<'_>,
        goal: &str,
        codebase: &Codebase,
        rounds: u32,
        first_version: u32,
    ) -> Result<Vec<CodeVersion>> {
        if rounds == 0 {
            return Err(anyhow!("improvement rounds must be > 0"));
        }

        let mut versions: Vec<CodeVersion> = Vec::with_capacity(rounds as usize);
        for round in 0..rounds {
            let index = first_version
                .checked_add(round)
                .ok_or_else(|| anyhow!("version number overflow"))?;
            let input = versions
                .last()
                .map_or(codebase.as_str(), |version| version.code.as_str());

            let code = self
                .round(io, goal, input)
                .with_context(|| format!("improvement round {round}"))
                .context(StageFailure::new(Stage::Improving))?;
            io.store
                .write(
                    &ArtifactKey::versioned(io.namespace, Phase::Improvement, index),
                    &code,
                    WriteMode::Overwrite,
                )
                .with_context(|| format!("persist version {index}"))?;

            let unchanged = code.trim() == input.trim();
            info!(
                round,
                version = index,
                code_bytes = code.len(),
                unchanged,
                "improvement round finished"
            );
            versions.push(CodeVersion { index, code });

            if unchanged && self.settings.stop_when_unchanged {
                info!(round, "output unchanged, stopping early");
                break;
            }
            io.pause.pause(self.settings.round_pause);
        }

        Ok(versions)
    }

    fn round(&self, io: StageIo<'_>, goal: &str, code: &str) -> Result<String> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            system_context: self.system_context.to_string(),
            prompt: self.prompts.improve(goal, code)?,
        };
        let raw = complete_with_retry(io.client, io.pause, &self.settings.retry, &request)?;
        Ok(parse_code_block(&raw))
    }
}
