//! Design refinement: draft, then critique and merge for a fixed number of
//! rounds.
//!
//! The refiner is an explicit state machine:
//!
//! ```text
//! Drafting -> Critiquing -> Merging -> Critiquing -> ... -> Finalized
//! ```
//!
//! The draft is persisted as the initial design before any critique runs;
//! the live design is persisted as the final design once the machine
//! reaches `Finalized`.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::agents::{StageIo, complete_with_retry, retry};
use crate::core::parser::parse_critique;
use crate::core::retry::RetryPolicy;
use crate::core::types::{Critique, Stage};
use crate::error::{ModelError, StageFailure, UnparseableResponseError};
use crate::io::config::ModelsConfig;
use crate::io::model::CompletionRequest;
use crate::io::prompt::PromptEngine;
use crate::io::store::{ArtifactKey, Phase, WriteMode};

#[derive(Debug, Clone)]
pub struct RefineSettings {
    /// Critique/merge rounds after drafting.
    pub iterations: u32,
    pub skip_merge_on_approval: bool,
    pub round_pause: Duration,
    pub retry: RetryPolicy,
}

/// What happened in one critique/merge round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRecord {
    pub round: u32,
    pub approved: bool,
    pub merged: bool,
    /// Tasks the critique asked to add. Zero for approvals.
    pub suggestions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinedDesign {
    pub initial: String,
    pub design: String,
    pub rounds: Vec<RoundRecord>,
}

impl RefinedDesign {
    pub fn approved_rounds(&self) -> Vec<u32> {
        self.rounds
            .iter()
            .filter(|record| record.approved)
            .map(|record| record.round)
            .collect()
    }
}

enum RefineState {
    Drafting,
    Critiquing { round: u32 },
    Merging { round: u32, critique: Critique },
    Finalized,
}

pub struct DesignRefiner<'a> {
    prompts: &'a PromptEngine,
    models: &'a ModelsConfig,
    system_context: &'a str,
    settings: RefineSettings,
}

impl<'a> DesignRefiner<'a> {
    pub fn new(
        prompts: &'a PromptEngine,
        models: &'a ModelsConfig,
        system_context: &'a str,
        settings: RefineSettings,
    ) -> Self {
        Self {
            prompts,
            models,
            system_context,
            settings,
        }
    }

    /// Run the refinement loop for `goal`.
    ///
    /// Drafting errors are fatal. Critiquing and merging errors are fatal once
    /// retries are exhausted. Every error carries a [`StageFailure`] context.
    #[instrument(skip_all, fields(iterations = self.settings.iterations))]
    pub fn refine(&self, io: StageIo<'_>, goal: &str) -> Result<RefinedDesign> {
        let mut state = RefineState::Drafting;
        let mut initial = String::new();
        let mut design = String::new();
        let mut rounds = Vec::new();

        loop {
            state = match state {
                RefineState::Drafting => {
                    design = self
                        .draft(io, goal)
                        .context(StageFailure::new(Stage::Drafting))?;
                    info!(design_bytes = design.len(), "drafted design");
                    io.store
                        .write(
                            &ArtifactKey::new(io.namespace, Phase::InitialDesign),
                            &design,
                            WriteMode::Overwrite,
                        )
                        .context("persist initial design")?;
                    initial = design.clone();
                    if self.settings.iterations == 0 {
                        RefineState::Finalized
                    } else {
                        RefineState::Critiquing { round: 0 }
                    }
                }
                RefineState::Critiquing { round } => {
                    let critique = self
                        .critique(io, goal, &design)
                        .context(StageFailure::new(Stage::Critiquing))?;
                    if critique.is_approval() && self.settings.skip_merge_on_approval {
                        info!(round, "critique approved the design, skipping merge");
                        rounds.push(RoundRecord {
                            round,
                            approved: true,
                            merged: false,
                            suggestions: 0,
                        });
                        self.finish_round(io, round)
                    } else {
                        RefineState::Merging { round, critique }
                    }
                }
                RefineState::Merging { round, critique } => {
                    design = self
                        .merge(io, &design, &critique)
                        .context(StageFailure::new(Stage::Merging))?;
                    let suggestions = match &critique {
                        Critique::NoChangesNeeded => 0,
                        Critique::SuggestedTasks(tasks) => tasks.len(),
                    };
                    info!(round, suggestions, design_bytes = design.len(), "merged critique");
                    rounds.push(RoundRecord {
                        round,
                        approved: critique.is_approval(),
                        merged: true,
                        suggestions,
                    });
                    self.finish_round(io, round)
                }
                RefineState::Finalized => break,
            };
        }

        io.store
            .write(
                &ArtifactKey::new(io.namespace, Phase::FinalDesign),
                &design,
                WriteMode::Overwrite,
            )
            .context("persist final design")?;

        Ok(RefinedDesign {
            initial,
            design,
            rounds,
        })
    }

    fn finish_round(&self, io: StageIo<'_>, round: u32) -> RefineState {
        io.pause.pause(self.settings.round_pause);
        let next = round + 1;
        if next < self.settings.iterations {
            RefineState::Critiquing { round: next }
        } else {
            RefineState::Finalized
        }
    }

    /// One attempt only.
    fn draft(&self, io: StageIo<'_>, goal: &str) -> Result<String> {
        let request = self.request(&self.models.draft, self.prompts.draft(goal)?);
        let design = io.client.complete(&request)?;
        Ok(design)
    }

    /// An unparseable critique counts as a failed attempt and is retried like
    /// a transient service error.
    fn critique(&self, io: StageIo<'_>, goal: &str, design: &str) -> Result<Critique> {
        let request = self.request(&self.models.critique, self.prompts.critique(goal, design)?);
        retry(
            io.pause,
            &self.settings.retry,
            || -> Result<Critique> {
                let raw = io.client.complete(&request)?;
                debug!(critique_bytes = raw.len(), "critique received");
                parse_critique(&raw).map_err(|err| {
                    warn!(error = %err, "critique could not be parsed");
                    anyhow::Error::new(err)
                })
            },
            is_retryable_critique_error,
        )
    }

    fn merge(&self, io: StageIo<'_>, design: &str, critique: &Critique) -> Result<String> {
        let request = self.request(&self.models.merge, self.prompts.merge(design, critique)?);
        let merged = complete_with_retry(io.client, io.pause, &self.settings.retry, &request)?;
        Ok(merged)
    }

    fn request(&self, model: &str, prompt: String) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            system_context: self.system_context.to_string(),
            prompt,
        }
    }
}

fn is_retryable_critique_error(err: &anyhow::Error) -> bool {
    err.is::<UnparseableResponseError>()
        || err
            .downcast_ref::<ModelError>()
            .is_some_and(ModelError::is_transient)
}
