//! Full-run orchestration: refine the design, decompose and code it, then
//! run self-improvement rounds.
//!
//! Each stage's failure stops the run with a [`StageFailure`] context,
//! except single-task synthesis failures, which the task coder records and
//! skips. Artifacts persisted before a failure stay in place.

use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::agents::StageIo;
use crate::agents::coder::{CodingReport, CodingSettings, TaskCoder};
use crate::agents::designer::{DesignRefiner, RefineSettings, RefinedDesign};
use crate::agents::improver::{ImproveSettings, SelfImprovementLoop};
use crate::core::parser::parse_task_list;
use crate::core::types::{CodeVersion, Codebase, Stage, TaskDescriptor};
use crate::error::StageFailure;
use crate::io::config::PipelineConfig;
use crate::io::prompt::PromptEngine;
use crate::io::run_log::{RefinementSummary, RunSummary, TaskFailureRecord, write_summary};
use crate::io::store::{ArtifactKey, ArtifactStore, Namespace, Phase};

/// Artifacts wiped before a fresh run.
const RUN_SCOPED_PHASES: [Phase; 4] = [
    Phase::InitialDesign,
    Phase::FinalDesign,
    Phase::Codebase,
    Phase::Summary,
];

/// Numbered artifacts wiped before a fresh run.
const RUN_SCOPED_VERSIONED_PHASES: [Phase; 2] = [Phase::TaskOutput, Phase::Improvement];

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub design: RefinedDesign,
    pub tasks: Vec<TaskDescriptor>,
    pub coding: CodingReport,
    pub versions: Vec<CodeVersion>,
    pub summary: RunSummary,
}

impl RunOutcome {
    pub fn final_version(&self) -> Option<&CodeVersion> {
        self.versions.last()
    }
}

/// Run the whole pipeline for `goal`.
#[instrument(skip_all, fields(project = %io.namespace.project, folder = %io.namespace.folder))]
pub fn run_pipeline(config: &PipelineConfig, io: StageIo<'_>, goal: &str) -> Result<RunOutcome> {
    let started = Instant::now();
    for phase in RUN_SCOPED_PHASES {
        io.store
            .clear(&ArtifactKey::new(io.namespace, phase))
            .with_context(|| format!("clear {phase:?} artifact"))?;
    }
    for phase in RUN_SCOPED_VERSIONED_PHASES {
        clear_versions(io.store, io.namespace, phase)?;
    }

    let prompts = PromptEngine::new(config.output.target_language.as_str());
    let system_context = config.service.system_context.as_str();

    info!(iterations = config.refine.iterations, "refining design");
    let refiner = DesignRefiner::new(
        &prompts,
        &config.models,
        system_context,
        RefineSettings {
            iterations: config.refine.iterations,
            skip_merge_on_approval: config.refine.skip_merge_on_approval,
            round_pause: config.pacing.design_round(),
            retry: config.retry.policy(),
        },
    );
    let design = refiner.refine(io, goal)?;

    let tasks = parse_task_list(&design.design)
        .map_err(anyhow::Error::new)
        .context("parse final design into tasks")
        .context(StageFailure::new(Stage::Decomposing))?;
    info!(tasks = tasks.len(), "decomposed design");

    let coder = TaskCoder::new(
        &prompts,
        system_context,
        CodingSettings {
            model: config.models.code.clone(),
            task_pause: config.pacing.task(),
            retry: config.retry.policy(),
        },
    );
    let coding = coder.code_all(io, Codebase::new(), &tasks)?;
    if coding.codebase.is_empty() {
        warn!(
            failed = coding.failures.len(),
            "no task produced code; improving from an empty codebase"
        );
    }

    info!(rounds = config.improve.rounds, "improving codebase");
    let versions =
        improver(&prompts, config).improve(io, goal, &coding.codebase, config.improve.rounds)?;

    let summary = RunSummary {
        project: io.namespace.project.clone(),
        folder: io.namespace.folder.clone(),
        models: config.models.clone(),
        refinement: RefinementSummary {
            rounds: config.refine.iterations,
            approved_rounds: design.approved_rounds(),
        },
        tasks: tasks.len(),
        task_failures: coding.failures.iter().map(TaskFailureRecord::from).collect(),
        versions: versions.iter().map(|version| version.index).collect(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    write_summary(io.store, io.namespace, &summary)?;
    info!(
        versions = summary.versions.len(),
        task_failures = summary.task_failures.len(),
        duration_ms = summary.duration_ms,
        "run complete"
    );

    Ok(RunOutcome {
        design,
        tasks,
        coding,
        versions,
        summary,
    })
}

/// Run further self-improvement rounds over stored code.
///
/// Starts from improvement version `from_version`, or from the task coder's
/// codebase when `None`. New versions are numbered after the highest stored
/// one, so no stored version is overwritten.
#[instrument(
    skip_all,
    fields(project = %io.namespace.project, from_version = ?from_version, rounds = rounds)
)]
pub fn resume_improvement(
    config: &PipelineConfig,
    io: StageIo<'_>,
    goal: &str,
    from_version: Option<u32>,
    rounds: u32,
) -> Result<Vec<CodeVersion>> {
    let source = match from_version {
        Some(version) => ArtifactKey::versioned(io.namespace, Phase::Improvement, version),
        None => ArtifactKey::new(io.namespace, Phase::Codebase),
    };
    let code = io
        .store
        .read(&source)?
        .ok_or_else(|| match from_version {
            Some(version) => anyhow!("no improvement version {version} stored for this project"),
            None => anyhow!("no generated code stored for this project (run the pipeline first)"),
        })?;

    let first_version = next_free_version(io.store, io.namespace)?;
    info!(first_version, "resuming self-improvement");
    let prompts = PromptEngine::new(config.output.target_language.as_str());
    improver(&prompts, config).improve_from(io, goal, &Codebase::from(code), rounds, first_version)
}

/// One past the highest stored improvement version; zero when none is stored.
pub fn next_free_version(store: &dyn ArtifactStore, namespace: &Namespace) -> Result<u32> {
    match store.list_versions(namespace, Phase::Improvement)?.last() {
        Some(highest) => highest
            .checked_add(1)
            .ok_or_else(|| anyhow!("version number overflow")),
        None => Ok(0),
    }
}

/// Remove every stored version of `phase`.
fn clear_versions(store: &dyn ArtifactStore, namespace: &Namespace, phase: Phase) -> Result<()> {
    for version in store.list_versions(namespace, phase)? {
        store
            .clear(&ArtifactKey::versioned(namespace, phase, version))
            .with_context(|| format!("clear {phase:?} version {version}"))?;
    }
    Ok(())
}

fn improver<'a>(prompts: &'a PromptEngine, config: &'a PipelineConfig) -> SelfImprovementLoop<'a> {
    SelfImprovementLoop::new(
        prompts,
        config.service.system_context.as_str(),
        ImproveSettings {
            model: config.models.improve.clone(),
            round_pause: config.pacing.improve_round(),
            retry: config.retry.policy(),
            stop_when_unchanged: config.improve.stop_when_unchanged,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::{MemoryStore, WriteMode};

    fn store_versions(store: &MemoryStore, ns: &Namespace, phase: Phase, versions: &[u32]) {
        for version in versions {
            store
                .write(
                    &ArtifactKey::versioned(ns, phase, *version),
                    "code",
                    WriteMode::Overwrite,
                )
                .expect("write");
        }
    }

    #[test]
    fn next_free_version_follows_the_highest_stored() {
        let store = MemoryStore::new();
        let ns = Namespace::new("snake", "generated_scripts");
        assert_eq!(next_free_version(&store, &ns).expect("scan"), 0);

        store_versions(&store, &ns, Phase::Improvement, &[0, 1, 2, 5]);
        store_versions(&store, &ns, Phase::TaskOutput, &[9]);
        assert_eq!(next_free_version(&store, &ns).expect("scan"), 6);
    }

    #[test]
    fn clear_versions_removes_every_version_of_the_phase() {
        let store = MemoryStore::new();
        let ns = Namespace::new("snake", "generated_scripts");
        let other = Namespace::new("snake", "archive");
        store_versions(&store, &ns, Phase::TaskOutput, &[0, 1, 3]);
        store_versions(&store, &ns, Phase::Improvement, &[0]);
        store_versions(&store, &other, Phase::TaskOutput, &[0]);

        clear_versions(&store, &ns, Phase::TaskOutput).expect("clear");

        assert!(store.list_versions(&ns, Phase::TaskOutput).expect("list").is_empty());
        assert_eq!(store.list_versions(&ns, Phase::Improvement).expect("list"), vec![0]);
        assert_eq!(store.list_versions(&other, Phase::TaskOutput).expect("list"), vec![0]);
    }
}
