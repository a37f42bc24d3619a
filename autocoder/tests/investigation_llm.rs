//! Investigation tests against a live model service.
//!
//! These check that real completions survive the response parser and that the
//! smallest end-to-end run produces code. They are excluded from regular runs
//! because they need network access and an API key.
//!
//! # Prerequisites
//!
//! - `OPENAI_API_KEY` set (or the variable named by `service.api_key_env`)
//! - Optional `AUTOCODER_TEST_MODEL` (defaults to `gpt-4o-mini`)
//!
//! # Running
//!
//! ```bash
//! cargo test -p autocoder --test investigation_llm -- --ignored
//!
//! # With logging (use --nocapture to see output for passing tests):
//! TEST_LOG=1 RUST_LOG=debug cargo test -p autocoder --test investigation_llm -- --ignored --nocapture
//! ```

use std::sync::Once;
use std::time::Instant;

use autocoder::agents::StageIo;
use autocoder::core::parser::parse_task_list;
use autocoder::io::config::{ModelsConfig, PacingConfig, PipelineConfig};
use autocoder::io::model::{CompletionRequest, ModelClient, OpenAiClient};
use autocoder::io::pacing::ThreadPause;
use autocoder::io::prompt::PromptEngine;
use autocoder::io::store::{FsStore, Namespace};
use autocoder::pipeline::run_pipeline;
use tracing::info;

static INIT_LOGGING: Once = Once::new();

fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
                .init();
        }
    });
}

fn live_config() -> PipelineConfig {
    let model = std::env::var("AUTOCODER_TEST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    PipelineConfig {
        models: ModelsConfig::uniform(&model),
        pacing: PacingConfig::none(),
        ..PipelineConfig::default()
    }
}

/// The draft prompt should yield a task list the parser accepts.
#[test]
#[ignore]
fn draft_completion_parses_into_tasks() {
    init_test_logging();
    let config = live_config();
    let client = OpenAiClient::from_config(&config.service).expect("client");
    let prompts = PromptEngine::new(config.output.target_language.as_str());

    let started = Instant::now();
    let raw = client
        .complete(&CompletionRequest {
            model: config.models.draft.clone(),
            system_context: config.service.system_context.clone(),
            prompt: prompts
                .draft("write a function that adds two numbers")
                .expect("render"),
        })
        .expect("complete");
    info!(elapsed_ms = started.elapsed().as_millis() as u64, %raw, "draft completion");

    let tasks = parse_task_list(&raw).expect("parse draft");
    assert!(!tasks.is_empty());
    assert!(
        tasks
            .iter()
            .any(|task| task.description().to_lowercase().contains("add")),
        "no task mentions adding: {raw}"
    );
}

/// Smallest full run: no refinement, one improvement round.
#[test]
#[ignore]
fn minimal_run_produces_one_version() {
    init_test_logging();
    let mut config = live_config();
    config.refine.iterations = 0;
    config.improve.rounds = 1;
    let client = OpenAiClient::from_config(&config.service).expect("client");
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FsStore::new(temp.path(), config.output.code_extension.as_str());
    let namespace = Namespace::new("adder", "generated_scripts");

    let outcome = run_pipeline(
        &config,
        StageIo {
            client: &client,
            pause: &ThreadPause,
            store: &store,
            namespace: &namespace,
        },
        "write a function that adds two numbers",
    )
    .expect("run");

    assert_eq!(outcome.versions.len(), 1);
    assert!(outcome.versions[0].code.contains("def "));
    assert!(
        temp.path()
            .join("adder/generated_scripts/generated_code_iteration0.py")
            .exists()
    );
}
