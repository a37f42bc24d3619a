//! Goal-to-code pipeline CLI.
//!
//! `autocoder run` refines a design for the goal, codes it task by task and
//! runs self-improvement rounds, writing every artifact under
//! `<output.root>/<project>/<folder>/`. `autocoder improve` resumes
//! self-improvement over code stored by an earlier run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use autocoder::agents::StageIo;
use autocoder::exit_codes;
use autocoder::io::config::{CONFIG_FILE, ModelsConfig, PipelineConfig, load_config, write_config};
use autocoder::io::goal::{GoalSource, assemble_goal, validate_name};
use autocoder::io::model::OpenAiClient;
use autocoder::io::pacing::ThreadPause;
use autocoder::io::store::{ArtifactKey, FsStore, Namespace, Phase};
use autocoder::logging;
use autocoder::pipeline::{resume_improvement, run_pipeline};

#[derive(Parser)]
#[command(
    name = "autocoder",
    version,
    about = "Turn a goal into code via design refinement, task coding and self-improvement"
)]
struct Cli {
    /// Config file. Defaults to `autocoder.toml` in the working directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the full pipeline: refine, code, improve.
    Run {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        goal: GoalArgs,
        /// Design refinement rounds (overrides `refine.iterations`).
        #[arg(long)]
        iterations: Option<u32>,
        /// Self-improvement rounds (overrides `improve.rounds`).
        #[arg(long)]
        rounds: Option<u32>,
    },
    /// Run more self-improvement rounds over stored code.
    Improve {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        goal: GoalArgs,
        /// Start from this improvement version instead of the task coder output.
        #[arg(long)]
        from_version: Option<u32>,
        /// Self-improvement rounds (overrides `improve.rounds`).
        #[arg(long)]
        rounds: Option<u32>,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Project namespace (directory under `output.root`).
    #[arg(long)]
    project: String,
    /// Storage folder inside the project.
    #[arg(long, default_value = "generated_scripts")]
    folder: String,
    /// Model identifier for every stage (overrides `[models]`).
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args)]
struct GoalArgs {
    /// Goal text.
    #[arg(long, required_unless_present = "goal_file", conflicts_with = "goal_file")]
    goal: Option<String>,
    /// Read the goal text from a file.
    #[arg(long)]
    goal_file: Option<PathBuf>,
    /// Append a file to the goal (repeatable).
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
}

impl From<GoalArgs> for GoalSource {
    fn from(args: GoalArgs) -> Self {
        GoalSource {
            text: args.goal,
            file: args.goal_file,
            attachments: args.attachments,
        }
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    match cli.command {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Run {
            target,
            goal,
            iterations,
            rounds,
        } => cmd_run(&config_path, target, goal, iterations, rounds),
        Command::Improve {
            target,
            goal,
            from_version,
            rounds,
        } => cmd_improve(&config_path, target, goal, from_version, rounds),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if !force && config_path.exists() {
        println!("{} already exists (use --force to overwrite)", config_path.display());
        return Ok(());
    }
    write_config(config_path, &PipelineConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("{}", config_path.display());
    Ok(())
}

fn cmd_run(
    config_path: &Path,
    target: TargetArgs,
    goal: GoalArgs,
    iterations: Option<u32>,
    rounds: Option<u32>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(iterations) = iterations {
        config.refine.iterations = iterations;
    }
    if let Some(rounds) = rounds {
        config.improve.rounds = rounds;
    }
    let session = Session::open(config, target, goal)?;

    let outcome = run_pipeline(&session.config, session.io(), &session.goal)?;
    if let Some(version) = outcome.final_version() {
        println!("{}", session.version_path(version.index).display());
    }
    Ok(())
}

fn cmd_improve(
    config_path: &Path,
    target: TargetArgs,
    goal: GoalArgs,
    from_version: Option<u32>,
    rounds: Option<u32>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let rounds = rounds.unwrap_or(config.improve.rounds);
    let session = Session::open(config, target, goal)?;

    let versions = resume_improvement(
        &session.config,
        session.io(),
        &session.goal,
        from_version,
        rounds,
    )?;
    if let Some(version) = versions.last() {
        println!("{}", session.version_path(version.index).display());
    }
    Ok(())
}

/// Everything a command needs once arguments and config are resolved.
struct Session {
    config: PipelineConfig,
    goal: String,
    namespace: Namespace,
    client: OpenAiClient,
    store: FsStore,
    pause: ThreadPause,
}

impl Session {
    fn open(mut config: PipelineConfig, target: TargetArgs, goal: GoalArgs) -> Result<Self> {
        if let Some(model) = target.model.as_deref() {
            config.models = ModelsConfig::uniform(model);
        }
        config.validate()?;
        validate_name("project", &target.project)?;
        validate_name("folder", &target.folder)?;

        let goal = assemble_goal(&GoalSource::from(goal))?;
        let client = OpenAiClient::from_config(&config.service)?;
        let store = FsStore::new(&config.output.root, config.output.code_extension.as_str());
        Ok(Self {
            goal,
            namespace: Namespace::new(target.project, target.folder),
            client,
            store,
            pause: ThreadPause,
            config,
        })
    }

    fn io(&self) -> StageIo<'_> {
        StageIo {
            client: &self.client,
            pause: &self.pause,
            store: &self.store,
            namespace: &self.namespace,
        }
    }

    fn version_path(&self, version: u32) -> PathBuf {
        self.store.path_for(&ArtifactKey::versioned(
            &self.namespace,
            Phase::Improvement,
            version,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["autocoder", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_init_force_with_config() {
        let cli = Cli::parse_from(["autocoder", "init", "--force", "--config", "alt.toml"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "autocoder",
            "run",
            "--project",
            "calc",
            "--goal",
            "write a function that adds two numbers",
            "--iterations",
            "0",
            "--rounds",
            "1",
            "--model",
            "gpt-4o-mini",
        ]);
        let Command::Run {
            target,
            goal,
            iterations,
            rounds,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(target.project, "calc");
        assert_eq!(target.folder, "generated_scripts");
        assert_eq!(target.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(goal.goal.as_deref(), Some("write a function that adds two numbers"));
        assert_eq!(iterations, Some(0));
        assert_eq!(rounds, Some(1));
    }

    #[test]
    fn parse_improve_with_attachments() {
        let cli = Cli::parse_from([
            "autocoder",
            "improve",
            "--project",
            "self",
            "--folder",
            "iterations",
            "--goal-file",
            "goal.md",
            "--attach",
            "src/lib.rs",
            "--attach",
            "src/main.rs",
            "--from-version",
            "4",
        ]);
        let Command::Improve {
            target,
            goal,
            from_version,
            rounds,
        } = cli.command
        else {
            panic!("expected improve");
        };
        assert_eq!(target.folder, "iterations");
        assert_eq!(goal.goal_file, Some(PathBuf::from("goal.md")));
        assert_eq!(goal.attachments.len(), 2);
        assert_eq!(from_version, Some(4));
        assert_eq!(rounds, None);
    }

    #[test]
    fn goal_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["autocoder", "run", "--project", "calc"]).is_err());
        assert!(
            Cli::try_parse_from([
                "autocoder",
                "run",
                "--project",
                "calc",
                "--goal",
                "a",
                "--goal-file",
                "b"
            ])
            .is_err()
        );
    }
}
