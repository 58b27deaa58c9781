mod config;
mod shell_executor;
mod submission;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use planrunner_core::{GitVcs, Orchestrator, OrchestratorConfig};

use config::{CliOverrides, ResolvedConfig};
use shell_executor::ShellExecutor;

#[derive(Parser)]
#[command(name = "planrunner", about = "Parallel test-plan execution engine over a pool of isolated git worktrees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a planrunner config file
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Run a submission file to completion and print the session report
    Run {
        /// Path to the git repository to execute plans against
        repo: PathBuf,
        /// Path to a TOML submission file
        submission: PathBuf,
        /// Number of concurrent execution workers
        #[arg(long)]
        workers: Option<usize>,
        /// Directory holding workspace worktrees
        #[arg(long)]
        base_dir: Option<PathBuf>,
        /// Primary branch to base new workspaces on
        #[arg(long)]
        primary_branch: Option<String>,
        /// Write the session report to this path instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn cmd_init(force: bool) -> Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        anyhow::bail!("config file already exists at {}\nUse --force to overwrite.", path.display());
    }

    config::save_config(&config::ConfigFile::default())?;
    println!("Config written to {}", path.display());
    Ok(())
}

async fn cmd_run(
    repo: PathBuf,
    submission: PathBuf,
    workers: Option<usize>,
    base_dir: Option<PathBuf>,
    primary_branch: Option<String>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    if !repo.exists() {
        anyhow::bail!("repository path does not exist: {}", repo.display());
    }

    let overrides = CliOverrides {
        base_dir,
        worker_count: workers,
        primary_branch,
    };
    let resolved = ResolvedConfig::resolve(&overrides)?;

    let vcs = GitVcs::new(repo, resolved.primary_branch.clone())
        .await
        .context("failed to open repository")?;
    let executor = ShellExecutor::new(resolved.executor_command.clone(), resolved.executor_args.clone());

    let orchestrator_config = OrchestratorConfig {
        worker_count: resolved.worker_count,
        base_dir: resolved.base_dir.clone(),
        default_max_retries: resolved.default_max_retries,
        default_task_timeout: resolved.default_task_timeout,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(orchestrator_config, Arc::new(vcs), Arc::new(executor));

    let submission_file = submission::load(&submission)?;
    let requests = submission_file.into_requests(&resolved);
    if requests.is_empty() {
        tracing::warn!(path = %submission.display(), "submission file contains no requests");
    }

    let report = orchestrator.run(requests).await?;
    let rendered = serde_json::to_string_pretty(&report)?;

    match report_path {
        Some(path) => {
            std::fs::write(&path, &rendered).with_context(|| format!("failed to write report to {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    if matches!(report.status, planrunner_core::ReportStatus::Failed) {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => cmd_init(force)?,
        Commands::Run {
            repo,
            submission,
            workers,
            base_dir,
            primary_branch,
            report,
        } => cmd_run(repo, submission, workers, base_dir, primary_branch, report).await?,
    }

    Ok(())
}
