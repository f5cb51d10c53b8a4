//! pr-conflicts: report which open pull requests of a repository conflict
//! with each other.
//!
//! Every ordered pair of eligible pull requests is merged onto a fresh copy
//! of the base branch in a local clone; the result is printed as a matrix
//! and written as JSON and SVG artifacts.

mod progress;
mod style;
mod table;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use prconflict_core::config::{AppConfig, DEFAULT_CONFIG_TOML};
use prconflict_core::conflict::{sweep_leftovers, HomeRef, SweepReport};
use prconflict_core::eligibility::select_candidates;
use prconflict_core::git::{parse_repository_url, GitHubClient, MergeOracle};
use prconflict_core::models::BranchNaming;
use prconflict_core::oplog::{FileOperationLog, OperationLog};
use prconflict_core::progress::{Phase, Progress};
use prconflict_core::render::write_artifacts;
use prconflict_core::{ConflictRun, FailurePolicy, RunOutcome, RunRequest};

use crate::progress::TerminalProgress;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Pairwise merge-conflict matrix for open pull requests.
#[derive(Parser, Debug)]
#[command(
    name = "pr-conflicts",
    version,
    about = "Find which open pull requests would conflict with each other"
)]
struct Cli {
    /// Path to the TOML configuration file. Missing files fall back to defaults.
    #[arg(short, long, global = true, default_value = "./prconflict.toml")]
    config: PathBuf,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the conflict matrix for a repository's open pull requests.
    Check(CheckArgs),

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./prconflict.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Clean up trial branches and merges left in a kept working directory.
    Sweep {
        /// Working directory of an earlier run (`--workdir`).
        workdir: PathBuf,

        /// Branch to return to; defaults to the clone's default branch.
        #[arg(long)]
        base_branch: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Repository: https URL, git@host:owner/repo, or owner/repo.
    repo_url: String,

    /// Access token. Defaults to the variable named by `github.token_env`.
    #[arg(long)]
    token: Option<String>,

    /// Base branch. Defaults to the repository's default branch.
    #[arg(long)]
    base_branch: Option<String>,

    /// Number of parallel trial workers.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Keep the working clone here instead of a temporary directory.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Directory for the JSON and SVG artifacts and the git log.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// What to do when a candidate cannot be fetched or applied: abort or degrade.
    #[arg(long)]
    on_failure: Option<FailurePolicy>,

    /// Skip the SVG heatmap.
    #[arg(long)]
    no_svg: bool,

    /// Skip the JSON document.
    #[arg(long)]
    no_json: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Check(args) => cmd_check(&cli.config, args).await,
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Sweep {
            workdir,
            base_branch,
        } => cmd_sweep(&cli.config, &workdir, base_branch),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(path).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    Ok(config)
}

fn apply_overrides(config: &mut AppConfig, args: &CheckArgs) {
    if let Some(token) = &args.token {
        config.github.token = Some(token.clone());
    }
    if let Some(jobs) = args.jobs {
        config.run.jobs = jobs;
    }
    if let Some(workdir) = &args.workdir {
        config.run.workdir = Some(workdir.clone());
    }
    if let Some(policy) = args.on_failure {
        config.run.on_failure = policy;
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.clone();
    }
    if args.no_svg {
        config.output.svg = false;
    }
    if args.no_json {
        config.output.json = false;
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_check(config_path: &Path, args: CheckArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, &args);
    config.validate().context("invalid configuration")?;

    let location = parse_repository_url(&args.repo_url, &config.github.api_url)?;
    let token = config.require_token()?.to_string();
    let client = GitHubClient::new(&config.github.api_url, token).context("failed to create GitHub client")?;

    let spinner = progress::spinner(format!("Fetching open pull requests of {}...", location.slug));
    let repo = client
        .get_repository(&location.slug)
        .await
        .with_context(|| format!("failed to look up repository {}", location.slug))?;
    let base = match args.base_branch.or_else(|| repo.default_branch.clone()) {
        Some(base) => base,
        None => {
            spinner.finish_and_clear();
            anyhow::bail!("repository {} reports no default branch; pass --base-branch", location.slug);
        }
    };
    let fetched = client
        .fetch_candidates(&repo, &base)
        .await
        .context("failed to list open pull requests")?;
    spinner.finish_and_clear();

    let selection = select_candidates(fetched, &base);
    println!(
        "{}",
        style::success(&format!(
            "{} eligible pull requests into '{}' ({} excluded)",
            selection.eligible.len(),
            base,
            selection.excluded.len()
        ))
    );
    if selection.eligible.len() < 2 {
        table::print_exclusions(&selection.excluded);
        println!("{}", style::warn("Fewer than two eligible pull requests; nothing to compare"));
        return Ok(());
    }

    std::fs::create_dir_all(&config.output.dir).with_context(|| {
        format!("failed to create output directory {}", config.output.dir.display())
    })?;
    let log_path = config.output.log_path();
    let log: Arc<dyn OperationLog> = Arc::new(
        FileOperationLog::open(&log_path)
            .with_context(|| format!("failed to open git log {}", log_path.display()))?,
    );

    info!(
        repo = %location.slug,
        base = %base,
        candidates = selection.eligible.len(),
        jobs = config.run.jobs,
        "starting conflict run"
    );
    let run = ConflictRun::new(&config, log);
    let request = RunRequest {
        clone_url: location.clone_url,
        base: Some(base),
        candidates: selection.eligible,
    };
    let progress = TerminalProgress::new(true);
    let outcome = tokio::task::spawn_blocking({
        let progress = progress.clone();
        move || run.execute(request, &progress)
    })
    .await
    .context("conflict run panicked")?;
    progress.finish();
    let outcome = outcome.with_context(|| format!("run failed; see {} for git commands", log_path.display()))?;

    match outcome {
        RunOutcome::TooFewCandidates { eligible, excluded } => {
            let mut all = selection.excluded;
            all.extend(excluded);
            table::print_exclusions(&all);
            println!(
                "{}",
                style::warn(&format!(
                    "Only {} pull request(s) could be fetched; nothing to compare",
                    eligible
                ))
            );
        }
        RunOutcome::Completed(mut report) => {
            report.excluded.splice(0..0, selection.excluded);
            table::print_report(&report);

            progress.phase_started(Phase::Render, 0);
            let written = write_artifacts(&report, &config.output.dir, config.output.json, config.output.svg)
                .context("failed to write artifacts")?;
            progress.finish();
            for path in written.json.iter().chain(written.svg.iter()) {
                println!("{}", style::success(&format!("Wrote {}", path.display())));
            }
            println!("{}", style::dim(&format!("git log: {}", log_path.display())));
        }
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG_TOML).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Export a GitHub token as GITHUB_TOKEN (or the variable named by github.token_env)");
    println!("  2. Validate with: pr-conflicts validate --config {}", output.display());
    println!(
        "  3. Run: pr-conflicts check owner/repo --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All values are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  GitHub API    : {}", config.github.api_url);
    println!(
        "  GitHub token  : {} ({})",
        if config.github.token.is_some() { "set" } else { "NOT SET" },
        config.github.token_env
    );
    println!("  git binary    : {}", config.git.binary);
    println!(
        "  git timeout   : {}",
        match config.git.command_timeout() {
            Some(t) => format!("{}s", t.as_secs()),
            None => "none".to_string(),
        }
    );
    println!("  Branch prefix : {}", config.git.branch_prefix);
    println!("  Jobs          : {}", config.run.jobs);
    println!("  On failure    : {}", config.run.on_failure);
    println!("  Output dir    : {}", config.output.dir.display());
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_sweep(config_path: &Path, workdir: &Path, base_branch: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let log_path = config.output.log_path();
    let log: Arc<dyn OperationLog> = Arc::new(
        FileOperationLog::open(&log_path)
            .with_context(|| format!("failed to open git log {}", log_path.display()))?,
    );

    let swept = sweep_workdir(&config, Arc::clone(&log), workdir, base_branch);
    log.close();
    let (base, report) = swept.with_context(|| format!("sweep failed; see {} for git commands", log_path.display()))?;

    if report.is_clean() {
        println!("{}", style::success("Nothing to clean up"));
        return Ok(());
    }
    if report.aborted_merge {
        println!("{}", style::success("Aborted an in-progress merge"));
    }
    if report.removed_worktrees > 0 {
        println!(
            "{}",
            style::success(&format!("Removed {} stale worktree(s)", report.removed_worktrees))
        );
    }
    for branch in &report.deleted_branches {
        println!("{}", style::success(&format!("Deleted {}", branch)));
    }
    println!("{}", style::dim(&format!("HEAD is on '{}'", base)));
    println!("{}", style::dim(&format!("git log: {}", log_path.display())));
    Ok(())
}

fn sweep_workdir(
    config: &AppConfig,
    log: Arc<dyn OperationLog>,
    workdir: &Path,
    base_branch: Option<String>,
) -> Result<(String, SweepReport)> {
    let run = ConflictRun::new(config, log);
    let oracle = MergeOracle::open(run.runner(), workdir)
        .with_context(|| format!("no working repository at {}", workdir.display()))?;

    let base = match base_branch {
        Some(base) => base,
        None => oracle
            .current_default_branch()
            .context("could not determine the default branch; pass --base-branch")?,
    };
    info!(workdir = %workdir.display(), base = %base, "sweeping working repository");
    let naming = BranchNaming::with_fresh_run_id(&config.git.branch_prefix);
    let report = sweep_leftovers(&oracle, &naming, &HomeRef::Branch(base.clone()))
        .context("failed to sweep working repository")?;
    Ok((base, report))
}
