//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use recast_core::{
    CancellationToken, JobOutcome, JobRequest, Orchestrator, ProgressReporter,
};
use recast_oracle::{OpenRouterOptions, OpenRouterOracle};
use recast_shared::{
    AppConfig, JobId, JobStatus, PipelineConfig, RecastError, api_key, init_config, load_config,
    resolve_db_path, validate_api_key,
};
use recast_storage::Storage;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Recast: rebuild long documents to a target length, chunk by chunk.
#[derive(Parser)]
#[command(
    name = "recast",
    version,
    about = "Rebuild long documents to a target length under a shared structural plan.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Job database path (overrides `defaults.db_path`).
    #[arg(long, global = true, env = "RECAST_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start a new reconstruction job and run it to completion.
    Run {
        /// Input document, or `-` for stdin.
        #[arg(short, long)]
        input: PathBuf,

        /// Target output length in words (defaults to the input length).
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        target_words: Option<u32>,

        /// Extra instructions passed to every generation call.
        #[arg(long, default_value = "")]
        instructions: String,

        /// Owner recorded on the job (defaults to `defaults.owner`).
        #[arg(long)]
        owner: Option<String>,

        /// Write the final document here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Continue an interrupted job from its last persisted step.
    Resume {
        /// Job ID.
        job_id: String,

        /// Write the final document here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show a job's plan, state, and per-chunk progress.
    Status {
        /// Job ID.
        job_id: String,
    },

    /// List all jobs, newest first.
    List,

    /// Write the final document of a complete job.
    Export {
        /// Job ID.
        job_id: String,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "warn,recast=info",
        1 => "warn,recast=debug",
        _ => "info,recast=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db.as_deref();
    match cli.command {
        Command::Run {
            input,
            target_words,
            instructions,
            owner,
            out,
        } => cmd_run(db, &input, target_words, instructions, owner, out.as_deref()).await,
        Command::Resume { job_id, out } => cmd_resume(db, &job_id, out.as_deref()).await,
        Command::Status { job_id } => cmd_status(db, &job_id).await,
        Command::List => cmd_list(db).await,
        Command::Export { job_id, out } => cmd_export(db, &job_id, out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(db).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn db_path(db: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(resolve_db_path(config)?),
    }
}

async fn open_orchestrator(
    db: Option<&Path>,
    config: &AppConfig,
) -> Result<Orchestrator<OpenRouterOracle>> {
    let key = api_key(config)?;
    let oracle = OpenRouterOracle::new(OpenRouterOptions::from_config(config, key)?)?;
    let path = db_path(db, config)?;
    let storage = Storage::open(&path).await?;
    info!(db = %path.display(), model = %config.oracle.model, "orchestrator ready");
    Ok(Orchestrator::new(storage, oracle, PipelineConfig::from(config)))
}

async fn open_readonly(db: Option<&Path>) -> Result<Storage> {
    let config = load_config()?;
    let path = db_path(db, &config)?;
    if !path.exists() {
        return Err(eyre!("no job database at '{}'", path.display()));
    }
    Ok(Storage::open_readonly(&path).await?)
}

/// Cancel the returned token on Ctrl-C. The current chunk finishes first.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping before the next chunk");
            child.cancel();
        }
    });
    token
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .wrap_err("failed to read document from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(input).wrap_err_with(|| format!("failed to read '{}'", input.display()))
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text)
                .wrap_err_with(|| format!("failed to write '{}'", path.display()))?;
            eprintln!("  Output: {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// Report how to continue a job that stopped early.
fn explain_stop(err: RecastError) -> color_eyre::eyre::Report {
    if let RecastError::Cancelled { job_id, .. } = &err {
        eprintln!();
        eprintln!("  Stopped. Progress is saved; continue with:");
        eprintln!("    recast resume {job_id}");
        eprintln!();
    }
    err.into()
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    db: Option<&Path>,
    input: &Path,
    target_words: Option<u32>,
    instructions: String,
    owner: Option<String>,
    out: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let orchestrator = open_orchestrator(db, &config).await?;

    let request = JobRequest {
        input_text: read_input(input)?,
        custom_instructions: instructions,
        target_words,
        owner: owner.unwrap_or_else(|| config.defaults.owner.clone()),
    };

    info!(input = %input.display(), target_words, "starting job");

    let reporter = CliProgress::new();
    let cancel = cancel_on_ctrl_c();
    let outcome = orchestrator
        .run(&request, &reporter, &cancel)
        .await
        .map_err(|e| {
            reporter.abandon();
            explain_stop(e)
        })?;

    print_summary(&outcome);
    write_output(out, &outcome.final_output)
}

async fn cmd_resume(db: Option<&Path>, job_id: &str, out: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let job_id: JobId = job_id.parse()?;
    let orchestrator = open_orchestrator(db, &config).await?;

    info!(%job_id, "resuming job");

    let reporter = CliProgress::new();
    let cancel = cancel_on_ctrl_c();
    let outcome = orchestrator
        .resume(&job_id, &reporter, &cancel)
        .await
        .map_err(|e| {
            reporter.abandon();
            explain_stop(e)
        })?;

    print_summary(&outcome);
    write_output(out, &outcome.final_output)
}

async fn cmd_status(db: Option<&Path>, job_id: &str) -> Result<()> {
    let job_id: JobId = job_id.parse()?;
    let storage = open_readonly(db).await?;
    let job = storage.require_job(&job_id).await?;
    let chunks = storage.list_chunks(&job_id).await?;
    let plan = &job.plan;

    println!();
    println!("  Job:      {}", job.id);
    println!("  Owner:    {}", job.owner);
    println!("  Status:   {}", job.status);
    println!("  Created:  {}", job.created_at.to_rfc3339());
    println!("  Updated:  {}", job.updated_at.to_rfc3339());
    println!(
        "  Length:   {} -> {} words ({}..{}), ratio {:.2}, {}",
        plan.total_input_words,
        plan.target_mid_words,
        plan.target_min_words,
        plan.target_max_words,
        plan.length_ratio,
        plan.length_mode
    );
    println!(
        "  Chunks:   {} x ~{} words, current {}",
        plan.chunk_count, plan.chunk_target_words, job.current_chunk
    );
    match &job.skeleton {
        Some(skeleton) if skeleton.is_default() => println!("  Skeleton: default (extraction failed)"),
        Some(skeleton) => println!("  Skeleton: {} sections", skeleton.plan().outline.len()),
        None => println!("  Skeleton: not extracted"),
    }
    if let Some(words) = job.final_word_count {
        println!(
            "  Output:   {words} words, {} chunk(s) under target",
            job.under_target_chunks.unwrap_or(0)
        );
    }
    if let Some(report) = &job.stitch_report {
        println!(
            "  Report:   {} conflicts, {} redundancies, {} gaps, {} drifting terms",
            report.conflicts.len(),
            report.redundancies.len(),
            report.gaps.len(),
            report.terminology_drift.len()
        );
    }
    if let Some(error) = &job.last_error {
        println!("  Error:    {error}");
    }

    if !chunks.is_empty() {
        println!();
        println!(
            "  {:>3}  {:<9} {:>6} {:>13} {:>6} {:>7}  note",
            "#", "status", "input", "bounds", "words", "retries"
        );
        for chunk in &chunks {
            let note = match (&chunk.error_message, chunk.under_target) {
                (Some(error), _) => error.clone(),
                (None, true) => "under target".to_string(),
                (None, false) => String::new(),
            };
            println!(
                "  {:>3}  {:<9} {:>6} {:>13} {:>6} {:>7}  {note}",
                chunk.index,
                chunk.status.as_str(),
                chunk.input_words,
                format!("{}..{}", chunk.bounds.min_words, chunk.bounds.max_words),
                chunk.actual_words,
                chunk.retry_count
            );
        }
    }
    println!();
    Ok(())
}

async fn cmd_list(db: Option<&Path>) -> Result<()> {
    let storage = open_readonly(db).await?;
    let jobs = storage.list_jobs().await?;

    if jobs.is_empty() {
        println!("No jobs yet. Start one with `recast run --input <FILE>`.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<19} {:<21} {:>6} {:>8} {:>8}  created",
        "id", "status", "mode", "chunks", "input", "target"
    );
    for job in &jobs {
        println!(
            "{:<36}  {:<19} {:<21} {:>6} {:>8} {:>8}  {}",
            job.id,
            job.status.as_str(),
            job.length_mode,
            job.chunk_count,
            job.total_input_words,
            job.target_mid_words,
            job.created_at
        );
    }
    Ok(())
}

async fn cmd_export(db: Option<&Path>, job_id: &str, out: Option<&Path>) -> Result<()> {
    let job_id: JobId = job_id.parse()?;
    let storage = open_readonly(db).await?;
    let job = storage.require_job(&job_id).await?;

    let text = match (job.status, job.final_output) {
        (JobStatus::Complete, Some(text)) => text,
        (status, _) => {
            return Err(eyre!(
                "job {job_id} is {status}; only complete jobs can be exported (try `recast resume {job_id}`)"
            ));
        }
    };
    write_output(out, &text)
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(db: Option<&Path>) -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    println!("# database: {}", db_path(db, &config)?.display());
    match validate_api_key(&config) {
        Ok(()) => println!("# api key: found in ${}", config.oracle.api_key_env),
        Err(_) => println!("# api key: ${} is not set", config.oracle.api_key_env),
    }
    Ok(())
}

fn print_summary(outcome: &JobOutcome) {
    eprintln!();
    eprintln!("  Job complete!");
    eprintln!("  ID:      {}", outcome.job_id);
    eprintln!("  Mode:    {}", outcome.length_mode);
    eprintln!(
        "  Words:   {} (target {})",
        outcome.final_word_count, outcome.target_mid_words
    );
    eprintln!(
        "  Chunks:  {} ({} under target)",
        outcome.chunk_count, outcome.under_target_chunks
    );
    if outcome.default_skeleton {
        eprintln!("  Plan:    default skeleton (extraction failed)");
    }
    match &outcome.stitch_report {
        Some(report) => eprintln!("  Report:  {} issue(s)", report.issue_count()),
        None => eprintln!("  Report:  unavailable"),
    }
    eprintln!("  Time:    {:.1}s", outcome.elapsed.as_secs_f64());
    eprintln!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn chunk_started(&self, index: u32, total: u32) {
        self.spinner
            .set_message(format!("Generating chunk [{}/{total}]", index + 1));
    }

    fn chunk_retry(&self, index: u32, attempt: u32) {
        self.spinner.set_message(format!(
            "Chunk {} is short, expanding (retry {attempt})",
            index + 1
        ));
    }

    fn chunk_finished(&self, index: u32, words: u32, under_target: bool) {
        let flag = if under_target { "  (under target)" } else { "" };
        self.spinner
            .println(format!("  chunk {:>3}: {words} words{flag}", index + 1));
    }

    fn done(&self, _outcome: &JobOutcome) {
        self.spinner.finish_and_clear();
    }
}
