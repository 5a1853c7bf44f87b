use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueHint};
use proof_toolchain::artifacts::{ArtifactSet, WorkItem};
use proof_toolchain::config::{ConfigOverrides, GenerationMode, ToolchainConfig};
use proof_toolchain::error::ConfigError;
use proof_toolchain::gate::BlockingGate;
use proof_toolchain::inputs::{collect_roots, expand_patterns, load_name_file};
use proof_toolchain::observability::{MetricsCollector, MetricsSnapshot, log_snapshot};
use proof_toolchain::pipeline::PipelineSequencer;
use proof_toolchain::report::BatchReport;
use proof_toolchain::scheduler::{DispatchMode, JobScheduler};
use proof_toolchain::stages::{StageContext, StageSet};
use proof_toolchain::tools::ToolPaths;
use proof_toolchain::validation::{ValidationReport, validate_config};
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Run(args) => run_batch(args),
        Commands::ListStages { config, tools_dir } => list_stages(config, tools_dir),
        Commands::Validate { config } => validate_config_cmd(config),
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ToolchainConfig> {
    match path {
        Some(path) => ToolchainConfig::load(path),
        None => Ok(ToolchainConfig::default()),
    }
}

fn report_validation(source: &str, report: &ValidationReport) -> Result<()> {
    for warning in &report.warnings {
        warn!(config = source, "{warning}");
    }
    if report.is_ok() {
        return Ok(());
    }
    for error_msg in &report.errors {
        error!(config = source, "{error_msg}");
    }
    Err(ConfigError::Invalid(format!(
        "validation failed with {} error(s)",
        report.errors.len()
    ))
    .into())
}

fn run_batch(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.apply(args.overrides());
    let source = args
        .config
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<defaults>".into());
    report_validation(&source, &validate_config(&config))?;

    // Every collaborator must exist before any item starts.
    let tools = ToolPaths::from_config(&config)?;

    let mut names = args.files.clone();
    if let Some(path) = &args.names {
        names.extend(load_name_file(path)?);
    }
    if !args.patterns.is_empty() {
        names.extend(expand_patterns(&args.patterns)?);
    }
    let roots = collect_roots(&names);
    if roots.is_empty() {
        warn!("No inputs given. Nothing to process.");
        return Ok(());
    }

    let items: Vec<WorkItem> = roots
        .into_iter()
        .map(|root| WorkItem::new(root, &config.home, config.force))
        .collect();

    let metrics = MetricsCollector::new();
    let sequencer =
        PipelineSequencer::new(&config, StageSet::standard(&tools)).with_metrics(metrics.clone());
    let scheduler = JobScheduler::new(DispatchMode::from_config(&config))
        .with_gate(BlockingGate::from_config(&config));

    let summary = scheduler.run_batch(items, &sequencer);
    metrics.record_total_duration(summary.elapsed);

    for result in &summary.results {
        info!(
            root = %result.root,
            state = result.state.as_str(),
            log = %result.log_path.display(),
            "Item result"
        );
    }
    if let Some(root) = &summary.aborted_at {
        error!(
            root = %root,
            not_started = summary.not_started,
            "Batch aborted after failure"
        );
    }
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "Batch complete"
    );

    write_metrics(&args, &metrics.snapshot())?;
    if let Some(path) = &args.report {
        BatchReport::from_summary(&summary, &config).write(path)?;
        info!(report = %path.display(), "Batch report written");
    }

    Ok(())
}

fn write_metrics(args: &RunArgs, snapshot: &MetricsSnapshot) -> Result<()> {
    if args.print_metrics {
        log_snapshot(snapshot);
    }
    if let Some(path) = &args.metrics_json {
        ensure_parent(path)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
        to_writer_pretty(file, snapshot)
            .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
        info!(metrics = %path.display(), "Metrics JSON written");
    }
    if let Some(path) = &args.metrics_prometheus {
        ensure_parent(path)?;
        std::fs::write(path, snapshot.to_prometheus())
            .with_context(|| format!("Failed to write Prometheus metrics: {}", path.display()))?;
        info!(metrics = %path.display(), "Prometheus metrics written");
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create metrics directory: {}", parent.display())
        })?;
    }
    Ok(())
}

fn list_stages(config_path: Option<PathBuf>, tools_dir: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if tools_dir.is_some() {
        config.tools_dir = tools_dir;
    }
    let tools = ToolPaths::from_config(&config)?;

    let item = WorkItem::new("<root>", &config.home, config.force);
    let artifacts = ArtifactSet::new(&item, &config);
    let ctx = StageContext {
        item: &item,
        artifacts: &artifacts,
        config: &config,
    };

    println!("Stages:");
    for stage in StageSet::standard(&tools) {
        println!(
            "- {} (limit {}s, reads {:?}): {}",
            stage.prefix,
            config.time_limits.secs_for(&stage.limit_key),
            stage.reads,
            stage.command(&ctx)
        );
    }
    Ok(())
}

fn validate_config_cmd(config_path: PathBuf) -> Result<()> {
    let config = ToolchainConfig::load(&config_path)?;
    let source = config_path.display().to_string();
    report_validation(&source, &validate_config(&config))?;
    info!(file = %source, "Config validation passed");
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "proof-toolchain",
    version,
    about = "Runs the compile, generate, check and validate proof pipeline over a batch of formulas"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over every input root.
    Run(RunArgs),
    /// Print the stage sequence with effective time limits.
    ListStages {
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
        #[arg(long = "tools-dir", value_hint = ValueHint::DirPath)]
        tools_dir: Option<PathBuf>,
    },
    /// Load a config file and report problems without running anything.
    Validate {
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Problem files; the root is the name without its last extension.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    files: Vec<String>,
    /// File listing one root name per line.
    #[arg(short = 'l', long = "names", value_hint = ValueHint::FilePath)]
    names: Option<PathBuf>,
    /// Glob pattern selecting problem files. May be repeated.
    #[arg(long = "pattern")]
    patterns: Vec<String>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
    #[arg(short = 'v', long)]
    verbosity: Option<u32>,
    /// Replace every stage time limit (seconds).
    #[arg(short = 't', long = "time-limit")]
    time_limit: Option<u64>,
    #[arg(short = 'n', long = "deletion-threads")]
    deletion_threads: Option<u32>,
    #[arg(short = 'F', long = "forward-only")]
    forward_only: bool,
    #[arg(short = 'm', long, value_enum)]
    mode: Option<GenerationMode>,
    #[arg(short = 'j', long)]
    workers: Option<usize>,
    #[arg(short = 'x', long = "fail-fast")]
    fail_fast: bool,
    /// Delete intermediate artifacts after each item.
    #[arg(short = 'R', long)]
    cleanup: bool,
    /// Rerun items whose log already exists.
    #[arg(long)]
    force: bool,
    #[arg(long = "block-file", value_hint = ValueHint::FilePath)]
    block_file: Option<PathBuf>,
    #[arg(long = "block-poll-secs")]
    block_poll_secs: Option<u64>,
    #[arg(long = "tools-dir", value_hint = ValueHint::DirPath)]
    tools_dir: Option<PathBuf>,
    /// Working directory for every item's artifacts and logs.
    #[arg(long, value_hint = ValueHint::DirPath)]
    home: Option<PathBuf>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json")]
    metrics_json: Option<PathBuf>,
    #[arg(long = "metrics-prometheus")]
    metrics_prometheus: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            verbosity: self.verbosity,
            time_limit: self.time_limit,
            deletion_threads: self.deletion_threads,
            mode: self.mode,
            workers: self.workers,
            block_file: self.block_file.clone(),
            block_poll_secs: self.block_poll_secs,
            tools_dir: self.tools_dir.clone(),
            home: self.home.clone(),
            forward_only: self.forward_only,
            fail_fast: self.fail_fast,
            force: self.force,
            cleanup: self.cleanup,
        }
    }
}
