use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, debug_span, error, info, info_span, warn};

use crate::artifacts::{ArtifactSet, WorkItem, summarize_file};
use crate::cleanup::CleanupManager;
use crate::config::ToolchainConfig;
use crate::observability::MetricsCollector;
use crate::runlog::{RecordKind, RunLog};
use crate::runner::{Outcome, ProcessRunner, StageOutcome};
use crate::stages::{StageContext, StageSpec};

const OVERALL: &str = "OVERALL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Running(usize),
    Succeeded,
    Failed,
    Skipped,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Pending => "pending",
            PipelineState::Running(_) => "running",
            PipelineState::Succeeded => "succeeded",
            PipelineState::Failed => "failed",
            PipelineState::Skipped => "skipped",
        }
    }
}

/// Terminal record of one work item.
///
/// `outcomes` stops at the first stage that was not `normal`.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub root: String,
    pub state: PipelineState,
    pub outcomes: Vec<StageOutcome>,
    pub elapsed: Duration,
    pub log_path: PathBuf,
    pub certificate: PathBuf,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    pub fn is_failure(&self) -> bool {
        self.state == PipelineState::Failed
    }
}

/// Drives one work item through the stage sequence, stopping at the first
/// stage that does not finish normally.
pub struct PipelineSequencer<'a> {
    config: &'a ToolchainConfig,
    stages: Vec<StageSpec>,
    runner: ProcessRunner,
    metrics: MetricsCollector,
}

impl<'a> PipelineSequencer<'a> {
    pub fn new(config: &'a ToolchainConfig, stages: Vec<StageSpec>) -> Self {
        Self {
            config,
            stages,
            runner: ProcessRunner::new(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn run_item(&self, item: &WorkItem) -> PipelineResult {
        let span = info_span!("item", root = %item.root);
        let _guard = span.enter();
        let started = Instant::now();
        let artifacts = ArtifactSet::new(item, self.config);
        let log_path = artifacts.run_log();

        let finish = |state: PipelineState, outcomes: Vec<StageOutcome>| {
            self.metrics.record_item(state);
            PipelineResult {
                root: item.root.clone(),
                state,
                outcomes,
                elapsed: started.elapsed(),
                log_path: log_path.clone(),
                certificate: artifacts.certificate(),
            }
        };

        if !item.force && log_path.exists() {
            info!(log = %log_path.display(), "Already have log file. Skipping item");
            return finish(PipelineState::Skipped, Vec::new());
        }

        let mut log = match RunLog::create(&log_path) {
            Ok(log) => log,
            Err(err) => {
                error!(log = %log_path.display(), error = %err, "Couldn't open log file");
                return finish(PipelineState::Failed, Vec::new());
            }
        };

        let ctx = StageContext {
            item,
            artifacts: &artifacts,
            config: self.config,
        };
        let mut cleanup = CleanupManager::new(self.config.cleanup);
        let mut outcomes = Vec::with_capacity(self.stages.len());
        let mut state = PipelineState::Running(0);

        while let PipelineState::Running(index) = state {
            let Some(stage) = self.stages.get(index) else {
                state = PipelineState::Succeeded;
                break;
            };
            state = match self.run_stage(stage, &ctx, &mut log, &mut cleanup) {
                Ok(outcome) => {
                    let normal = outcome.is_normal();
                    outcomes.push(outcome);
                    if normal {
                        self.advance(index)
                    } else {
                        PipelineState::Failed
                    }
                }
                Err(err) => {
                    warn!(stage = %stage.prefix, error = %err, "Run log write failed");
                    PipelineState::Failed
                }
            };
        }

        let elapsed = started.elapsed().as_secs_f64();
        let overall = if state == PipelineState::Succeeded {
            Outcome::Normal
        } else {
            Outcome::Failed
        };
        if let Err(err) = write_overall(log, elapsed, overall) {
            warn!(log = %log_path.display(), error = %err, "Failed to finalize run log");
        }
        let removed = cleanup.purge();
        if removed > 0 {
            debug!(removed, "Removed intermediate artifacts");
        }

        info!(outcome = %overall, elapsed_s = elapsed, log = %log_path.display(), "Item finished");
        finish(state, outcomes)
    }

    fn advance(&self, index: usize) -> PipelineState {
        if index + 1 < self.stages.len() {
            PipelineState::Running(index + 1)
        } else {
            PipelineState::Succeeded
        }
    }

    fn run_stage(
        &self,
        stage: &StageSpec,
        ctx: &StageContext<'_>,
        log: &mut RunLog,
        cleanup: &mut CleanupManager,
    ) -> io::Result<StageOutcome> {
        let output = stage.produces.map(|kind| ctx.artifacts.path(kind));
        if stage.skip_if_present
            && !ctx.item.force
            && let Some(path) = &output
            && path.exists()
        {
            debug!(
                stage = %stage.prefix,
                output = %path.display(),
                "Output present; stage skipped"
            );
            log.record(
                &stage.prefix,
                RecordKind::Log,
                format_args!("Output {} already present", path.display()),
            )?;
            log.record(&stage.prefix, RecordKind::Outcome, Outcome::Normal)?;
            return Ok(StageOutcome {
                stage: stage.prefix.clone(),
                outcome: Outcome::Normal,
                exit_code: None,
                elapsed: Duration::ZERO,
            });
        }

        let span = debug_span!("stage", stage = %stage.prefix);
        let _span_guard = span.enter();
        let command = stage.command(ctx);
        let limit = self.config.time_limits.limit_for(&stage.limit_key);
        let aux_log = stage.aux_log.map(|kind| ctx.artifacts.path(kind));

        let outcome = {
            let _timer = self.metrics.start_stage(&stage.prefix);
            self.runner.run(
                &stage.prefix,
                &ctx.item.root,
                &command,
                log,
                limit,
                aux_log.as_deref(),
            )?
        };
        self.metrics.record_outcome(&stage.prefix, outcome.outcome);

        if outcome.is_normal()
            && let (Some(label), Some(path)) = (&stage.summary_label, &output)
        {
            log_summary(log, &ctx.item.root, label, path)?;
        }
        if stage.intermediate
            && let Some(path) = output
        {
            cleanup.register(path);
        }
        Ok(outcome)
    }
}

fn log_summary(log: &mut RunLog, root: &str, label: &str, path: &Path) -> io::Result<()> {
    match summarize_file(path) {
        Ok(summary) => {
            info!(
                file = %path.display(),
                lines = summary.lines,
                bytes = summary.bytes,
                "{root}. {label}: size"
            );
            log.line(format_args!(
                "{root}. {label}: LOG: size {} {} lines {} bytes",
                path.display(),
                summary.lines,
                summary.bytes
            ))
        }
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Expected stage output is unreadable");
            log.record(
                label,
                RecordKind::Error,
                format_args!("Couldn't read {}: {err}", path.display()),
            )
        }
    }
}

fn write_overall(mut log: RunLog, elapsed: f64, outcome: Outcome) -> io::Result<()> {
    log.record(
        OVERALL,
        RecordKind::Log,
        format_args!("Elapsed time = {elapsed:.3} seconds"),
    )?;
    log.record(OVERALL, RecordKind::Outcome, outcome)?;
    log.close()
}
