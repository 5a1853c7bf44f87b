use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::pipeline::PipelineState;
use crate::runner::Outcome;

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageMetrics>,
    pub items: ItemCounts,
    pub total_duration_ms: f64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct StageMetrics {
    pub calls: u64,
    pub normal: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Serialize, Clone, PartialEq, Eq)]
pub struct ItemCounts {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Shared across workers; every update takes the inner lock briefly.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_stage(&self, stage_name: &str) -> StageTimer {
        StageTimer {
            stage: stage_name.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record_outcome(&self, stage_name: &str, outcome: Outcome) {
        if let Ok(mut guard) = self.inner.lock() {
            let metrics = guard.stages.entry(stage_name.to_string()).or_default();
            match outcome {
                Outcome::Normal => metrics.normal += 1,
                Outcome::Failed => metrics.failed += 1,
                Outcome::Timeout => metrics.timeouts += 1,
            }
        }
    }

    pub fn record_item(&self, state: PipelineState) {
        if let Ok(mut guard) = self.inner.lock() {
            match state {
                PipelineState::Succeeded => guard.items.succeeded += 1,
                PipelineState::Failed => guard.items.failed += 1,
                PipelineState::Skipped => guard.items.skipped += 1,
                PipelineState::Pending | PipelineState::Running(_) => {}
            }
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

pub struct StageTimer {
    stage: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl StageTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.stages.entry(self.stage.clone()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(
            stage = self.stage.as_str(),
            duration_ms, "Stage duration recorded"
        );
        self.recorded = true;
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        succeeded = snapshot.items.succeeded,
        failed = snapshot.items.failed,
        skipped = snapshot.items.skipped,
        "Batch metrics summary"
    );
    for (stage, metrics) in &snapshot.stages {
        info!(
            stage = stage.as_str(),
            calls = metrics.calls,
            normal = metrics.normal,
            failed = metrics.failed,
            timeouts = metrics.timeouts,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Stage metrics"
        );
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        output.push_str("# HELP toolchain_items_total Work items by terminal state\n");
        output.push_str("# TYPE toolchain_items_total counter\n");
        for (state, count) in [
            ("succeeded", self.items.succeeded),
            ("failed", self.items.failed),
            ("skipped", self.items.skipped),
        ] {
            let _ = writeln!(output, "toolchain_items_total{{state=\"{state}\"}} {count}");
        }
        output.push_str("# HELP toolchain_stage_calls_total Stage invocation count\n");
        output.push_str("# TYPE toolchain_stage_calls_total counter\n");
        output.push_str("# HELP toolchain_stage_outcomes_total Stage outcomes by kind\n");
        output.push_str("# TYPE toolchain_stage_outcomes_total counter\n");
        output.push_str(
            "# HELP toolchain_stage_duration_seconds_total Accumulated stage duration in seconds\n",
        );
        output.push_str("# TYPE toolchain_stage_duration_seconds_total counter\n");
        output.push_str(
            "# HELP toolchain_stage_duration_seconds_max Maximum stage duration in seconds\n",
        );
        output.push_str("# TYPE toolchain_stage_duration_seconds_max gauge\n");
        for (stage, metrics) in &self.stages {
            let _ = writeln!(
                output,
                "toolchain_stage_calls_total{{stage=\"{stage}\"}} {}",
                metrics.calls
            );
            for (outcome, count) in [
                ("normal", metrics.normal),
                ("failed", metrics.failed),
                ("timeout", metrics.timeouts),
            ] {
                let _ = writeln!(
                    output,
                    "toolchain_stage_outcomes_total{{stage=\"{stage}\",outcome=\"{outcome}\"}} {count}"
                );
            }
            let _ = writeln!(
                output,
                "toolchain_stage_duration_seconds_total{{stage=\"{stage}\"}} {:.6}",
                metrics.total_duration_ms / 1_000.0
            );
            let _ = writeln!(
                output,
                "toolchain_stage_duration_seconds_max{{stage=\"{stage}\"}} {:.6}",
                metrics.max_duration_ms / 1_000.0
            );
        }
        output.push_str("# HELP toolchain_batch_duration_seconds Total batch duration\n");
        output.push_str("# TYPE toolchain_batch_duration_seconds gauge\n");
        let _ = writeln!(
            output,
            "toolchain_batch_duration_seconds {:.6}",
            self.total_duration_ms / 1_000.0
        );
        output
    }
}
