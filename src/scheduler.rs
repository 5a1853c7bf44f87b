use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::artifacts::WorkItem;
use crate::config::ToolchainConfig;
use crate::gate::BlockingGate;
use crate::pipeline::{PipelineResult, PipelineSequencer, PipelineState};

/// Anything that can take a work item to a terminal state.
pub trait ItemRunner: Sync {
    fn run_item(&self, item: &WorkItem) -> PipelineResult;
}

impl ItemRunner for PipelineSequencer<'_> {
    fn run_item(&self, item: &WorkItem) -> PipelineResult {
        PipelineSequencer::run_item(self, item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One item at a time, in input order.
    Sequential { fail_fast: bool },
    /// A fixed pool of workers draining a shared FIFO queue. Never fail-fast.
    Parallel { workers: usize },
}

impl DispatchMode {
    pub fn from_config(config: &ToolchainConfig) -> Self {
        match config.workers {
            Some(workers) if workers > 1 => DispatchMode::Parallel { workers },
            _ => DispatchMode::Sequential {
                fail_fast: config.fail_fast,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// In input order; items never started are absent.
    pub results: Vec<PipelineResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Root whose failure stopped a fail-fast batch.
    pub aborted_at: Option<String>,
    pub not_started: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    fn from_results(results: Vec<PipelineResult>, elapsed: Duration) -> Self {
        let count = |state| results.iter().filter(|r| r.state == state).count();
        Self {
            succeeded: count(PipelineState::Succeeded),
            failed: count(PipelineState::Failed),
            skipped: count(PipelineState::Skipped),
            results,
            aborted_at: None,
            not_started: 0,
            elapsed,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.aborted_at.is_none()
    }
}

pub struct JobScheduler {
    mode: DispatchMode,
    gate: Option<BlockingGate>,
}

impl JobScheduler {
    pub fn new(mode: DispatchMode) -> Self {
        Self { mode, gate: None }
    }

    /// Consult `gate` before each item starts.
    pub fn with_gate(mut self, gate: BlockingGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Blocks until every dispatched item is terminal.
    pub fn run_batch<R: ItemRunner>(&self, items: Vec<WorkItem>, runner: &R) -> BatchSummary {
        let started = Instant::now();
        let roots: Vec<&str> = items.iter().map(|item| item.root.as_str()).collect();
        info!(count = items.len(), "Running on roots {roots:?}");

        let summary = match self.mode {
            DispatchMode::Sequential { fail_fast } => {
                self.run_sequential(items, runner, fail_fast, started)
            }
            DispatchMode::Parallel { workers } => {
                self.run_parallel(items, runner, workers, started)
            }
        };
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            not_started = summary.not_started,
            elapsed_s = summary.elapsed.as_secs_f64(),
            "Batch finished"
        );
        summary
    }

    fn dispatch<R: ItemRunner>(&self, item: &WorkItem, runner: &R) -> PipelineResult {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        runner.run_item(item)
    }

    fn run_sequential<R: ItemRunner>(
        &self,
        items: Vec<WorkItem>,
        runner: &R,
        fail_fast: bool,
        started: Instant,
    ) -> BatchSummary {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut aborted_at = None;
        for item in &items {
            let result = self.dispatch(item, runner);
            let failed = result.is_failure();
            results.push(result);
            if failed && fail_fast {
                error!(root = %item.root, "Error encountered. Exiting");
                aborted_at = Some(item.root.clone());
                break;
            }
        }
        let not_started = total - results.len();
        let mut summary = BatchSummary::from_results(results, started.elapsed());
        summary.aborted_at = aborted_at;
        summary.not_started = not_started;
        summary
    }

    fn run_parallel<R: ItemRunner>(
        &self,
        items: Vec<WorkItem>,
        runner: &R,
        workers: usize,
        started: Instant,
    ) -> BatchSummary {
        let queue: Mutex<VecDeque<(usize, WorkItem)>> =
            Mutex::new(items.into_iter().enumerate().collect());
        let (sender, receiver) = mpsc::channel();

        thread::scope(|scope| {
            for worker in 0..workers {
                let sender = sender.clone();
                let queue = &queue;
                scope.spawn(move || {
                    loop {
                        let next = queue.lock().ok().and_then(|mut pending| pending.pop_front());
                        let Some((index, item)) = next else {
                            break;
                        };
                        tracing::debug!(worker, root = %item.root, "Worker claimed item");
                        let result = self.dispatch(&item, runner);
                        if sender.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(sender);

        let mut indexed: Vec<(usize, PipelineResult)> = receiver.into_iter().collect();
        indexed.sort_by_key(|(index, _)| *index);
        let results = indexed.into_iter().map(|(_, result)| result).collect();
        BatchSummary::from_results(results, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_worker_stays_sequential() {
        let mut config = ToolchainConfig {
            fail_fast: true,
            ..Default::default()
        };
        assert_eq!(
            DispatchMode::from_config(&config),
            DispatchMode::Sequential { fail_fast: true }
        );
        config.workers = Some(1);
        assert_eq!(
            DispatchMode::from_config(&config),
            DispatchMode::Sequential { fail_fast: true }
        );
        config.workers = Some(4);
        assert_eq!(
            DispatchMode::from_config(&config),
            DispatchMode::Parallel { workers: 4 }
        );
    }
}
