use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::ToolchainConfig;
use crate::digest::certificate_digest;
use crate::pipeline::{PipelineResult, PipelineState};
use crate::runner::{Outcome, StageOutcome};
use crate::scheduler::BatchSummary;

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub config: ToolchainConfig,
    pub summary: ReportSummary,
    pub items: Vec<ItemEntry>,
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_started: usize,
    pub aborted_at: Option<String>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct ItemEntry {
    pub root: String,
    pub status: PipelineState,
    pub elapsed_secs: f64,
    pub log: PathBuf,
    pub stages: Vec<StageEntry>,
    /// Present only for items whose pipeline succeeded.
    pub certificate_sha256: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StageEntry {
    pub stage: String,
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    pub elapsed_secs: f64,
}

impl From<&StageOutcome> for StageEntry {
    fn from(outcome: &StageOutcome) -> Self {
        Self {
            stage: outcome.stage.clone(),
            outcome: outcome.outcome,
            exit_code: outcome.exit_code,
            elapsed_secs: outcome.elapsed.as_secs_f64(),
        }
    }
}

impl ItemEntry {
    fn from_result(result: &PipelineResult) -> Self {
        let certificate_sha256 = if result.success() {
            certificate_digest(&result.certificate)
                .map_err(|err| {
                    warn!(root = %result.root, error = %err, "Certificate digest unavailable");
                })
                .ok()
        } else {
            None
        };
        Self {
            root: result.root.clone(),
            status: result.state,
            elapsed_secs: result.elapsed.as_secs_f64(),
            log: result.log_path.clone(),
            stages: result.outcomes.iter().map(StageEntry::from).collect(),
            certificate_sha256,
        }
    }
}

impl BatchReport {
    pub fn from_summary(summary: &BatchSummary, config: &ToolchainConfig) -> Self {
        Self {
            generated_at: Utc::now(),
            config: config.clone(),
            summary: ReportSummary {
                succeeded: summary.succeeded,
                failed: summary.failed,
                skipped: summary.skipped,
                not_started: summary.not_started,
                aborted_at: summary.aborted_at.clone(),
                elapsed_secs: summary.elapsed.as_secs_f64(),
            },
            items: summary.results.iter().map(ItemEntry::from_result).collect(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create report directory: {}", parent.display())
            })?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create report file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to write report JSON: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn report_includes_digest_only_for_successes() {
        let temp = tempdir().unwrap();
        let certificate = temp.path().join("ok.scpog");
        std::fs::write(&certificate, b"abc").unwrap();

        let result = |root: &str, state| PipelineResult {
            root: root.to_string(),
            state,
            outcomes: vec![StageOutcome {
                stage: "D4".into(),
                outcome: Outcome::Normal,
                exit_code: Some(0),
                elapsed: Duration::from_millis(5),
            }],
            elapsed: Duration::from_millis(10),
            log_path: temp.path().join(format!("{root}.log")),
            certificate: certificate.clone(),
        };
        let summary = BatchSummary {
            results: vec![
                result("ok", PipelineState::Succeeded),
                result("bad", PipelineState::Failed),
            ],
            succeeded: 1,
            failed: 1,
            ..Default::default()
        };

        let report = BatchReport::from_summary(&summary, &ToolchainConfig::default());
        assert_eq!(
            report.items[0].certificate_sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert!(report.items[1].certificate_sha256.is_none());

        let path = temp.path().join("out/report.json");
        report.write(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["items"][1]["status"], "failed");
        assert_eq!(json["items"][0]["stages"][0]["outcome"], "normal");
        assert_eq!(json["config"]["mode"], "hybrid");
    }
}
