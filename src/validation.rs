use serde::Serialize;

use crate::config::ToolchainConfig;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_config(config: &ToolchainConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    report.merge(validate_time_limits(config));

    if config.workers == Some(0) {
        report
            .errors
            .push("Worker count must be at least 1".into());
    }

    if config.deletion_threads == 0 {
        report
            .errors
            .push("Deletion thread count must be at least 1".into());
    }

    if config.block_file.as_os_str().is_empty() {
        report
            .errors
            .push("Block file path cannot be empty".into());
    }

    if config.fail_fast
        && let Some(workers) = config.workers
        && workers > 1
    {
        report.warnings.push(format!(
            "fail_fast has no effect with {workers} parallel workers"
        ));
    }

    if config.block_poll_secs == 0 {
        report
            .warnings
            .push("Block poll interval of 0 seconds busy-waits while blocked".into());
    }

    report
}

fn validate_time_limits(config: &ToolchainConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    if config.time_limits.default_secs == 0 {
        report
            .errors
            .push("Default time limit must be greater than 0 seconds".into());
    }
    for (key, secs) in &config.time_limits.stages {
        if *secs == 0 {
            report
                .errors
                .push(format!("Time limit for stage '{key}' must be greater than 0 seconds"));
        }
    }
    report
}
