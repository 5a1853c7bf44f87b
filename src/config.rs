use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// How the generator partitions its proof obligations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    Monolithic,
    Structured,
    #[default]
    Hybrid,
}

impl GenerationMode {
    /// `(monolithic_threshold, tree_ratio_threshold)` handed to the generator.
    pub fn thresholds(self) -> (i64, f64) {
        match self {
            GenerationMode::Monolithic => (-1, 1e12),
            GenerationMode::Structured => (1, 0.0),
            GenerationMode::Hybrid => (1_000_000, 5.0),
        }
    }

    pub fn log_prefix(self) -> &'static str {
        match self {
            GenerationMode::Monolithic => "mono_",
            GenerationMode::Structured => "structured_",
            GenerationMode::Hybrid => "",
        }
    }
}

/// Per-stage wall-clock limits, keyed by the stage's limit key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeLimits {
    pub default_secs: u64,
    /// Entries from a config file are layered over the built-in limits.
    #[serde(deserialize_with = "merge_stage_limits")]
    pub stages: BTreeMap<String, u64>,
}

impl Default for TimeLimits {
    fn default() -> Self {
        Self {
            default_secs: 600,
            stages: default_stage_limits(),
        }
    }
}

fn default_stage_limits() -> BTreeMap<String, u64> {
    [("D4", 2_000), ("GEN", 10_000), ("CHECK", 30_000), ("CAKEML", 10_000)]
        .into_iter()
        .map(|(key, secs)| (key.to_string(), secs))
        .collect()
}

fn merge_stage_limits<'de, D>(deserializer: D) -> Result<BTreeMap<String, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut stages = default_stage_limits();
    stages.extend(BTreeMap::<String, u64>::deserialize(deserializer)?);
    Ok(stages)
}

impl TimeLimits {
    pub fn secs_for(&self, key: &str) -> u64 {
        self.stages.get(key).copied().unwrap_or(self.default_secs)
    }

    pub fn limit_for(&self, key: &str) -> Duration {
        Duration::from_secs(self.secs_for(key))
    }

    /// Replace every stage limit, and the fallback, with `secs`.
    pub fn override_all(&mut self, secs: u64) {
        self.default_secs = secs;
        for value in self.stages.values_mut() {
            *value = secs;
        }
    }
}

/// Batch-wide settings. Built once before the batch starts and only ever
/// shared by reference afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub verbosity: u32,
    pub time_limits: TimeLimits,
    pub deletion_threads: u32,
    pub forward_only: bool,
    pub mode: GenerationMode,
    pub clause_limit: u64,
    pub workers: Option<usize>,
    pub fail_fast: bool,
    pub force: bool,
    pub cleanup: bool,
    pub block_file: PathBuf,
    pub block_poll_secs: u64,
    pub tools_dir: Option<PathBuf>,
    pub home: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            verbosity: 2,
            time_limits: TimeLimits::default(),
            deletion_threads: 7,
            forward_only: false,
            mode: GenerationMode::default(),
            clause_limit: (1 << 31) - 1,
            workers: None,
            fail_fast: false,
            force: false,
            cleanup: false,
            block_file: PathBuf::from("./block.txt"),
            block_poll_secs: 60,
            tools_dir: None,
            home: PathBuf::from("."),
        }
    }
}

impl ToolchainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ToolchainConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config)
    }

    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_secs(self.block_poll_secs)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(verbosity) = overrides.verbosity {
            self.verbosity = verbosity;
        }
        if let Some(secs) = overrides.time_limit {
            self.time_limits.override_all(secs);
        }
        if let Some(threads) = overrides.deletion_threads {
            self.deletion_threads = threads;
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(workers) = overrides.workers {
            self.workers = Some(workers);
        }
        if let Some(path) = overrides.block_file {
            self.block_file = path;
        }
        if let Some(secs) = overrides.block_poll_secs {
            self.block_poll_secs = secs;
        }
        if let Some(dir) = overrides.tools_dir {
            self.tools_dir = Some(dir);
        }
        if let Some(home) = overrides.home {
            self.home = home;
        }
        self.forward_only |= overrides.forward_only;
        self.fail_fast |= overrides.fail_fast;
        self.force |= overrides.force;
        self.cleanup |= overrides.cleanup;
    }
}

/// Command-line values layered over a loaded (or default) config.
/// Flags can only switch boolean settings on.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub verbosity: Option<u32>,
    pub time_limit: Option<u64>,
    pub deletion_threads: Option<u32>,
    pub mode: Option<GenerationMode>,
    pub workers: Option<usize>,
    pub block_file: Option<PathBuf>,
    pub block_poll_secs: Option<u64>,
    pub tools_dir: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub forward_only: bool,
    pub fail_fast: bool,
    pub force: bool,
    pub cleanup: bool,
}
