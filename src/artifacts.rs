use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{GenerationMode, ToolchainConfig};

/// One root to push through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub root: String,
    pub home: PathBuf,
    pub force: bool,
}

impl WorkItem {
    pub fn new(root: impl Into<String>, home: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            root: root.into(),
            home: home.into(),
            force,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Input problem (`.cnf`).
    Problem,
    /// Compiled decision diagram (`.nnf` / `.snnf`).
    Diagram,
    /// Proof certificate (`.cpog` / `.scpog`).
    Certificate,
    RunLog,
    GeneratorLog,
    CheckerLog,
}

/// File names derived from a work item and the batch mode flags.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    root: String,
    home: PathBuf,
    forward_only: bool,
    mode: GenerationMode,
}

impl ArtifactSet {
    pub fn new(item: &WorkItem, config: &ToolchainConfig) -> Self {
        Self {
            root: item.root.clone(),
            home: item.home.clone(),
            forward_only: config.forward_only,
            mode: config.mode,
        }
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        let extension = match kind {
            ArtifactKind::Problem => "cnf".to_string(),
            ArtifactKind::Diagram if self.forward_only => "nnf".to_string(),
            ArtifactKind::Diagram => "snnf".to_string(),
            ArtifactKind::Certificate if self.forward_only => "cpog".to_string(),
            ArtifactKind::Certificate => "scpog".to_string(),
            ArtifactKind::RunLog => {
                let forward = if self.forward_only { "forward_" } else { "" };
                format!("{}{forward}log", self.mode.log_prefix())
            }
            ArtifactKind::GeneratorLog => "generate.log".to_string(),
            ArtifactKind::CheckerLog => "check.log".to_string(),
        };
        self.home.join(format!("{}.{extension}", self.root))
    }

    pub fn problem(&self) -> PathBuf {
        self.path(ArtifactKind::Problem)
    }

    pub fn diagram(&self) -> PathBuf {
        self.path(ArtifactKind::Diagram)
    }

    pub fn certificate(&self) -> PathBuf {
        self.path(ArtifactKind::Certificate)
    }

    pub fn run_log(&self) -> PathBuf {
        self.path(ArtifactKind::RunLog)
    }
}

/// Non-comment line and byte counts of a produced artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub lines: u64,
    pub bytes: u64,
}

const COMMENT_CHAR: u8 = b'c';

pub fn summarize_file(path: &Path) -> io::Result<FileSummary> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut summary = FileSummary::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }
        if line.first() == Some(&COMMENT_CHAR) {
            continue;
        }
        summary.lines += 1;
        summary.bytes += read as u64;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifacts(forward_only: bool, mode: GenerationMode) -> ArtifactSet {
        let config = ToolchainConfig {
            forward_only,
            mode,
            ..Default::default()
        };
        ArtifactSet::new(&WorkItem::new("bench", "/data", false), &config)
    }

    #[test]
    fn full_mode_uses_structured_extensions() {
        let set = artifacts(false, GenerationMode::Hybrid);
        assert_eq!(set.problem(), PathBuf::from("/data/bench.cnf"));
        assert_eq!(set.diagram(), PathBuf::from("/data/bench.snnf"));
        assert_eq!(set.certificate(), PathBuf::from("/data/bench.scpog"));
        assert_eq!(set.run_log(), PathBuf::from("/data/bench.log"));
    }

    #[test]
    fn forward_only_and_mode_shape_names() {
        let set = artifacts(true, GenerationMode::Monolithic);
        assert_eq!(set.diagram(), PathBuf::from("/data/bench.nnf"));
        assert_eq!(set.certificate(), PathBuf::from("/data/bench.cpog"));
        assert_eq!(set.run_log(), PathBuf::from("/data/bench.mono_forward_log"));

        let set = artifacts(false, GenerationMode::Structured);
        assert_eq!(set.run_log(), PathBuf::from("/data/bench.structured_log"));
        assert_eq!(
            set.path(ArtifactKind::GeneratorLog),
            PathBuf::from("/data/bench.generate.log")
        );
    }

    #[test]
    fn summary_skips_comment_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("x.nnf");
        std::fs::write(&path, "c header\no 1 0\nt 2 0\nc trailer\n").unwrap();
        let summary = summarize_file(&path).unwrap();
        assert_eq!(summary, FileSummary { lines: 2, bytes: 12 });
    }
}
