use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::ToolchainConfig;
use crate::error::ConfigError;

/// `(stage, subdirectory, program)` for every external collaborator.
const TOOLS: [(&str, &str, &str); 4] = [
    ("D4", "d4v2-modified", "d4v2-mod"),
    ("GEN", "cpog/generator", "cpog-generate"),
    ("CHECK", "cpog/checker", "cpog-check"),
    ("CAKEML", "cake_scpog", "cake_scpog"),
];

/// Resolved locations of the four stage programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub compiler: PathBuf,
    pub generator: PathBuf,
    pub checker: PathBuf,
    pub validator: PathBuf,
}

impl ToolPaths {
    /// Resolve every program under `root`, failing on the first one missing.
    pub fn resolve(root: &Path) -> Result<Self, ConfigError> {
        let locate = |(stage, subdirectory, program): (&'static str, &str, &str)| {
            let path = root.join(subdirectory).join(program);
            if path.is_file() {
                Ok(path)
            } else {
                Err(ConfigError::MissingTool { stage, path })
            }
        };
        let [compiler, generator, checker, validator] = TOOLS;
        Ok(Self {
            compiler: locate(compiler)?,
            generator: locate(generator)?,
            checker: locate(checker)?,
            validator: locate(validator)?,
        })
    }

    pub fn from_config(config: &ToolchainConfig) -> Result<Self> {
        let root = match &config.tools_dir {
            Some(dir) => dir.clone(),
            None => install_root()?,
        };
        Ok(Self::resolve(&root)?)
    }
}

/// Directory that holds this program's own directory; collaborators live in
/// siblings of it.
pub fn install_root() -> Result<PathBuf> {
    let exe = env::current_exe().context("Failed to locate the running executable")?;
    exe.parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .with_context(|| format!("Executable has no install root: {}", exe.display()))
}
