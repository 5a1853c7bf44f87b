use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems detected before (or while starting) a batch.
///
/// Stage failures and timeouts are never reported through this type; they
/// are recorded as outcomes on the item that produced them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't find program '{}' for the {stage} stage", path.display())]
    MissingTool { stage: &'static str, path: PathBuf },

    #[error("Couldn't open name file '{}'", path.display())]
    NameFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read config file '{}'", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}'", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid input pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("No inputs matched pattern: {0}")]
    EmptyPattern(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
