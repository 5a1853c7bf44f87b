pub mod artifacts;
pub mod cleanup;
pub mod config;
pub mod digest;
pub mod error;
pub mod gate;
pub mod inputs;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod runlog;
pub mod runner;
pub mod scheduler;
pub mod stages;
pub mod tools;
pub mod validation;

pub use artifacts::{ArtifactKind, ArtifactSet, WorkItem};
pub use config::{ConfigOverrides, GenerationMode, TimeLimits, ToolchainConfig};
pub use pipeline::{PipelineResult, PipelineSequencer, PipelineState};
pub use runner::{CommandLine, Outcome, ProcessRunner, StageOutcome};
pub use scheduler::{BatchSummary, DispatchMode, ItemRunner, JobScheduler};
pub use stages::{StageSet, StageSpec};
pub use tools::ToolPaths;
