use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::artifacts::{ArtifactKind, ArtifactSet, WorkItem};
use crate::config::ToolchainConfig;
use crate::runner::CommandLine;
use crate::tools::ToolPaths;

/// Everything a stage needs to build its command line.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub item: &'a WorkItem,
    pub artifacts: &'a ArtifactSet,
    pub config: &'a ToolchainConfig,
}

type CommandBuilder = Arc<dyn Fn(&StageContext<'_>) -> CommandLine + Send + Sync>;

/// Static description of one pipeline step.
#[derive(Clone)]
pub struct StageSpec {
    pub prefix: String,
    pub limit_key: String,
    pub reads: Vec<ArtifactKind>,
    pub produces: Option<ArtifactKind>,
    /// File the tool writes incrementally; merged into the run log on timeout.
    pub aux_log: Option<ArtifactKind>,
    /// Treat the stage as done when its output already exists.
    pub skip_if_present: bool,
    /// Output is intermediate and handed to cleanup.
    pub intermediate: bool,
    /// Label for the size summary logged after a normal run.
    pub summary_label: Option<String>,
    command: CommandBuilder,
}

impl StageSpec {
    pub fn new<F>(prefix: impl Into<String>, command: F) -> Self
    where
        F: Fn(&StageContext<'_>) -> CommandLine + Send + Sync + 'static,
    {
        let prefix = prefix.into();
        Self {
            limit_key: prefix.clone(),
            prefix,
            reads: Vec::new(),
            produces: None,
            aux_log: None,
            skip_if_present: false,
            intermediate: false,
            summary_label: None,
            command: Arc::new(command),
        }
    }

    pub fn limit_key(mut self, key: impl Into<String>) -> Self {
        self.limit_key = key.into();
        self
    }

    pub fn reads(mut self, kinds: &[ArtifactKind]) -> Self {
        self.reads = kinds.to_vec();
        self
    }

    pub fn produces(mut self, kind: ArtifactKind) -> Self {
        self.produces = Some(kind);
        self
    }

    pub fn aux_log(mut self, kind: ArtifactKind) -> Self {
        self.aux_log = Some(kind);
        self
    }

    pub fn skip_if_present(mut self) -> Self {
        self.skip_if_present = true;
        self
    }

    pub fn intermediate(mut self) -> Self {
        self.intermediate = true;
        self
    }

    pub fn summarize(mut self, label: impl Into<String>) -> Self {
        self.summary_label = Some(label.into());
        self
    }

    pub fn command(&self, ctx: &StageContext<'_>) -> CommandLine {
        (self.command)(ctx)
    }
}

impl fmt::Debug for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSpec")
            .field("prefix", &self.prefix)
            .field("limit_key", &self.limit_key)
            .field("reads", &self.reads)
            .field("produces", &self.produces)
            .field("aux_log", &self.aux_log)
            .field("skip_if_present", &self.skip_if_present)
            .field("intermediate", &self.intermediate)
            .finish_non_exhaustive()
    }
}

/// The fixed compile → generate → check → validate sequence.
pub struct StageSet;

impl StageSet {
    pub fn standard(tools: &ToolPaths) -> Vec<StageSpec> {
        vec![
            compile_stage(tools.compiler.clone()),
            generate_stage(tools.generator.clone()),
            check_stage(tools.checker.clone()),
            validate_stage(tools.validator.clone()),
        ]
    }
}

fn compile_stage(program: PathBuf) -> StageSpec {
    StageSpec::new("D4", move |ctx| {
        let mut cmd = CommandLine::new(&program)
            .arg("--input")
            .arg(ctx.artifacts.problem())
            .args(["-m", "ddnnf-compiler"]);
        if !ctx.config.forward_only {
            cmd = cmd.args(["--skolem", "on"]);
        }
        cmd.arg("--dump-ddnnf").arg(ctx.artifacts.diagram())
    })
    .reads(&[ArtifactKind::Problem])
    .produces(ArtifactKind::Diagram)
    .skip_if_present()
    .intermediate()
    .summarize("D4 NNF")
}

fn generate_stage(program: PathBuf) -> StageSpec {
    StageSpec::new("GEN", move |ctx| {
        let (monolithic, tree_ratio) = ctx.config.mode.thresholds();
        let mut cmd =
            CommandLine::new(&program).args(["-v".to_string(), ctx.config.verbosity.to_string()]);
        if ctx.config.forward_only {
            cmd = cmd.args(["-a", "f"]);
        }
        cmd.args([
            "-m".to_string(),
            monolithic.to_string(),
            "-r".to_string(),
            tree_ratio.to_string(),
            "-C".to_string(),
            ctx.config.clause_limit.to_string(),
            "-L".to_string(),
        ])
        .arg(ctx.artifacts.path(ArtifactKind::GeneratorLog))
        .arg(ctx.artifacts.problem())
        .arg(ctx.artifacts.diagram())
        .arg(ctx.artifacts.certificate())
    })
    .reads(&[ArtifactKind::Problem, ArtifactKind::Diagram])
    .produces(ArtifactKind::Certificate)
    .aux_log(ArtifactKind::GeneratorLog)
    .summarize("GEN")
}

fn check_stage(program: PathBuf) -> StageSpec {
    StageSpec::new("CHECK", move |ctx| {
        let mut cmd = CommandLine::new(&program)
            .args(["-v".to_string(), ctx.config.verbosity.to_string()])
            .arg("-L")
            .arg(ctx.artifacts.path(ArtifactKind::CheckerLog));
        if ctx.config.deletion_threads > 1 {
            cmd = cmd.args(["-n".to_string(), ctx.config.deletion_threads.to_string()]);
        }
        if ctx.config.forward_only {
            cmd = cmd.arg("-D");
        }
        cmd.arg(ctx.artifacts.problem()).arg(ctx.artifacts.certificate())
    })
    .reads(&[ArtifactKind::Problem, ArtifactKind::Certificate])
    .aux_log(ArtifactKind::CheckerLog)
}

fn validate_stage(program: PathBuf) -> StageSpec {
    StageSpec::new("CAKEML", move |ctx| {
        CommandLine::new(&program)
            .arg(ctx.artifacts.problem())
            .arg(ctx.artifacts.certificate())
    })
    .reads(&[ArtifactKind::Problem, ArtifactKind::Certificate])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationMode;

    fn tools() -> ToolPaths {
        ToolPaths {
            compiler: PathBuf::from("/opt/d4"),
            generator: PathBuf::from("/opt/gen"),
            checker: PathBuf::from("/opt/check"),
            validator: PathBuf::from("/opt/cake"),
        }
    }

    fn render(stage: &StageSpec, config: &ToolchainConfig) -> String {
        let item = WorkItem::new("b1", "/w", false);
        let artifacts = ArtifactSet::new(&item, config);
        let ctx = StageContext {
            item: &item,
            artifacts: &artifacts,
            config,
        };
        stage.command(&ctx).to_string()
    }

    #[test]
    fn standard_order_and_keys() {
        let stages = StageSet::standard(&tools());
        let prefixes: Vec<_> = stages.iter().map(|s| s.prefix.as_str()).collect();
        assert_eq!(prefixes, ["D4", "GEN", "CHECK", "CAKEML"]);
        assert!(stages.iter().all(|s| s.limit_key == s.prefix));
        assert!(stages[0].intermediate && stages[0].skip_if_present);
        assert_eq!(stages[1].aux_log, Some(ArtifactKind::GeneratorLog));
    }

    #[test]
    fn full_mode_commands() {
        let config = ToolchainConfig::default();
        let stages = StageSet::standard(&tools());
        assert_eq!(
            render(&stages[0], &config),
            "/opt/d4 --input /w/b1.cnf -m ddnnf-compiler --skolem on --dump-ddnnf /w/b1.snnf"
        );
        assert_eq!(
            render(&stages[1], &config),
            "/opt/gen -v 2 -m 1000000 -r 5 -C 2147483647 -L /w/b1.generate.log /w/b1.cnf /w/b1.snnf /w/b1.scpog"
        );
        assert_eq!(
            render(&stages[2], &config),
            "/opt/check -v 2 -L /w/b1.check.log -n 7 /w/b1.cnf /w/b1.scpog"
        );
        assert_eq!(render(&stages[3], &config), "/opt/cake /w/b1.cnf /w/b1.scpog");
    }

    #[test]
    fn forward_only_monolithic_commands() {
        let config = ToolchainConfig {
            forward_only: true,
            mode: GenerationMode::Monolithic,
            deletion_threads: 1,
            ..Default::default()
        };
        let stages = StageSet::standard(&tools());
        assert_eq!(
            render(&stages[0], &config),
            "/opt/d4 --input /w/b1.cnf -m ddnnf-compiler --dump-ddnnf /w/b1.nnf"
        );
        assert!(
            render(&stages[1], &config).starts_with("/opt/gen -v 2 -a f -m -1 -r 1000000000000 ")
        );
        assert_eq!(
            render(&stages[2], &config),
            "/opt/check -v 2 -L /w/b1.check.log -D /w/b1.cnf /w/b1.cpog"
        );
    }
}
