use std::ffi::OsString;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::runlog::{RecordKind, RunLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Normal,
    Failed,
    Timeout,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Normal => "normal",
            Outcome::Failed => "failed",
            Outcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one external invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub stage: String,
    pub outcome: Outcome,
    /// `None` when no exit status was observed: timeout, launch or wait
    /// failure, signal termination, or a stage skipped for present output.
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl StageOutcome {
    pub fn is_normal(&self) -> bool {
        self.outcome == Outcome::Normal
    }
}

/// Program plus argument vector for one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs external commands under a wall-clock deadline.
///
/// Output of every invocation is appended to the caller's [`RunLog`]; the
/// only `Err` case is a failure to write that log.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn run(
        &self,
        prefix: &str,
        root: &str,
        command: &CommandLine,
        log: &mut RunLog,
        limit: Duration,
        aux_log: Option<&Path>,
    ) -> io::Result<StageOutcome> {
        let limit_secs = limit.as_secs();
        info!(
            root,
            stage = prefix,
            "Running '{command}' with time limit of {limit_secs} seconds"
        );
        log.record(prefix, RecordKind::Log, format_args!("Running {command}"))?;
        log.record(
            prefix,
            RecordKind::Log,
            format_args!("Time limit {limit_secs} seconds"),
        )?;

        let started = Instant::now();
        let spawned = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                warn!(root, stage = prefix, error = %err, "Failed to launch stage program");
                log.record(
                    prefix,
                    RecordKind::Error,
                    format_args!("Could not launch {}: {err}", command.program.display()),
                )?;
                return self.finish(prefix, root, log, Outcome::Failed, None, started);
            }
        };

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let waited = match self.wait_with_deadline(&mut child, limit) {
            Ok(waited) => waited,
            Err(err) => {
                warn!(root, stage = prefix, error = %err, "Lost track of stage program");
                log.record(
                    prefix,
                    RecordKind::Error,
                    format_args!("Could not wait for {}: {err}", command.program.display()),
                )?;
                return self.finish(prefix, root, log, Outcome::Failed, None, started);
            }
        };

        match waited {
            Some(status) => {
                log.append_sanitized(&collect(stdout))?;
                log.append_sanitized(&collect(stderr))?;
                let code = status.code();
                let outcome = if status.success() {
                    Outcome::Normal
                } else {
                    match code {
                        Some(code) => log.record(
                            prefix,
                            RecordKind::Error,
                            format_args!("Return code = {code}"),
                        )?,
                        None => log.record(prefix, RecordKind::Error, "Terminated by signal")?,
                    }
                    Outcome::Failed
                };
                self.finish(prefix, root, log, outcome, code, started)
            }
            None => {
                // Readers may still hold pipes inherited by grandchildren, so
                // they are left detached rather than joined.
                drop((stdout, stderr));
                if let Some(aux) = aux_log {
                    merge_aux_log(log, aux)?;
                }
                warn!(root, stage = prefix, "Program timed out after {limit_secs} seconds");
                log.record(
                    prefix,
                    RecordKind::Error,
                    format_args!("Timeout after {limit_secs} seconds"),
                )?;
                self.finish(prefix, root, log, Outcome::Timeout, None, started)
            }
        }
    }

    /// `Ok(None)` means the deadline passed and the child was killed. A
    /// limit too large to represent as an instant never expires. The child
    /// is killed and reaped on every error path.
    fn wait_with_deadline<C: Supervised>(
        &self,
        child: &mut C,
        limit: Duration,
    ) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now().checked_add(limit);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) => {}
                Err(err) => {
                    stop(child);
                    return Err(err);
                }
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        stop(child);
                        return Ok(None);
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };
            thread::sleep(pause);
        }
    }

    fn finish(
        &self,
        prefix: &str,
        root: &str,
        log: &mut RunLog,
        outcome: Outcome,
        exit_code: Option<i32>,
        started: Instant,
    ) -> io::Result<StageOutcome> {
        let elapsed = started.elapsed();
        let seconds = elapsed.as_secs_f64();
        log.record(
            prefix,
            RecordKind::Log,
            format_args!("Elapsed time = {seconds:.3} seconds"),
        )?;
        log.record(prefix, RecordKind::Outcome, outcome)?;
        info!(root, stage = prefix, %outcome, elapsed_s = seconds, "Stage finished");
        Ok(StageOutcome {
            stage: prefix.to_string(),
            outcome,
            exit_code,
            elapsed,
        })
    }
}

/// The parts of a child process the deadline loop needs.
trait Supervised {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<ExitStatus>;
}

impl Supervised for Child {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }
}

/// Kill and reap, logging rather than propagating failures.
fn stop<C: Supervised>(child: &mut C) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "Kill failed");
    }
    if let Err(err) = child.wait() {
        debug!(error = %err, "Reaping killed child failed");
    }
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut reader) = pipe {
            let _ = reader.read_to_end(&mut buffer);
        }
        buffer
    })
}

fn collect(handle: JoinHandle<Vec<u8>>) -> String {
    handle
        .join()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Best effort: the killed tool may have left the file half written, or
/// never created it.
fn merge_aux_log(log: &mut RunLog, aux: &Path) -> io::Result<()> {
    match std::fs::read(aux) {
        Ok(bytes) => log.append_sanitized(&String::from_utf8_lossy(&bytes)),
        Err(err) => {
            debug!(path = %aux.display(), error = %err, "No auxiliary log to merge");
            Ok(())
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Child whose status can never be read.
    #[derive(Default)]
    struct Unwaitable {
        killed: bool,
        reaped: bool,
    }

    impl Supervised for Unwaitable {
        fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
            Err(io::Error::other("no such child"))
        }

        fn kill(&mut self) -> io::Result<()> {
            self.killed = true;
            Ok(())
        }

        fn wait(&mut self) -> io::Result<ExitStatus> {
            use std::os::unix::process::ExitStatusExt;
            self.reaped = true;
            Ok(ExitStatus::from_raw(9))
        }
    }

    #[test]
    fn wait_error_kills_and_reaps_child() {
        let mut child = Unwaitable::default();
        let result = ProcessRunner::new().wait_with_deadline(&mut child, Duration::from_secs(5));
        assert!(result.is_err());
        assert!(child.killed);
        assert!(child.reaped);
    }

    #[test]
    fn unrepresentable_limit_never_expires() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("item.log");
        let mut log = RunLog::create(&path).unwrap();
        let command = CommandLine::new("/bin/sh").args(["-c", "exit 0"]);

        let outcome = ProcessRunner::new()
            .run("GEN", "item", &command, &mut log, Duration::from_secs(u64::MAX), None)
            .unwrap();
        log.close().unwrap();

        assert_eq!(outcome.outcome, Outcome::Normal);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(&format!("GEN LOG: Time limit {} seconds", u64::MAX)));
    }
}
