#![cfg(unix)]

use std::time::Duration;

use proof_toolchain::runlog::RunLog;
use proof_toolchain::runner::{CommandLine, Outcome, ProcessRunner};
use tempfile::tempdir;

fn shell(script: &str) -> CommandLine {
    CommandLine::new("/bin/sh").arg("-c").arg(script)
}

fn run_script(
    script: &str,
    limit: Duration,
    aux: Option<&std::path::Path>,
) -> (proof_toolchain::StageOutcome, String) {
    let temp = tempdir().unwrap();
    let log_path = temp.path().join("item.log");
    let mut log = RunLog::create(&log_path).unwrap();
    let outcome = ProcessRunner::new()
        .run("GEN", "item", &shell(script), &mut log, limit, aux)
        .unwrap();
    log.close().unwrap();
    (outcome, std::fs::read_to_string(&log_path).unwrap())
}

#[test]
fn normal_exit_captures_output() {
    let (outcome, log) = run_script("echo hello; echo oops >&2", Duration::from_secs(10), None);

    assert_eq!(outcome.outcome, Outcome::Normal);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.stage, "GEN");
    assert!(log.starts_with("GEN LOG: Running /bin/sh -c echo hello; echo oops >&2\n"));
    assert!(log.contains("GEN LOG: Time limit 10 seconds\n"));
    assert!(log.contains("hello\n"));
    assert!(log.contains("oops\n"));
    assert!(!log.contains("ERROR"));
    assert!(log.ends_with("GEN OUTCOME: normal\n"));
}

#[test]
fn nonzero_exit_is_failed_with_code() {
    let (outcome, log) = run_script("exit 3", Duration::from_secs(10), None);

    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.exit_code, Some(3));
    assert!(log.contains("GEN ERROR: Return code = 3\n"));
    assert!(log.contains("GEN LOG: Elapsed time = "));
    assert!(log.ends_with("GEN OUTCOME: failed\n"));
}

#[test]
fn deadline_kills_and_merges_auxiliary_log() {
    let temp = tempdir().unwrap();
    let aux = temp.path().join("item.generate.log");
    let script = format!("echo partial progress > '{}'; exec sleep 5", aux.display());

    let (outcome, log) = run_script(&script, Duration::from_secs(1), Some(&aux));

    assert_eq!(outcome.outcome, Outcome::Timeout);
    assert_eq!(outcome.exit_code, None);
    assert!(outcome.elapsed < Duration::from_secs(4));
    let merged = log.find("partial progress").expect("auxiliary log merged");
    let timeout = log
        .find("GEN ERROR: Timeout after 1 seconds")
        .expect("timeout record");
    assert!(merged < timeout);
    assert!(log.ends_with("GEN OUTCOME: timeout\n"));
}

#[test]
fn missing_auxiliary_log_is_not_an_error() {
    let temp = tempdir().unwrap();
    let aux = temp.path().join("never-written.log");

    let (outcome, log) = run_script("exec sleep 5", Duration::from_secs(1), Some(&aux));

    assert_eq!(outcome.outcome, Outcome::Timeout);
    assert!(log.contains("GEN ERROR: Timeout after 1 seconds"));
}

#[test]
fn launch_failure_is_failed_without_code() {
    let temp = tempdir().unwrap();
    let log_path = temp.path().join("item.log");
    let mut log = RunLog::create(&log_path).unwrap();
    let command = CommandLine::new(temp.path().join("no-such-program"));

    let outcome = ProcessRunner::new()
        .run("D4", "item", &command, &mut log, Duration::from_secs(5), None)
        .unwrap();
    log.close().unwrap();
    let log = std::fs::read_to_string(&log_path).unwrap();

    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.exit_code, None);
    assert!(log.contains("D4 ERROR: Could not launch "));
    assert!(log.ends_with("D4 OUTCOME: failed\n"));
}
