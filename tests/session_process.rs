#![cfg(unix)]

use oram_bench_harness::error::{ExitState, HarnessError};
use oram_bench_harness::session::{validate_binary, ProcessTransport, SessionRunner};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

fn sh(script: &str) -> ProcessTransport {
    ProcessTransport::new("/bin/sh").with_args(["-c", script])
}

#[test]
fn immediate_exit_is_a_quick_success() {
    let mut runner = SessionRunner::new(sh("exit 0"), Duration::from_secs(10));

    let result = runner.run(&["store seed.txt 4", "print sizes"]).unwrap();
    assert_eq!(result.status, ExitState::Exited(0));
    assert!(result.elapsed >= 0.0);
    assert!(result.elapsed < 5.0);
}

#[test]
fn script_reaches_stdin_and_output_is_combined() {
    let mut runner = SessionRunner::new(sh("cat; echo 'stash size: 9' >&2"), Duration::from_secs(10));

    let result = runner.run(&["store a 4", "print sizes"]).unwrap();
    assert!(result.output.contains("store a 4\nprint sizes\nexit\n"));
    assert!(result.output.contains("stash size: 9"));
}

#[test]
fn non_zero_exit_is_a_failed_session() {
    let mut runner = SessionRunner::new(sh("echo crashed; exit 3"), Duration::from_secs(10));

    match runner.run(&["operate ops.txt"]) {
        Err(HarnessError::SessionFailed { status, output }) => {
            assert_eq!(status, ExitState::Exited(3));
            assert!(output.contains("crashed"));
        }
        other => panic!("expected SessionFailed, got {:?}", other),
    }
}

#[test]
fn hung_binary_times_out() {
    let mut runner = SessionRunner::new(sh("exec sleep 30"), Duration::from_millis(200));

    let err = runner.run(&["print sizes"]).unwrap_err();
    assert!(matches!(err, HarnessError::SessionTimeout { .. }));
}

#[test]
fn timeout_also_kills_helpers_of_the_subject() {
    let mut runner = SessionRunner::new(sh("sleep 8; true"), Duration::from_millis(200));

    let started = Instant::now();
    let err = runner.run(&["print sizes"]).unwrap_err();
    assert!(matches!(err, HarnessError::SessionTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[test]
fn background_child_does_not_hold_a_clean_session() {
    let mut runner = SessionRunner::new(sh("sleep 8 & echo 'stash size: 4'"), Duration::from_secs(10));

    let started = Instant::now();
    let result = runner.run(&["print sizes"]).unwrap();
    assert_eq!(result.status, ExitState::Exited(0));
    assert!(result.output.contains("stash size: 4"));
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[test]
fn missing_program_fails_to_launch() {
    let mut runner = SessionRunner::new(ProcessTransport::new("/nonexistent/subject"), Duration::from_secs(1));
    assert!(matches!(runner.run(&["exit"]), Err(HarnessError::Spawn { .. })));
}

#[test]
fn binary_must_be_executable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subject");
    fs::write(&path, "#!/bin/sh\n").unwrap();

    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    assert!(matches!(validate_binary(&path), Err(HarnessError::BinaryNotExecutable(_))));

    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    validate_binary(&path).unwrap();
    validate_binary(Path::new("/bin/sh")).unwrap();
}
