//! Checker isolation guarantees, exercised with shell-script stand-ins for
//! the real `opa` binary: staging files are cleaned up on every path, and
//! concurrent validations never see each other's artifacts.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regoforge::validator::{ArtifactValidator, OpaValidator};
use regoforge::{CandidateArtifact, ValidationVerdict};
use regoforge::error::CheckerError;

/// Write an executable shell script into `dir` and return its path.
fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn artifact(policy: &str, test: &str) -> CandidateArtifact {
    CandidateArtifact {
        policy: policy.to_string(),
        test: test.to_string(),
    }
}

async fn run(
    checker: &Path,
    candidate: &CandidateArtifact,
    deadline: Duration,
) -> Result<ValidationVerdict, CheckerError> {
    OpaValidator::new(checker)
        .validate(candidate, deadline)
        .await
}

// The staging directory and both files inside it must be gone after the
// checker returns, pass or fail.
#[tokio::test]
async fn staging_files_removed_after_failure() {
    let stub_dir = tempfile::tempdir().unwrap();
    let log = stub_dir.path().join("seen-paths.log");
    let checker = write_stub(
        stub_dir.path(),
        "opa-stub",
        &format!("printf '%s\\n' \"$2\" \"$3\" > {}\nexit 1", log.display()),
    );

    let verdict = run(
        &checker,
        &artifact("package p", "package p_test"),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert!(!verdict.passed);

    let logged = std::fs::read_to_string(&log).unwrap();
    let paths: Vec<&str> = logged.lines().collect();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("policy.rego"));
    assert!(paths[1].ends_with("policy_test.rego"));
    for path in paths {
        assert!(
            !Path::new(path).exists(),
            "staging file survived validation: {path}"
        );
    }
}

#[tokio::test]
async fn staging_files_removed_after_success() {
    let stub_dir = tempfile::tempdir().unwrap();
    let log = stub_dir.path().join("seen-paths.log");
    let checker = write_stub(
        stub_dir.path(),
        "opa-stub",
        &format!("printf '%s\\n' \"$2\" > {}\necho 'PASS: 1/1'\nexit 0", log.display()),
    );

    let verdict = run(
        &checker,
        &artifact("package p", "package p_test"),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert!(verdict.passed);
    assert!(verdict.transcript.contains("PASS: 1/1"));

    let logged = std::fs::read_to_string(&log).unwrap();
    let staged = logged.trim();
    assert!(!Path::new(staged).exists());
}

// Concurrent validations through one shared validator each see only their
// own payload. The stub echoes the staged policy file back as the
// transcript, so any cross-talk would show up as a mismatched transcript.
#[tokio::test]
async fn concurrent_validations_do_not_cross_talk() {
    let stub_dir = tempfile::tempdir().unwrap();
    let checker = write_stub(stub_dir.path(), "opa-stub", "cat \"$2\"\nexit 1");
    let validator = std::sync::Arc::new(OpaValidator::new(&checker));

    let mut handles = Vec::new();
    for i in 0..8 {
        let validator = std::sync::Arc::clone(&validator);
        handles.push(tokio::spawn(async move {
            let payload = format!("package isolated_{i}");
            let verdict = validator
                .validate(
                    &artifact(&payload, "package t"),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
            (payload, verdict)
        }));
    }

    for handle in handles {
        let (payload, verdict) = handle.await.unwrap();
        assert_eq!(verdict.transcript.trim(), payload);
    }
}

// A checker that outlives its deadline is killed and reported as a timeout,
// not left running.
#[tokio::test]
async fn hung_checker_times_out() {
    let stub_dir = tempfile::tempdir().unwrap();
    let checker = write_stub(stub_dir.path(), "opa-stub", "sleep 30");

    let result = run(
        &checker,
        &artifact("package p", "package p_test"),
        Duration::from_millis(100),
    )
    .await;

    match result {
        Err(CheckerError::Timeout { timeout }) => {
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
}

// stderr is part of the transcript; repair needs the compiler's complaint.
#[tokio::test]
async fn transcript_includes_stderr() {
    let stub_dir = tempfile::tempdir().unwrap();
    let checker = write_stub(
        stub_dir.path(),
        "opa-stub",
        "echo 'FAIL: data.p.test_allow'\necho 'rego_parse_error: unexpected token' >&2\nexit 1",
    );

    let verdict = run(
        &checker,
        &artifact("package p", "package p_test"),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert!(!verdict.passed);
    assert!(verdict.transcript.contains("FAIL: data.p.test_allow"));
    assert!(verdict.transcript.contains("rego_parse_error"));
}
