//! End-to-end repair loop behavior through the public API, with scripted
//! backend and validator doubles. No network, no real checker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use regoforge::config::Config;
use regoforge::error::{CheckerError, GenError};
use regoforge::llm::{GenInvocation, GenResult, GenerationBackend};
use regoforge::validator::ArtifactValidator;
use regoforge::{generate_policy, CandidateArtifact, PolicyRequest, RepairLoop, ValidationVerdict};

/// Backend replaying a fixed script of responses, counting invocations.
struct ScriptedBackend {
    script: Vec<Result<String, GenError>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(script: Vec<Result<String, GenError>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, _inv: GenInvocation) -> Result<GenResult, GenError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(index) {
            Some(Ok(text)) => Ok(GenResult::new(text.clone(), "scripted", "scripted-model")),
            Some(Err(e)) => Err(GenError::Transport(e.to_string())),
            None => panic!("backend invoked beyond its script ({} calls)", index + 1),
        }
    }
}

/// Validator replaying fixed verdicts, recording the artifacts it saw.
struct ScriptedValidator {
    verdicts: Vec<ValidationVerdict>,
    seen: Mutex<Vec<CandidateArtifact>>,
}

impl ScriptedValidator {
    fn new(verdicts: Vec<ValidationVerdict>) -> Arc<Self> {
        Arc::new(Self {
            verdicts,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactValidator for ScriptedValidator {
    async fn validate(
        &self,
        artifact: &CandidateArtifact,
        _deadline: Duration,
    ) -> Result<ValidationVerdict, CheckerError> {
        let mut seen = self.seen.lock().unwrap();
        let verdict = self
            .verdicts
            .get(seen.len())
            .expect("validator invoked beyond its script")
            .clone();
        seen.push(artifact.clone());
        Ok(verdict)
    }
}

fn pass() -> ValidationVerdict {
    ValidationVerdict {
        passed: true,
        transcript: "PASS: 1/1".to_string(),
    }
}

fn fail(transcript: &str) -> ValidationVerdict {
    ValidationVerdict {
        passed: false,
        transcript: transcript.to_string(),
    }
}

fn candidate_json(policy: &str) -> String {
    serde_json::json!({
        "rego_code": policy,
        "test_rego": format!("{policy}_test"),
        "is_valid": true,
        "error": null,
    })
    .to_string()
}

fn make_loop(
    backend: Arc<ScriptedBackend>,
    validator: Arc<ScriptedValidator>,
) -> RepairLoop {
    RepairLoop::new(backend, validator, &Config::minimal_for_testing())
}

// Scenario: the first candidate passes, so exactly one generation and one
// validation happen even with budget to spare.
#[tokio::test]
async fn first_attempt_passes() {
    let backend = ScriptedBackend::new(vec![Ok(candidate_json("package example"))]);
    let validator = ScriptedValidator::new(vec![pass()]);
    let repair = make_loop(Arc::clone(&backend), Arc::clone(&validator));

    let request = PolicyRequest {
        request: "allow admins to read".to_string(),
        retry_limit: 1,
    };
    let response = generate_policy(&repair, &request).await.unwrap();

    assert!(response.success);
    assert_eq!(response.attempts, 1);
    assert_eq!(response.policy.as_deref(), Some("package example"));
    assert_eq!(response.test.as_deref(), Some("package example_test"));
    assert!(response.last_diagnostic.is_none());
    assert_eq!(backend.call_count(), 1);
    assert_eq!(validator.call_count(), 1);
}

// Scenario: attempt one is unparseable prose, attempt two succeeds. The
// validator must never see attempt one.
#[tokio::test]
async fn unparseable_then_success() {
    let backend = ScriptedBackend::new(vec![
        Ok("Sorry, I could not settle on a policy. Let me think.".to_string()),
        Ok(candidate_json("package retry")),
    ]);
    let validator = ScriptedValidator::new(vec![pass()]);
    let repair = make_loop(Arc::clone(&backend), Arc::clone(&validator));

    let request = PolicyRequest {
        request: "deny anonymous writes".to_string(),
        retry_limit: 3,
    };
    let response = generate_policy(&repair, &request).await.unwrap();

    assert!(response.success);
    assert_eq!(response.attempts, 2);
    assert_eq!(backend.call_count(), 2);
    assert_eq!(validator.call_count(), 1);
}

// Scenario: validation fails every time. The loop stops at the budget and
// reports the final transcript.
#[tokio::test]
async fn always_failing_exhausts_budget() {
    let transcript = "FAIL: data.example.test_allow\nsyntax error: line 4";
    let backend = ScriptedBackend::new(vec![
        Ok(candidate_json("package a")),
        Ok(candidate_json("package b")),
    ]);
    let validator = ScriptedValidator::new(vec![fail(transcript), fail(transcript)]);
    let repair = make_loop(Arc::clone(&backend), Arc::clone(&validator));

    let request = PolicyRequest {
        request: "allow admins".to_string(),
        retry_limit: 2,
    };
    let response = generate_policy(&repair, &request).await.unwrap();

    assert!(!response.success);
    assert_eq!(response.attempts, 2);
    assert!(response.policy.is_none());
    assert_eq!(response.last_diagnostic.as_deref(), Some(transcript));
    assert_eq!(backend.call_count(), 2);
    assert_eq!(validator.call_count(), 2);
}

// A backend failure consumes an attempt and its message becomes the next
// attempt's diagnostic.
#[tokio::test]
async fn backend_failure_consumes_attempt() {
    let backend = ScriptedBackend::new(vec![
        Err(GenError::Transport("connection reset by peer".to_string())),
        Ok(candidate_json("package recovered")),
    ]);
    let validator = ScriptedValidator::new(vec![pass()]);
    let repair = make_loop(Arc::clone(&backend), Arc::clone(&validator));

    let outcome = repair.run("allow admins", 2).await;
    match outcome {
        regoforge::LoopOutcome::Success { attempts, .. } => {
            assert_eq!(attempts.len(), 2);
            let first = attempts[0].diagnostic.as_deref().unwrap();
            assert!(first.contains("generation backend failure"));
            assert!(first.contains("connection reset"));
            assert!(attempts[1].request.is_repair());
        }
        other => panic!("Expected Success, got {other:?}"),
    }
}

// A self-reported valid flag is advisory: validation still runs and its
// verdict wins.
#[tokio::test]
async fn self_report_does_not_bypass_validation() {
    let claims_valid = serde_json::json!({
        "rego_code": "package overconfident",
        "test_rego": "package overconfident_test",
        "is_valid": true,
    })
    .to_string();
    let backend = ScriptedBackend::new(vec![Ok(claims_valid)]);
    let validator = ScriptedValidator::new(vec![fail("undefined function input.admin")]);
    let repair = make_loop(Arc::clone(&backend), Arc::clone(&validator));

    let outcome = repair.run("allow admins", 1).await;
    assert!(!outcome.is_success());
    assert_eq!(validator.call_count(), 1);
}

// Zero retry limit is a caller error, rejected before any generation.
#[tokio::test]
async fn zero_retry_limit_rejected_at_api() {
    let backend = ScriptedBackend::new(vec![]);
    let validator = ScriptedValidator::new(vec![]);
    let repair = make_loop(Arc::clone(&backend), Arc::clone(&validator));

    let request = PolicyRequest {
        request: "allow admins".to_string(),
        retry_limit: 0,
    };
    let result = generate_policy(&repair, &request).await;

    assert!(result.is_err());
    assert_eq!(backend.call_count(), 0);
}

// A deadline that fires mid-run yields Cancelled with the attempts that
// finished before the cut.
#[tokio::test]
async fn deadline_cancellation_preserves_completed_attempts() {
    struct SlowSecondCall {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationBackend for SlowSecondCall {
        async fn generate(&self, _inv: GenInvocation) -> Result<GenResult, GenError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(GenResult::new(
                    "no structure here at all",
                    "scripted",
                    "scripted-model",
                ))
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
        }
    }

    let validator = ScriptedValidator::new(vec![]);
    let repair = RepairLoop::new(
        Arc::new(SlowSecondCall {
            calls: AtomicUsize::new(0),
        }),
        Arc::clone(&validator) as Arc<dyn ArtifactValidator>,
        &Config::minimal_for_testing(),
    );

    let outcome = repair
        .run_with_deadline("allow admins", 3, Duration::from_millis(200))
        .await;

    match outcome {
        regoforge::LoopOutcome::Cancelled { attempts } => {
            // Attempt 1 completed (unparseable output); attempt 2 was cut.
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].index, 1);
        }
        other => panic!("Expected Cancelled, got {other:?}"),
    }
    assert_eq!(validator.call_count(), 0);
}
