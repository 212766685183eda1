//! Caller-facing request and response shapes.
//!
//! This is the wire contract for embedding the repair loop behind a service
//! or the CLI: a [`PolicyRequest`] in, a [`PolicyResponse`] out. Caller
//! mistakes (empty request, zero retry limit) are rejected here before any
//! generation spend happens.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_RETRY_LIMIT;
use crate::error::RequestError;
use crate::orchestrator::RepairLoop;
use crate::types::LoopOutcome;

/// Incoming policy generation request.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRequest {
    /// Natural-language statement of the desired policy.
    #[serde(default)]
    pub request: String,
    /// Maximum number of generate/validate attempts.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

impl PolicyRequest {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    /// Reject malformed requests before the loop starts.
    ///
    /// # Errors
    ///
    /// [`RequestError::MissingRequest`] for an empty or whitespace-only
    /// request, [`RequestError::InvalidRetryLimit`] for a zero limit.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.request.trim().is_empty() {
            return Err(RequestError::MissingRequest);
        }
        if self.retry_limit == 0 {
            return Err(RequestError::InvalidRetryLimit {
                value: self.retry_limit,
            });
        }
        Ok(())
    }
}

/// Outcome of a policy generation request.
///
/// `policy` and `test` are present only on success; `last_diagnostic` is
/// present only when the loop exhausted its budget with a recorded failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResponse {
    pub success: bool,
    /// Number of attempts actually performed.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_diagnostic: Option<String>,
}

impl From<LoopOutcome> for PolicyResponse {
    fn from(outcome: LoopOutcome) -> Self {
        let attempts = outcome.attempt_count();
        match outcome {
            LoopOutcome::Success { artifact, .. } => Self {
                success: true,
                attempts,
                policy: Some(artifact.policy),
                test: Some(artifact.test),
                error: None,
                last_diagnostic: None,
            },
            LoopOutcome::Exhausted {
                last_diagnostic, ..
            } => Self {
                success: false,
                attempts,
                policy: None,
                test: None,
                error: Some(format!(
                    "no passing policy produced within {attempts} attempt(s)"
                )),
                last_diagnostic,
            },
            LoopOutcome::Cancelled { .. } => Self {
                success: false,
                attempts,
                policy: None,
                test: None,
                error: Some("generation cancelled before completion".to_string()),
                last_diagnostic: None,
            },
        }
    }
}

/// Validate and run one policy request against a configured loop.
///
/// # Errors
///
/// Returns [`RequestError`] for a malformed request; loop-level failures are
/// reported inside the response, not as errors.
pub async fn generate_policy(
    repair_loop: &RepairLoop,
    request: &PolicyRequest,
) -> Result<PolicyResponse, RequestError> {
    request.validate()?;
    let outcome = repair_loop.run(&request.request, request.retry_limit).await;
    Ok(outcome.into())
}
