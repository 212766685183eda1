//! Artifact validation against the external `opa` checker.
//!
//! One `validate` call is one checker invocation: the candidate policy and its
//! test specification are staged into a temp directory that is unique to the
//! call, `opa test <policy> <test>` runs as a subprocess with a timeout, and
//! the combined stdout/stderr comes back as an opaque transcript. The temp
//! directory is removed on every exit path (success, spawn failure, timeout,
//! and cancellation) because it lives on the stack of the `validate` future.
//!
//! Per-call temp directories are what make concurrent validations safe: two
//! overlapping calls can never interleave or clobber each other's inputs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::config::Config;
use crate::error::CheckerError;
use crate::types::{CandidateArtifact, ValidationVerdict};

/// File name for the staged policy inside the per-call temp directory.
const POLICY_FILE: &str = "policy.rego";
/// File name for the staged test specification.
const TEST_FILE: &str = "policy_test.rego";

/// Pass/fail oracle for candidate artifacts.
///
/// Object-safe so the orchestrator can take test doubles; no retry logic
/// belongs here.
#[async_trait]
pub trait ArtifactValidator: Send + Sync {
    /// Check one artifact, producing a verdict with a diagnostic transcript.
    ///
    /// # Errors
    ///
    /// Returns [`CheckerError::Unavailable`] if the checker cannot be invoked
    /// and [`CheckerError::Timeout`] if it exceeds `deadline`.
    async fn validate(
        &self,
        artifact: &CandidateArtifact,
        deadline: Duration,
    ) -> Result<ValidationVerdict, CheckerError>;
}

/// Production validator backed by the `opa` command-line tool.
#[derive(Debug, Clone)]
pub struct OpaValidator {
    binary: PathBuf,
}

impl OpaValidator {
    /// Create a validator using an explicit checker binary path.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Create a validator, discovering `opa` in PATH when no path is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CheckerError::Unavailable`] if no binary is configured and
    /// `opa` is not in PATH.
    pub fn from_config(config: &Config) -> Result<Self, CheckerError> {
        match &config.checker.binary {
            Some(path) => Ok(Self::new(path)),
            None => Self::discover(),
        }
    }

    /// Discover the `opa` binary in PATH.
    ///
    /// # Errors
    ///
    /// Returns [`CheckerError::Unavailable`] if the binary is not found.
    pub fn discover() -> Result<Self, CheckerError> {
        let binary = which::which("opa").map_err(|e| CheckerError::Unavailable {
            reason: format!(
                "opa binary not found in PATH. Install OPA or set [checker] binary in the config. Error: {e}"
            ),
        })?;
        Ok(Self::new(binary))
    }

    /// Path to the checker binary this validator invokes.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl ArtifactValidator for OpaValidator {
    async fn validate(
        &self,
        artifact: &CandidateArtifact,
        deadline: Duration,
    ) -> Result<ValidationVerdict, CheckerError> {
        // Unique per call; never a fixed shared path.
        let staging = tempfile::Builder::new()
            .prefix("regoforge-")
            .tempdir()?;
        let policy_path = staging.path().join(POLICY_FILE);
        let test_path = staging.path().join(TEST_FILE);

        tokio::fs::write(&policy_path, &artifact.policy).await?;
        tokio::fs::write(&test_path, &artifact.test).await?;

        debug!(
            checker = %self.binary.display(),
            staging = %staging.path().display(),
            timeout_secs = deadline.as_secs(),
            "Invoking checker"
        );

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("test")
            .arg(&policy_path)
            .arg(&test_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CheckerError::Unavailable {
                    reason: format!("failed to invoke {}: {e}", self.binary.display()),
                });
            }
            // The child is killed when the output future drops (kill_on_drop).
            Err(_) => return Err(CheckerError::Timeout { timeout: deadline }),
        };

        let mut transcript = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !transcript.is_empty() && !transcript.ends_with('\n') {
                transcript.push('\n');
            }
            transcript.push_str(&stderr);
        }

        let passed = output.status.success();
        debug!(passed, exit_code = ?output.status.code(), "Checker verdict");

        Ok(ValidationVerdict { passed, transcript })
    }
}
