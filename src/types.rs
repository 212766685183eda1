//! Core data model for the generate → validate → repair loop.
//!
//! Everything here is an inert value type: the orchestrator owns an append-only
//! sequence of [`AttemptRecord`]s for one run and nothing in this module is
//! shared across runs. Policy and test text are opaque strings; only the
//! external checker interprets their semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One prompt handed to the generation backend.
///
/// Attempt 1 carries only the (possibly context-enriched) user goal; repair
/// attempts additionally carry the diagnostic produced by the previous attempt.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Natural-language description of the desired policy
    pub goal: String,
    /// Diagnostic from the previous attempt (repair attempts only)
    pub diagnostic: Option<String>,
}

impl GenerationRequest {
    /// Build the first-attempt request from the bare user goal.
    #[must_use]
    pub fn initial(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            diagnostic: None,
        }
    }

    /// Build a repair request carrying the previous attempt's diagnostic.
    #[must_use]
    pub fn repair(goal: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Whether this is a repair attempt.
    #[must_use]
    pub fn is_repair(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// A candidate policy plus its accompanying Rego test specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateArtifact {
    /// The Rego policy text
    pub policy: String,
    /// The Rego unit-test text exercising the policy
    pub test: String,
}

/// Structured result recovered from raw generator output.
///
/// `artifact: None` means "no parseable candidate object found" and must be
/// treated as a parse failure, never as a validation failure. The
/// `self_reported_valid` flag is whatever the generator claimed about its own
/// output; it is advisory only and never trusted over the checker verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The extracted artifact, if a well-formed candidate object was found
    pub artifact: Option<CandidateArtifact>,
    /// Generator's own validity claim, if present in the output
    pub self_reported_valid: Option<bool>,
    /// Generator-supplied diagnostic text, if present in the output
    pub diagnostic: Option<String>,
}

/// Pass/fail verdict from one external checker invocation.
///
/// Produced exclusively by the validator; `transcript` is opaque diagnostic
/// text (combined checker stdout/stderr) returned upward without
/// interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// True iff the checker process exited with a success status
    pub passed: bool,
    /// Combined stdout/stderr of the checker invocation
    pub transcript: String,
}

/// History entry for a single generate → extract → validate cycle.
///
/// Optional fields record how far the attempt progressed: a generation failure
/// leaves `raw_output` empty, an extraction failure leaves `verdict` empty.
/// `diagnostic` is the text carried into the next attempt's prompt (absent on
/// the successful attempt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt index
    pub index: u32,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// The request composed for this attempt
    pub request: GenerationRequest,
    /// Raw generator output, if generation succeeded
    pub raw_output: Option<String>,
    /// Extraction result, if extraction ran
    pub extraction: Option<ExtractionResult>,
    /// Checker verdict, if validation ran
    pub verdict: Option<ValidationVerdict>,
    /// Diagnostic carried into the next attempt, if this one failed
    pub diagnostic: Option<String>,
}

impl AttemptRecord {
    /// Start a new record for the given attempt index and request.
    #[must_use]
    pub fn begin(index: u32, request: GenerationRequest) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            request,
            raw_output: None,
            extraction: None,
            verdict: None,
            diagnostic: None,
        }
    }
}

/// Terminal outcome of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// A candidate passed the checker before the retry limit was reached
    Success {
        /// The validated artifact
        artifact: CandidateArtifact,
        /// Full attempt history, ending with the passing attempt
        attempts: Vec<AttemptRecord>,
    },
    /// Every attempt up to the retry limit failed
    Exhausted {
        /// Full attempt history
        attempts: Vec<AttemptRecord>,
        /// Diagnostic produced by the final attempt, when one was recorded
        last_diagnostic: Option<String>,
    },
    /// The caller's overall deadline expired mid-run
    Cancelled {
        /// Attempts fully completed before cancellation
        attempts: Vec<AttemptRecord>,
    },
}

impl LoopOutcome {
    /// Number of attempts consumed (completed) by this run.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        let attempts = match self {
            Self::Success { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => attempts,
        };
        attempts.len() as u32
    }

    /// Whether this run produced a validated artifact.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
