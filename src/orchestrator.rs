//! Bounded generate, validate, repair loop.
//!
//! [`RepairLoop`] drives the full cycle: compose a request, call the
//! generation backend, extract the candidate artifact, run the checker, and
//! either finish or feed the checker's transcript into the next attempt. The
//! attempt bound is hard; the loop performs at most `retry_limit` generation
//! calls and at most that many validations. Every attempt leaves an
//! [`AttemptRecord`] regardless of how it ended, including runs cut short by
//! a deadline.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::{ContextSource, NoContext};
use crate::extraction;
use crate::llm::{prompt, GenInvocation, GenerationBackend};
use crate::types::{AttemptRecord, GenerationRequest, LoopOutcome, ValidationVerdict};
use crate::validator::ArtifactValidator;

/// Diagnostic recorded when the generator's output held nothing parseable.
const NO_RESULT_DIAGNOSTIC: &str = "no parseable structured result found in generator output";

/// Orchestrates bounded repair runs over a generation backend and a validator.
///
/// One instance can serve many concurrent runs; all shared state is behind
/// `Arc` and each run keeps its own attempt history.
pub struct RepairLoop {
    backend: Arc<dyn GenerationBackend>,
    validator: Arc<dyn ArtifactValidator>,
    context: Arc<dyn ContextSource>,
    model: String,
    generation_timeout: Duration,
    checker_timeout: Duration,
}

impl RepairLoop {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        validator: Arc<dyn ArtifactValidator>,
        config: &Config,
    ) -> Self {
        Self {
            backend,
            validator,
            context: Arc::new(NoContext),
            model: config.defaults.model.clone().unwrap_or_default(),
            generation_timeout: config.generation_timeout(),
            checker_timeout: config.checker_timeout(),
        }
    }

    /// Replace the default no-op context source.
    #[must_use]
    pub fn with_context(mut self, context: Arc<dyn ContextSource>) -> Self {
        self.context = context;
        self
    }

    /// Run the loop to completion.
    ///
    /// Returns [`LoopOutcome::Success`] as soon as a candidate passes
    /// validation, or [`LoopOutcome::Exhausted`] after `retry_limit` failed
    /// attempts. A `retry_limit` of zero exhausts immediately with no
    /// attempts; callers are expected to reject zero at the API boundary.
    pub async fn run(&self, goal: &str, retry_limit: u32) -> LoopOutcome {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        self.run_attempts(goal, retry_limit, attempts).await
    }

    /// Run the loop under a wall-clock deadline.
    ///
    /// When the deadline fires mid-run the outcome is
    /// [`LoopOutcome::Cancelled`] carrying every attempt that completed
    /// before the cut. In-flight checker processes and staging directories
    /// are released when the run future drops.
    pub async fn run_with_deadline(
        &self,
        goal: &str,
        retry_limit: u32,
        deadline: Duration,
    ) -> LoopOutcome {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        match timeout(
            deadline,
            self.run_attempts(goal, retry_limit, Arc::clone(&attempts)),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    deadline_secs = deadline.as_secs(),
                    "Deadline elapsed; cancelling repair loop"
                );
                LoopOutcome::Cancelled {
                    attempts: take_attempts(&attempts),
                }
            }
        }
    }

    async fn run_attempts(
        &self,
        goal: &str,
        retry_limit: u32,
        attempts: Arc<Mutex<Vec<AttemptRecord>>>,
    ) -> LoopOutcome {
        let goal = self.enrich(goal).await;
        let mut diagnostic: Option<String> = None;

        for index in 1..=retry_limit {
            let request = match &diagnostic {
                None => GenerationRequest::initial(&goal),
                Some(prior) => GenerationRequest::repair(&goal, prior),
            };
            let mut record = AttemptRecord::begin(index, request.clone());

            info!(
                attempt = index,
                retry_limit,
                repair = request.is_repair(),
                "Starting generation attempt"
            );

            let invocation = GenInvocation::new(
                self.model.clone(),
                self.generation_timeout,
                prompt::generation_messages(&request),
            );

            let raw = match self.backend.generate(invocation).await {
                Ok(result) => {
                    debug!(
                        attempt = index,
                        provider = %result.provider,
                        model = %result.model_used,
                        response_len = result.raw_response.len(),
                        "Generation completed"
                    );
                    result.raw_response
                }
                Err(e) => {
                    // A failed generation consumes the attempt; the failure
                    // text rides into the next request as the diagnostic.
                    let failure = format!("generation backend failure: {e}");
                    warn!(attempt = index, error = %e, "Generation failed");
                    record.diagnostic = Some(failure.clone());
                    diagnostic = Some(failure);
                    push_attempt(&attempts, record);
                    continue;
                }
            };

            record.raw_output = Some(raw.clone());
            let extraction = extraction::extract(&raw);
            record.extraction = Some(extraction.clone());

            let Some(artifact) = extraction.artifact else {
                // Nothing validatable; the checker is never invoked for
                // absent artifacts.
                let failure = extraction
                    .diagnostic
                    .unwrap_or_else(|| NO_RESULT_DIAGNOSTIC.to_string());
                warn!(attempt = index, "No artifact extracted from generator output");
                record.diagnostic = Some(failure.clone());
                diagnostic = Some(failure);
                push_attempt(&attempts, record);
                continue;
            };

            // The generator's own verdict is advisory; validation always
            // runs regardless of what it claimed.
            if extraction.self_reported_valid == Some(false) {
                debug!(attempt = index, "Generator self-reported failure; validating anyway");
            }

            let verdict = match self
                .validator
                .validate(&artifact, self.checker_timeout)
                .await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(attempt = index, error = %e, "Checker invocation failed");
                    ValidationVerdict {
                        passed: false,
                        transcript: e.to_string(),
                    }
                }
            };
            record.verdict = Some(verdict.clone());

            if verdict.passed {
                info!(attempt = index, "Candidate passed validation");
                push_attempt(&attempts, record);
                return LoopOutcome::Success {
                    artifact,
                    attempts: take_attempts(&attempts),
                };
            }

            info!(
                attempt = index,
                transcript_len = verdict.transcript.len(),
                "Candidate failed validation"
            );
            record.diagnostic = Some(verdict.transcript.clone());
            diagnostic = Some(verdict.transcript);
            push_attempt(&attempts, record);
        }

        info!(retry_limit, "Attempt budget exhausted without a passing candidate");
        LoopOutcome::Exhausted {
            attempts: take_attempts(&attempts),
            last_diagnostic: diagnostic,
        }
    }

    async fn enrich(&self, goal: &str) -> String {
        match self.context.snippets(goal).await {
            Ok(snippets) if !snippets.is_empty() => {
                debug!(count = snippets.len(), "Enriching request with context snippets");
                format!("{goal}\n\nReference material:\n{}", snippets.join("\n---\n"))
            }
            Ok(_) => goal.to_string(),
            Err(e) => {
                warn!(error = %e, "Context lookup failed; continuing without enrichment");
                goal.to_string()
            }
        }
    }
}

fn push_attempt(attempts: &Mutex<Vec<AttemptRecord>>, record: AttemptRecord) {
    attempts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(record);
}

fn take_attempts(attempts: &Mutex<Vec<AttemptRecord>>) -> Vec<AttemptRecord> {
    std::mem::take(&mut *attempts.lock().unwrap_or_else(PoisonError::into_inner))
}
