//! regoforge: generate OPA Rego policies with an LLM and repair them until
//! they pass `opa test`.
//!
//! The core is a bounded loop in [`orchestrator::RepairLoop`]: generate a
//! candidate policy plus test, extract the structured result from the raw
//! model output ([`extraction`]), run the checker in an isolated staging
//! directory ([`validator`]), and feed failure transcripts back into the next
//! attempt until a candidate passes or the attempt budget runs out.
//!
//! Library consumers plug in their own [`llm::GenerationBackend`] or
//! [`validator::ArtifactValidator`] implementations; the CLI wires up the
//! configured defaults.

pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod types;
pub mod validator;

pub use api::{generate_policy, PolicyRequest, PolicyResponse};
pub use error::RegoForgeError;
pub use orchestrator::RepairLoop;
pub use types::{
    AttemptRecord, CandidateArtifact, ExtractionResult, GenerationRequest, LoopOutcome,
    ValidationVerdict,
};
