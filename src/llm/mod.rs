//! Generation backend abstraction.
//!
//! The orchestrator treats the generator as a black box behind
//! [`GenerationBackend`]: messages in, one raw response string out. Backends
//! own transport, authentication, and streaming; callers never see partial
//! output. Provider selection is config-driven via [`from_config`].

mod anthropic;
mod http_client;
mod openai;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::GenError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a generation conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A single generation call: the full message list plus per-call limits.
///
/// Backends are stateless between calls; any conversation memory lives in the
/// messages the caller composes.
#[derive(Debug, Clone)]
pub struct GenInvocation {
    /// Model identifier; empty means the backend's configured default.
    pub model: String,
    /// Transport timeout for this call.
    pub timeout: Duration,
    pub messages: Vec<Message>,
}

impl GenInvocation {
    pub fn new(model: impl Into<String>, timeout: Duration, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            timeout,
            messages,
        }
    }
}

/// Completed generation: the raw text plus provenance and token accounting.
#[derive(Debug, Clone)]
pub struct GenResult {
    /// Full response text. For streamed backends this is the concatenation of
    /// all fragments in arrival order.
    pub raw_response: String,
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl GenResult {
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }
}

/// Object-safe generation backend.
///
/// Implementations must be `Send + Sync` so the orchestrator can share one
/// backend across concurrent loop runs.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run one generation call to completion.
    ///
    /// # Errors
    ///
    /// Returns [`GenError`] on transport failure, provider rejection, or
    /// timeout. The orchestrator folds these into the attempt record rather
    /// than aborting the loop.
    async fn generate(&self, invocation: GenInvocation) -> Result<GenResult, GenError>;
}

/// Construct the backend named by `[llm] provider`.
///
/// Unset provider defaults to `"openai"`.
///
/// # Errors
///
/// Returns [`GenError::Unsupported`] for an unknown provider name, or a
/// [`GenError::Misconfiguration`] from the backend constructor.
pub fn from_config(config: &Config) -> Result<Box<dyn GenerationBackend>, GenError> {
    let provider = config.llm.provider.as_deref().unwrap_or("openai");
    match provider {
        "openai" => Ok(Box::new(openai::OpenAiBackend::new_from_config(config)?)),
        "anthropic" => Ok(Box::new(anthropic::AnthropicBackend::new_from_config(
            config,
        )?)),
        other => Err(GenError::Unsupported(format!(
            "Unknown generation provider '{other}'. Supported providers: openai, anthropic."
        ))),
    }
}
