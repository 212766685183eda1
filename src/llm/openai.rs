//! OpenAI-compatible chat-completions backend.
//!
//! Covers any endpoint speaking the chat-completions dialect (OpenAI, Azure
//! OpenAI, OpenRouter) via a configurable `base_url`. Supports both single-shot
//! responses and server-sent-event streaming; streamed fragments are
//! accumulated in arrival order into one response string before extraction
//! ever sees them. The stream is finite and not restartable: one generation
//! call, one stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::GenError;
use crate::llm::http_client::HttpClient;
use crate::llm::{GenInvocation, GenResult, GenerationBackend, Message, Role};

/// Default OpenAI endpoint.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

const PROVIDER: &str = "openai";

/// OpenAI-compatible backend.
#[derive(Clone)]
pub(crate) struct OpenAiBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

impl OpenAiBackend {
    /// Build the backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::Misconfiguration`] if the API key environment
    /// variable is unset, the model is missing, or the HTTP client cannot be
    /// constructed.
    pub fn new_from_config(config: &Config) -> Result<Self, GenError> {
        let openai = config.llm.openai.as_ref();

        let api_key_env = openai
            .and_then(|o| o.api_key_env.as_deref())
            .unwrap_or("OPENAI_API_KEY");
        let api_key = std::env::var(api_key_env).map_err(|_| {
            GenError::Misconfiguration(format!(
                "OpenAI API key not found in environment variable '{api_key_env}'. \
                 Set this variable or configure a different api_key_env in [llm.openai]."
            ))
        })?;

        let default_model = openai
            .and_then(|o| o.model.clone())
            .or_else(|| config.defaults.model.clone())
            .ok_or_else(|| {
                GenError::Misconfiguration(
                    "OpenAI model not specified. Set [llm.openai] model or [defaults] model."
                        .to_string(),
                )
            })?;

        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            base_url: openai
                .and_then(|o| o.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            max_tokens: openai.and_then(|o| o.max_tokens).unwrap_or(2048),
            temperature: openai.and_then(|o| o.temperature).unwrap_or(0.2),
            stream: openai.and_then(|o| o.stream).unwrap_or(false),
        })
    }

    fn resolve_model(&self, inv: &GenInvocation) -> String {
        if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        }
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn generate(&self, inv: GenInvocation) -> Result<GenResult, GenError> {
        let model = self.resolve_model(&inv);

        debug!(
            provider = PROVIDER,
            model = %model,
            stream = self.stream,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenAI-compatible backend"
        );

        let body = ChatRequest {
            model: model.clone(),
            messages: Self::convert_messages(&inv.messages),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: self.stream,
            stream_options: self
                .stream
                .then_some(StreamOptions { include_usage: true }),
        };

        let request = reqwest::Client::new()
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER)
            .await?;

        let (content, usage, model_used) = if self.stream {
            read_stream(response).await?
        } else {
            let parsed: ChatResponse = response.json().await.map_err(|e| {
                GenError::Transport(format!("Failed to parse OpenAI response: {e}"))
            })?;

            let content = parsed
                .choices
                .first()
                .and_then(|c| c.message.as_ref())
                .and_then(|m| m.content.clone())
                .unwrap_or_default();
            (content, parsed.usage, parsed.model)
        };

        if content.is_empty() {
            return Err(GenError::Transport(
                "OpenAI response missing text content".to_string(),
            ));
        }

        let mut result = GenResult::new(content, PROVIDER, model_used.unwrap_or(model));
        if let Some(usage) = usage {
            result.tokens_input = Some(usage.prompt_tokens);
            result.tokens_output = Some(usage.completion_tokens);
        }

        debug!(
            provider = PROVIDER,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "OpenAI invocation completed"
        );

        Ok(result)
    }
}

/// Consume an SSE response body, accumulating delta fragments in arrival order.
async fn read_stream(
    mut response: reqwest::Response,
) -> Result<(String, Option<Usage>, Option<String>), GenError> {
    let mut acc = StreamAccumulator::default();
    let mut buf = String::new();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| GenError::Transport(format!("Stream read failed: {e}")))?
    {
        buf.push_str(&String::from_utf8_lossy(&chunk));
        // Chunk boundaries do not align with event boundaries; only complete
        // lines are consumed here.
        while let Some(pos) = buf.find('\n') {
            let line: String = buf.drain(..=pos).collect();
            acc.push_line(line.trim());
        }
    }
    acc.push_line(buf.trim());

    Ok((acc.content, acc.usage, acc.model))
}

/// Incremental SSE accumulator.
///
/// Non-event lines and unparseable events are skipped rather than failing the
/// whole stream; a cut-off stream yields whatever content arrived before the
/// cut, and extraction downstream copes with truncation.
#[derive(Debug, Default)]
struct StreamAccumulator {
    content: String,
    usage: Option<Usage>,
    model: Option<String>,
}

impl StreamAccumulator {
    fn push_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return;
        }
        let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
            return;
        };
        for choice in &event.choices {
            if let Some(fragment) = choice.delta.content.as_deref() {
                self.content.push_str(fragment);
            }
        }
        if event.usage.is_some() {
            self.usage = event.usage;
        }
        if event.model.is_some() {
            self.model = event.model;
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}
