//! Anthropic Messages API backend.
//!
//! The Messages API takes the system prompt as a top-level field rather than
//! a message role, so conversion splits the message list accordingly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::GenError;
use crate::llm::http_client::HttpClient;
use crate::llm::{GenInvocation, GenResult, GenerationBackend, Message, Role};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "anthropic";

#[derive(Clone)]
pub(crate) struct AnthropicBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicBackend {
    /// Build the backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::Misconfiguration`] if the API key environment
    /// variable is unset or no model is configured.
    pub fn new_from_config(config: &Config) -> Result<Self, GenError> {
        let anthropic = config.llm.anthropic.as_ref();

        let api_key_env = anthropic
            .and_then(|a| a.api_key_env.as_deref())
            .unwrap_or("ANTHROPIC_API_KEY");
        let api_key = std::env::var(api_key_env).map_err(|_| {
            GenError::Misconfiguration(format!(
                "Anthropic API key not found in environment variable '{api_key_env}'. \
                 Set this variable or configure a different api_key_env in [llm.anthropic]."
            ))
        })?;

        let default_model = anthropic
            .and_then(|a| a.model.clone())
            .or_else(|| config.defaults.model.clone())
            .ok_or_else(|| {
                GenError::Misconfiguration(
                    "Anthropic model not specified. Set [llm.anthropic] model or [defaults] model."
                        .to_string(),
                )
            })?;

        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            base_url: anthropic
                .and_then(|a| a.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            max_tokens: anthropic.and_then(|a| a.max_tokens).unwrap_or(2048),
            temperature: anthropic.and_then(|a| a.temperature).unwrap_or(0.2),
        })
    }

    /// Split system content from the conversational messages.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<ApiMessage>) {
        let mut system_parts = Vec::new();
        let mut api_messages = Vec::new();

        for message in messages {
            match message.role {
                Role::System => system_parts.push(message.content.clone()),
                Role::User => api_messages.push(ApiMessage {
                    role: "user".to_string(),
                    content: message.content.clone(),
                }),
                Role::Assistant => api_messages.push(ApiMessage {
                    role: "assistant".to_string(),
                    content: message.content.clone(),
                }),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, api_messages)
    }
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    async fn generate(&self, inv: GenInvocation) -> Result<GenResult, GenError> {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };

        debug!(
            provider = PROVIDER,
            model = %model,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let (system, messages) = Self::convert_messages(&inv.messages);
        let body = MessagesRequest {
            model: model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages,
        };

        let request = reqwest::Client::new()
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER)
            .await?;

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            GenError::Transport(format!("Failed to parse Anthropic response: {e}"))
        })?;

        let content: String = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() {
            return Err(GenError::Transport(
                "Anthropic response contained no text blocks".to_string(),
            ));
        }

        let mut result = GenResult::new(content, PROVIDER, parsed.model.unwrap_or(model));
        if let Some(usage) = parsed.usage {
            result.tokens_input = Some(usage.input_tokens);
            result.tokens_output = Some(usage.output_tokens);
        }

        Ok(result)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}
