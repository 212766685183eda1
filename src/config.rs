//! Configuration management.
//!
//! Hierarchical configuration with precedence CLI > file > built-in defaults.
//! The TOML file (`regoforge.toml`) has `[defaults]`, `[llm]` (with
//! per-provider `[llm.openai]` / `[llm.anthropic]` tables), and `[checker]`
//! sections. API keys are never stored in the file; provider tables name an
//! environment variable instead.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Default bound on repair attempts.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;
/// Default per-call generation timeout in seconds.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
/// Default per-call checker timeout in seconds.
pub const DEFAULT_CHECKER_TIMEOUT_SECS: u64 = 30;

/// File name probed in the working directory when no `--config` is given.
const CONFIG_FILE_NAME: &str = "regoforge.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Loop and invocation defaults
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Generation backend selection and provider tables
    #[serde(default)]
    pub llm: LlmConfig,
    /// External checker settings
    #[serde(default)]
    pub checker: CheckerConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DefaultsConfig {
    /// Bound on repair attempts (default 3)
    pub retry_limit: Option<u32>,
    /// Model passed to the generation backend
    pub model: Option<String>,
    /// Per-call generation timeout in seconds (default 120)
    pub generation_timeout_secs: Option<u64>,
    /// Optional overall run deadline in seconds (no deadline if unset)
    pub deadline_secs: Option<u64>,
}

/// `[llm]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider name: "openai" (default) or "anthropic"
    pub provider: Option<String>,
    /// OpenAI-compatible provider configuration
    pub openai: Option<OpenAiConfig>,
    /// Anthropic provider configuration
    pub anthropic: Option<AnthropicConfig>,
}

/// `[llm.openai]` table. Covers any OpenAI-compatible chat-completions
/// endpoint (OpenAI, Azure OpenAI, OpenRouter) via `base_url`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub base_url: Option<String>,
    /// Environment variable holding the API key (default `OPENAI_API_KEY`)
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Request server-sent-event streaming and accumulate fragments
    pub stream: Option<bool>,
}

/// `[llm.anthropic]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnthropicConfig {
    pub base_url: Option<String>,
    /// Environment variable holding the API key (default `ANTHROPIC_API_KEY`)
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// `[checker]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CheckerConfig {
    /// Path to the `opa` binary; discovered in PATH when unset
    pub binary: Option<String>,
    /// Per-call checker timeout in seconds (default 30)
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; otherwise `regoforge.toml` in the
    /// working directory is used if present, and built-in defaults apply when
    /// no file is found.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] for a missing explicit path and
    /// [`ConfigError::InvalidFile`] for unreadable or unparseable files.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound {
                        path: p.display().to_string(),
                    });
                }
                Some(p.to_path_buf())
            }
            None => {
                let default = Path::new(CONFIG_FILE_NAME);
                default.exists().then(|| default.to_path_buf())
            }
        };

        let config = match resolved {
            Some(p) => {
                let text = std::fs::read_to_string(&p)
                    .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", p.display())))?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFile`] on parse failure.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::InvalidFile(e.to_string()))
    }

    /// Validate loaded values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.retry_limit == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "defaults.retry_limit".to_string(),
                value: "0".to_string(),
            });
        }
        if self.checker.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "checker.timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved retry limit.
    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.defaults.retry_limit.unwrap_or(DEFAULT_RETRY_LIMIT)
    }

    /// Resolved per-call generation timeout.
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .generation_timeout_secs
                .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS),
        )
    }

    /// Resolved per-call checker timeout.
    #[must_use]
    pub fn checker_timeout(&self) -> Duration {
        Duration::from_secs(
            self.checker
                .timeout_secs
                .unwrap_or(DEFAULT_CHECKER_TIMEOUT_SECS),
        )
    }

    /// Optional overall run deadline.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.defaults.deadline_secs.map(Duration::from_secs)
    }

    /// Minimal configuration for tests: built-in defaults, no file IO.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::minimal_for_testing();
        assert_eq!(config.retry_limit(), DEFAULT_RETRY_LIMIT);
        assert_eq!(
            config.generation_timeout(),
            Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS)
        );
        assert_eq!(
            config.checker_timeout(),
            Duration::from_secs(DEFAULT_CHECKER_TIMEOUT_SECS)
        );
        assert!(config.deadline().is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let text = r#"
[defaults]
retry_limit = 5
model = "gpt-4o"
generation_timeout_secs = 60
deadline_secs = 300

[llm]
provider = "openai"

[llm.openai]
base_url = "https://example.azure.com/openai/v1/chat/completions"
api_key_env = "AZURE_OPENAI_KEY"
model = "gpt-4o"
max_tokens = 2048
temperature = 0.2
stream = true

[checker]
binary = "/usr/local/bin/opa"
timeout_secs = 15
"#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.retry_limit(), 5);
        assert_eq!(config.deadline(), Some(Duration::from_secs(300)));
        assert_eq!(config.llm.provider.as_deref(), Some("openai"));
        assert_eq!(config.checker.binary.as_deref(), Some("/usr/local/bin/opa"));
        assert_eq!(config.checker_timeout(), Duration::from_secs(15));
        let openai = config.llm.openai.unwrap();
        assert_eq!(openai.api_key_env.as_deref(), Some("AZURE_OPENAI_KEY"));
        assert_eq!(openai.stream, Some(true));
    }

    #[test]
    fn test_zero_retry_limit_rejected() {
        let config = Config::from_toml_str("[defaults]\nretry_limit = 0\n").unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "defaults.retry_limit");
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = Config::from_toml_str("[defaults\nretry_limit = 3");
        assert!(matches!(result, Err(ConfigError::InvalidFile(_))));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/regoforge.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }
}
