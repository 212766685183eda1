//! Error taxonomy for regoforge.
//!
//! Each concern gets its own `thiserror` enum; [`RegoForgeError`] is the
//! library-level umbrella. Attempt-level failures (generation backend errors,
//! checker errors) are recovered inside the repair loop and recorded as
//! diagnostics, so they normally never escape `RepairLoop::run`. The variants
//! here surface when a component is used standalone (e.g. the `check`
//! subcommand) or when configuration is invalid before the loop starts.
//!
//! Library code returns `RegoForgeError` and does NOT call
//! `std::process::exit()`; exit-code mapping lives in the CLI.

use std::time::Duration;
use thiserror::Error;

/// Library-level error type.
#[derive(Error, Debug)]
pub enum RegoForgeError {
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Generation backend error: {0}")]
    Gen(#[from] GenError),

    #[error("Checker error: {0}")]
    Checker(#[from] CheckerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller errors on the inbound request surface.
///
/// These are surfaced immediately; the loop never starts.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("Missing 'request' field")]
    MissingRequest,

    #[error("Invalid retry limit {value}: must be at least 1")]
    InvalidRetryLimit { value: u32 },
}

/// Generation backend failures.
///
/// The orchestrator treats every variant as attempt failure, not a fatal
/// abort: the failure text becomes the next repair prompt's diagnostic and one
/// unit of the retry limit is consumed.
#[derive(Error, Debug)]
pub enum GenError {
    /// Transport-level failure (process spawn, HTTP connectivity)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported provider or feature
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// External checker invocation failures.
///
/// Inside the loop these are folded into a failed verdict whose transcript is
/// the error text; they only propagate when the validator is invoked directly.
#[derive(Error, Debug)]
pub enum CheckerError {
    /// The checker could not be invoked (missing executable, permission error)
    #[error("Checker unavailable: {reason}")]
    Unavailable { reason: String },

    /// The checker exceeded its per-call timeout
    #[error("Checker timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Failed to stage artifact files for the checker
    #[error("Failed to stage checker input: {0}")]
    Staging(#[from] std::io::Error),
}

/// Configuration file and value errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },
}
