//! Command-line interface.
//!
//! Two subcommands: `generate` runs the full repair loop against the
//! configured backend, `check` runs the checker once over files on disk.
//! Machine-readable output goes to stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use crate::api::{PolicyRequest, PolicyResponse};
use crate::config::Config;
use crate::orchestrator::RepairLoop;
use crate::types::CandidateArtifact;
use crate::validator::{ArtifactValidator, OpaValidator};
use crate::{llm, logging};

/// Exit code for a run that finished without a passing artifact.
const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Parser)]
#[command(
    name = "regoforge",
    version,
    about = "Generate and validate OPA Rego policies with a bounded repair loop"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Path to a regoforge.toml config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a policy and its test from a natural-language request
    Generate {
        /// Natural-language statement of the desired policy
        #[arg(long)]
        request: String,

        /// Maximum generate/validate attempts
        #[arg(long, value_name = "N")]
        retry_limit: Option<u32>,

        /// Model identifier, overriding the configured default
        #[arg(long)]
        model: Option<String>,

        /// Wall-clock deadline for the whole run, in seconds
        #[arg(long, value_name = "SECS")]
        deadline_secs: Option<u64>,
    },

    /// Run the checker once over a policy and test file on disk
    Check {
        /// Path to the policy file
        #[arg(long)]
        policy: PathBuf,

        /// Path to the test file
        #[arg(long)]
        test: PathBuf,
    },
}

/// Parse arguments and run the selected subcommand.
///
/// Returns the process exit code: zero for a passing outcome, one for a
/// failed or cancelled run. Configuration and caller errors propagate as
/// `Err` and map to exit code two in `main`.
///
/// # Errors
///
/// Returns an error for invalid configuration, an unusable backend or
/// checker, or a malformed request.
pub async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Generate {
            request,
            retry_limit,
            model,
            deadline_secs,
        } => {
            if let Some(model) = model {
                config.defaults.model = Some(model);
            }
            if let Some(secs) = deadline_secs {
                config.defaults.deadline_secs = Some(secs);
            }

            let policy_request = PolicyRequest {
                request,
                retry_limit: retry_limit.unwrap_or_else(|| config.retry_limit()),
            };
            policy_request.validate()?;

            let backend = llm::from_config(&config).context("Failed to construct backend")?;
            let validator =
                OpaValidator::from_config(&config).context("Checker binary unavailable")?;
            let repair_loop =
                RepairLoop::new(Arc::from(backend), Arc::new(validator), &config);

            let outcome = match config.deadline() {
                Some(deadline) => {
                    repair_loop
                        .run_with_deadline(
                            &policy_request.request,
                            policy_request.retry_limit,
                            deadline,
                        )
                        .await
                }
                None => {
                    repair_loop
                        .run(&policy_request.request, policy_request.retry_limit)
                        .await
                }
            };

            let response = PolicyResponse::from(outcome);
            let success = response.success;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(if success { 0 } else { EXIT_FAILURE })
        }

        Command::Check { policy, test } => {
            let artifact = CandidateArtifact {
                policy: tokio::fs::read_to_string(&policy)
                    .await
                    .with_context(|| format!("Failed to read {}", policy.display()))?,
                test: tokio::fs::read_to_string(&test)
                    .await
                    .with_context(|| format!("Failed to read {}", test.display()))?,
            };

            let validator =
                OpaValidator::from_config(&config).context("Checker binary unavailable")?;
            let verdict = validator
                .validate(&artifact, config.checker_timeout())
                .await?;

            if !verdict.transcript.is_empty() {
                println!("{}", verdict.transcript);
            }
            Ok(if verdict.passed { 0 } else { EXIT_FAILURE })
        }
    }
}
