//! Structured-result extraction from raw generator output.
//!
//! Generator output is free text that may contain explanatory prose, markdown
//! fences, and several candidate JSON objects (streamed output concatenates
//! one object per reasoning step). Extraction is a two-phase process:
//!
//! 1. A scanning parser locates every maximal top-level JSON object span,
//!    tracking nested braces, string state, and escape sequences. A truncated
//!    trailing fragment never closes its span and is skipped naturally.
//! 2. Spans are tried in reverse document order against the candidate schema;
//!    the last well-formed match wins, since later output supersedes earlier
//!    drafts.
//!
//! Extraction is a pure function of its input: no IO, no state.

use serde::Deserialize;

use crate::types::{CandidateArtifact, ExtractionResult};

/// Candidate object schema as emitted by the generator.
///
/// Field spellings vary across generator revisions, so the common variants are
/// accepted as aliases. Only the policy code field is required for a span to
/// count as well-formed.
#[derive(Debug, Deserialize)]
struct CandidateObject {
    #[serde(alias = "policy")]
    rego_code: String,
    #[serde(default, alias = "test_code", alias = "test")]
    test_rego: Option<String>,
    #[serde(default, alias = "validation")]
    is_valid: Option<bool>,
    #[serde(default, alias = "detail")]
    error: Option<String>,
}

/// Extract the authoritative candidate result from raw generator output.
///
/// Returns `ExtractionResult::default()` (absent artifact) when no span parses
/// under the candidate schema. The caller must treat an absent artifact as a
/// parse failure, never as a validation failure.
#[must_use]
pub fn extract(raw: &str) -> ExtractionResult {
    for span in object_spans(raw).into_iter().rev() {
        if let Ok(obj) = serde_json::from_str::<CandidateObject>(span) {
            return ExtractionResult {
                artifact: Some(CandidateArtifact {
                    policy: obj.rego_code,
                    test: obj.test_rego.unwrap_or_default(),
                }),
                self_reported_valid: obj.is_valid,
                diagnostic: obj.error,
            };
        }
    }
    ExtractionResult::default()
}

/// Locate every maximal top-level `{...}` span in `raw`.
///
/// Tracks brace depth outside strings and quote/escape state inside strings,
/// so braces embedded in code values or escaped quotes never unbalance the
/// scan. An unterminated span at the end of input is discarded.
fn object_spans(raw: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in raw.char_indices() {
        if start.is_none() {
            if c == '{' {
                start = Some(i);
                depth = 1;
                in_string = false;
                escaped = false;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let begin = start.take().unwrap_or(i);
                    spans.push(&raw[begin..=i]);
                }
            }
            _ => {}
        }
    }

    spans
}
