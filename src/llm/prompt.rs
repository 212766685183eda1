//! Prompt composition for generation and repair attempts.
//!
//! The first attempt carries only the user's goal (plus any context snippets
//! already folded into it); repair attempts append the diagnostic from the
//! previous attempt. Both variants instruct the generator to emit one JSON
//! candidate object so extraction has a fixed field-shape to look for.

use crate::llm::{Message, Role};
use crate::types::GenerationRequest;

/// System prompt establishing the generator's role.
const SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant specialized in Rego code generation.";

/// Shape instruction appended to every prompt.
const RESPONSE_FORMAT: &str = "Respond with a single JSON object with these fields: \
\"rego_code\" (the complete Rego policy), \
\"test_rego\" (Rego unit tests exercising the policy), \
\"is_valid\" (your own assessment, boolean), and \
\"error\" (explanation if you could not comply, else null).";

/// Build the message sequence for one generation attempt.
#[must_use]
pub fn generation_messages(request: &GenerationRequest) -> Vec<Message> {
    let mut body = format!(
        "You are an expert in OPA (Open Policy Agent) policy authoring.\n\
         Generate a Rego policy that satisfies the following requirement:\n\n\
         {}\n",
        request.goal
    );

    if let Some(diagnostic) = &request.diagnostic {
        body.push_str(&format!(
            "\nThe previously generated policy failed validation. Error message:\n\
             {diagnostic}\n\
             Please fix the issue and regenerate the policy.\n"
        ));
    }

    body.push('\n');
    body.push_str(RESPONSE_FORMAT);

    vec![
        Message::new(Role::System, SYSTEM_PROMPT),
        Message::new(Role::User, body),
    ]
}
