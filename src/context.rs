//! Optional context enrichment for the initial generation request.
//!
//! The original system could pull reference material (prior policies, schema
//! notes) into the prompt before generation. That lookup sits behind
//! [`ContextSource`] so the loop works identically with or without one.

use async_trait::async_trait;

use crate::error::GenError;

/// Supplier of reference snippets for a generation goal.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Return snippets relevant to `goal`, most relevant first. An empty
    /// vector means no enrichment.
    ///
    /// # Errors
    ///
    /// Returns [`GenError`] when the lookup itself fails. Callers treat a
    /// failed lookup as no enrichment rather than aborting the loop.
    async fn snippets(&self, goal: &str) -> Result<Vec<String>, GenError>;
}

/// Context source that never enriches. The default for CLI runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

#[async_trait]
impl ContextSource for NoContext {
    async fn snippets(&self, _goal: &str) -> Result<Vec<String>, GenError> {
        Ok(Vec::new())
    }
}
