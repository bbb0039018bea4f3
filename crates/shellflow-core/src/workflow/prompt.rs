//! Prompt-completion collaborator used by `prompt` steps.
//!
//! The engine never talks to a model itself; it hands the rendered prompt to
//! a [`PromptCompleter`] and threads the returned text onward.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("prompt completion failed: {0}")]
    Failed(String),

    #[error("prompt completion unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PromptCompleter: Send + Sync {
    /// Complete `prompt`. `working_directory` is a hint for completers that
    /// operate on a checkout.
    async fn complete(&self, prompt: &str, working_directory: &str) -> Result<String, PromptError>;
}

/// Returns the rendered prompt unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoPromptCompleter;

#[async_trait]
impl PromptCompleter for EchoPromptCompleter {
    async fn complete(
        &self,
        prompt: &str,
        _working_directory: &str,
    ) -> Result<String, PromptError> {
        Ok(prompt.to_string())
    }
}
