use crate::llm::{ChatModel, ChatPrompt, LlmError};
use async_trait::async_trait;

/// Backend used when no language model is configured; every call fails, so
/// translation always takes the pattern-matching path.
pub struct DisabledProvider;

#[async_trait]
impl ChatModel for DisabledProvider {
    async fn complete(&self, _prompt: &ChatPrompt) -> Result<String, LlmError> {
        Err(LlmError::ConfigError("language model disabled".to_string()))
    }
}
