pub mod fallback;
pub mod models;
pub mod providers;
pub mod translator;

use crate::config::LlmConfig;
use async_trait::async_trait;
use models::{ModelOptimization, OptimizationResult};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

/// A single system + user exchange sent to a chat model.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    /// Ask the backend to constrain its answer to a JSON object.
    pub json: bool,
}

impl ChatPrompt {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            json: false,
        }
    }

    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            json: true,
            ..Self::text(system, user)
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for Arc<T> {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError> {
        self.as_ref().complete(prompt).await
    }
}

pub struct LlmManager {
    model: Box<dyn ChatModel>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let model: Box<dyn ChatModel> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            "none" => Box::new(providers::disabled::DisabledProvider),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { model })
    }

    pub fn with_model(model: Box<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError> {
        self.model.complete(prompt).await
    }

    /// Plain-language summary of a SQL statement. No fallback.
    pub async fn explain_sql(&self, sql: &str) -> Result<String, LlmError> {
        let prompt = ChatPrompt::text(
            "You are a SQL expert. Explain SQL queries in simple, clear terms.",
            format!("Please explain this SQL query in simple terms: {}", sql),
        );

        let content = self.complete(&prompt).await?;
        if content.trim().is_empty() {
            return Ok("Unable to explain query".to_string());
        }
        Ok(content)
    }

    /// Rewrites a SQL statement for performance. No fallback.
    pub async fn optimize_sql(&self, sql: &str) -> Result<OptimizationResult, LlmError> {
        let prompt = ChatPrompt::json(
            "You are a SQL performance expert. Optimize queries and explain improvements. Always respond with valid JSON.",
            format!(
                r#"
Analyze and optimize this SQL query for better performance:

{}

Please respond with a JSON object containing:
- optimizedQuery: The optimized SQL query
- improvements: An array of strings describing the improvements made
"#,
                sql
            ),
        );

        let content = self.complete(&prompt).await?;
        let parsed: ModelOptimization = serde_json::from_str(extract_json(&content))
            .map_err(|e| LlmError::ResponseError(format!("Invalid optimization JSON: {}", e)))?;

        info!(
            "Optimizer returned {} improvement(s)",
            parsed.improvements.as_ref().map_or(0, Vec::len)
        );

        Ok(OptimizationResult {
            optimized_query: parsed
                .optimized_query
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| sql.to_string()),
            improvements: parsed.improvements.unwrap_or_default(),
        })
    }
}

/// Pulls the JSON object out of a model reply that may be wrapped in a
/// markdown fence or surrounded by prose.
pub fn extract_json(content: &str) -> &str {
    let mut body = content.trim();

    if let Some(start) = body.find("```") {
        let after_fence = &body[start + 3..];
        // Skip a language tag such as ```json
        let after_tag = after_fence
            .find('\n')
            .map(|nl| &after_fence[nl + 1..])
            .unwrap_or(after_fence);
        if let Some(end) = after_tag.find("```") {
            body = after_tag[..end].trim();
            debug!("Extracted JSON from code block markers");
        }
    }

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    }
}
