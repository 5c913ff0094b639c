//! Bowl analysis backends.
//!
//! An analyzer takes the bowl system prompt plus a recipe message and returns
//! the recipe reorganized into bowls. The backend is picked explicitly by
//! [`AnalysisProvider`] in the configuration.

mod anthropic;
mod fake;
mod openai;
pub mod prompts;

pub use anthropic::AnthropicAnalyzer;
pub use fake::FakeAnalyzer;
pub use openai::OpenAiAnalyzer;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::config::{AnalysisConfig, AnalysisProvider};
use crate::types::AnalyzedRecipe;

/// Error type for analysis backends.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Analysis returned an empty response")]
    EmptyResponse,

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Trait for analysis backends.
///
/// Implementations are stateless apart from their client and thread-safe.
#[async_trait]
pub trait RecipeAnalyzer: Send + Sync + fmt::Debug {
    /// Ask the backend to organize `content` into bowls following `system_prompt`.
    async fn analyze(
        &self,
        system_prompt: &str,
        content: &str,
    ) -> Result<AnalyzedRecipe, AnalysisError>;

    /// Get the provider name (e.g., "anthropic", "openai", "fake").
    fn provider_name(&self) -> &'static str;

    /// Get the model name.
    fn model_name(&self) -> &str;
}

/// Build the analyzer selected by the configuration.
pub fn create_analyzer(config: &AnalysisConfig) -> Result<Box<dyn RecipeAnalyzer>, AnalysisError> {
    let requires_key = !matches!(config.provider, AnalysisProvider::Fake);
    if requires_key && config.api_key.trim().is_empty() {
        return Err(AnalysisError::NotConfigured(format!(
            "no API key for provider {}",
            config.provider.as_str()
        )));
    }

    let analyzer: Box<dyn RecipeAnalyzer> = match config.provider {
        AnalysisProvider::Anthropic => Box::new(AnthropicAnalyzer::new(
            config.api_key.clone(),
            config.model.clone(),
            config.max_tokens,
        )),
        AnalysisProvider::OpenAi => Box::new(OpenAiAnalyzer::new(
            &config.api_key,
            config.model.clone(),
            config.max_tokens,
        )),
        AnalysisProvider::Fake => Box::new(FakeAnalyzer::default()),
    };

    tracing::debug!(
        provider = analyzer.provider_name(),
        model = analyzer.model_name(),
        "analysis backend ready"
    );
    Ok(analyzer)
}

/// Parse a model reply into an [`AnalyzedRecipe`].
///
/// Tolerates code fences and prose around the JSON object.
pub fn parse_analysis(text: &str) -> Result<AnalyzedRecipe, AnalysisError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }

    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(AnalysisError::ParseError(
                "no JSON object in response".to_string(),
            ))
        }
    };

    serde_json::from_str(json).map_err(|e| AnalysisError::ParseError(e.to_string()))
}
