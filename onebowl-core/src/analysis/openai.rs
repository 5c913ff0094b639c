//! OpenAI Chat Completions backend.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;

use super::{parse_analysis, AnalysisError, RecipeAnalyzer};
use crate::types::AnalyzedRecipe;

pub struct OpenAiAnalyzer {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAnalyzer")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiAnalyzer {
    pub fn new(api_key: &str, model: String, max_tokens: u32) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model,
            max_tokens,
        }
    }

    fn messages(
        system_prompt: &str,
        content: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>, AnalysisError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| {
                AnalysisError::RequestFailed(format!("Failed to build system message: {}", e))
            })?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| {
                AnalysisError::RequestFailed(format!("Failed to build user message: {}", e))
            })?;
        Ok(vec![system.into(), user.into()])
    }
}

#[async_trait]
impl RecipeAnalyzer for OpenAiAnalyzer {
    async fn analyze(
        &self,
        system_prompt: &str,
        content: &str,
    ) -> Result<AnalyzedRecipe, AnalysisError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::messages(system_prompt, content)?)
            .max_completion_tokens(self.max_tokens)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| AnalysisError::RequestFailed(e.to_string()))?;

        tracing::debug!(model = %self.model, "calling OpenAI chat completions");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AnalysisError::RequestFailed(e.to_string()))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AnalysisError::EmptyResponse)?;

        parse_analysis(&text)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
