//! Fake analysis backend for tests and offline runs.
//!
//! Returns a fixed reply without network access and records every message it
//! was asked to analyze.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{AnalysisError, RecipeAnalyzer};
use crate::types::{AnalyzedRecipe, Bowl, Ingredient};

#[derive(Debug)]
enum FakeReply {
    Recipe(AnalyzedRecipe),
    Error(String),
}

#[derive(Debug)]
pub struct FakeAnalyzer {
    reply: FakeReply,
    calls: Mutex<Vec<String>>,
}

impl FakeAnalyzer {
    /// Always answer with `recipe`.
    pub fn new(recipe: AnalyzedRecipe) -> Self {
        Self {
            reply: FakeReply::Recipe(recipe),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with an API error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            reply: FakeReply::Error(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of `analyze` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// User messages received, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for FakeAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzedRecipe {
            title: "Fake Recipe".to_string(),
            source_url: String::new(),
            bowls: vec![Bowl {
                label: "Everything".to_string(),
                explanation: "Combine at the start.".to_string(),
                ingredients: vec![Ingredient {
                    name: "ingredients".to_string(),
                    quantity: "as listed".to_string(),
                    note: String::new(),
                }],
            }],
            method_steps: vec!["Follow the original recipe.".to_string()],
        })
    }
}

#[async_trait]
impl RecipeAnalyzer for FakeAnalyzer {
    async fn analyze(
        &self,
        _system_prompt: &str,
        content: &str,
    ) -> Result<AnalyzedRecipe, AnalysisError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(content.to_string());
        }

        match &self.reply {
            FakeReply::Recipe(recipe) => Ok(recipe.clone()),
            FakeReply::Error(message) => Err(AnalysisError::ApiError {
                status: 500,
                message: message.clone(),
            }),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
