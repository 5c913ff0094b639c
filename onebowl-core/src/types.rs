use serde::{Deserialize, Serialize};

/// Recipe data pulled from a page, before analysis.
///
/// An empty `ingredients` list means the page had no usable recipe markup and
/// `instructions` holds the page's visible text instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecipe {
    pub title: String,
    pub ingredients: Vec<String>,
    pub instructions: String,
    pub source_url: String,
}

impl RawRecipe {
    /// True when the recipe came from recipe markup rather than page text.
    pub fn is_structured(&self) -> bool {
        !self.ingredients.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
    pub note: String,
}

/// A group of ingredients prepped and added together at one point in the method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bowl {
    pub label: String,
    pub explanation: String,
    pub ingredients: Vec<Ingredient>,
}

/// Result of the analysis stage, and the payload stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedRecipe {
    pub title: String,
    /// Analysis backends don't know where the recipe came from; the pipeline fills this in.
    #[serde(default)]
    pub source_url: String,
    pub bowls: Vec<Bowl>,
    pub method_steps: Vec<String>,
}

/// Identifies which extraction method was used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    JsonLd,
    Microdata,
    HtmlClasses,
    TextFallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::JsonLd => "json_ld",
            ExtractionMethod::Microdata => "microdata",
            ExtractionMethod::HtmlClasses => "html_classes",
            ExtractionMethod::TextFallback => "text_fallback",
        }
    }

    pub fn is_structured(&self) -> bool {
        !matches!(self, ExtractionMethod::TextFallback)
    }
}

/// Result of attempting a single extraction method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub method: ExtractionMethod,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of the extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRecipeOutput {
    pub raw_recipe: RawRecipe,
    /// Which method produced `raw_recipe`
    pub method_used: ExtractionMethod,
    /// Results from all attempted extraction methods, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_attempts: Vec<ExtractionAttempt>,
}
