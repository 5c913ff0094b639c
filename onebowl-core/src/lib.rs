pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod guard;
pub mod http;
pub mod pipeline;
pub mod types;

pub use analysis::{create_analyzer, AnalysisError, RecipeAnalyzer};
pub use cache::{normalize, CacheEntry, CacheError, CacheStore, DEFAULT_RECENT_LIMIT};
pub use config::{AnalysisConfig, AnalysisProvider, Config, ConfigError, FetchConfig};
pub use error::{ExtractError, FetchError, GuardError};
pub use extract::extract;
pub use fetch::fetch_html;
pub use guard::{is_blocked_ip, Resolver, StaticResolver, SystemResolver, UrlGuard, ValidatedUrl};
pub use http::{HttpClient, MockClient, MockResponse, SafeClient};
pub use pipeline::{FailureKind, Pipeline, PipelineError};
pub use types::{
    AnalyzedRecipe, Bowl, ExtractRecipeOutput, ExtractionAttempt, ExtractionMethod, Ingredient,
    RawRecipe,
};
