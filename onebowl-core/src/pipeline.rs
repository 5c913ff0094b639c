//! Request orchestration: cache lookup, guarded fetch, extraction, analysis,
//! cache write.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info_span, Instrument};

use crate::analysis::prompts::{render_analysis_message, BOWL_SYSTEM_PROMPT};
use crate::analysis::{create_analyzer, AnalysisError, RecipeAnalyzer};
use crate::cache::{normalize, CacheError, CacheStore};
use crate::config::Config;
use crate::error::{ExtractError, FetchError, GuardError};
use crate::extract::extract;
use crate::guard::UrlGuard;
use crate::http::{HttpClient, SafeClient};
use crate::types::AnalyzedRecipe;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] GuardError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Coarse classification of a failed request, for callers that report
/// "could not fetch" and "could not analyze" differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    Analysis,
    Storage,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Validation(_)
            | PipelineError::Fetch(_)
            | PipelineError::Extraction(_) => FailureKind::Fetch,
            PipelineError::Analysis(_) => FailureKind::Analysis,
            PipelineError::Cache(_) => FailureKind::Storage,
        }
    }
}

/// Turns a recipe URL into a cached bowl analysis.
pub struct Pipeline {
    cache: CacheStore,
    guard: UrlGuard,
    client: Arc<dyn HttpClient>,
    analyzer: Arc<dyn RecipeAnalyzer>,
    /// Per-key locks for requests currently being processed; `None` disables deduplication.
    in_flight: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl Pipeline {
    /// Assemble a pipeline from its parts. Same-URL deduplication starts enabled.
    pub fn new(
        cache: CacheStore,
        guard: UrlGuard,
        client: Arc<dyn HttpClient>,
        analyzer: Arc<dyn RecipeAnalyzer>,
    ) -> Self {
        Self {
            cache,
            guard,
            client,
            analyzer,
            in_flight: Some(DashMap::new()),
        }
    }

    /// Enable or disable serialization of concurrent requests for the same URL.
    pub fn with_dedup(mut self, enabled: bool) -> Self {
        self.in_flight = enabled.then(DashMap::new);
        self
    }

    /// Production pipeline: SQLite cache, system DNS, guarded HTTP client and
    /// the configured analysis backend.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let cache = CacheStore::open(&config.db_path)?;
        let guard = UrlGuard::system(config.fetch.timeout);
        let client = SafeClient::new(guard.clone(), config.fetch.clone());
        let analyzer: Arc<dyn RecipeAnalyzer> = Arc::from(create_analyzer(&config.analysis)?);

        tracing::info!(
            db_path = %config.db_path.display(),
            provider = analyzer.provider_name(),
            model = analyzer.model_name(),
            dedup = config.dedup_in_flight,
            "pipeline ready"
        );

        Ok(Self::new(cache, guard, Arc::new(client), analyzer).with_dedup(config.dedup_in_flight))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Return the bowl analysis for `url`, from the cache when possible.
    ///
    /// A failure anywhere before the cache write leaves the cache untouched.
    pub async fn process(&self, url: &str) -> Result<AnalyzedRecipe, PipelineError> {
        let key = normalize(url);
        self.process_key(url, &key)
            .instrument(info_span!("process", key = %key))
            .await
    }

    async fn process_key(&self, url: &str, key: &str) -> Result<AnalyzedRecipe, PipelineError> {
        if let Some(hit) = self.cache.get(key)? {
            tracing::info!("served from cache");
            return Ok(hit);
        }

        let Some(in_flight) = &self.in_flight else {
            return self.fetch_and_analyze(url, key).await;
        };

        // Declared first so it drops after `lock`, including on cancellation
        let slot = InFlightSlot::new(in_flight, key);
        let lock = slot.join();
        let result = self.process_locked(&lock, url, key).await;
        result
    }

    async fn process_locked(
        &self,
        lock: &Mutex<()>,
        url: &str,
        key: &str,
    ) -> Result<AnalyzedRecipe, PipelineError> {
        let _guard = lock.lock().await;

        // Another request for this key may have finished while we waited
        if let Some(hit) = self.cache.get(key)? {
            tracing::info!("served from cache after waiting on in-flight request");
            return Ok(hit);
        }

        self.fetch_and_analyze(url, key).await
    }

    async fn fetch_and_analyze(
        &self,
        url: &str,
        key: &str,
    ) -> Result<AnalyzedRecipe, PipelineError> {
        let extracted = async {
            let target = self.guard.validate(url).await?;
            let html = self.client.fetch_html(&target).await?;
            let extracted = extract(&html, url)?;
            Ok::<_, PipelineError>(extracted)
        }
        .instrument(info_span!("fetch", url))
        .await?;

        tracing::info!(
            method = extracted.method_used.as_str(),
            ingredients = extracted.raw_recipe.ingredients.len(),
            "recipe extracted"
        );

        let raw = extracted.raw_recipe;
        let message = render_analysis_message(&raw);

        let mut analyzed = self
            .analyzer
            .analyze(BOWL_SYSTEM_PROMPT, &message)
            .instrument(info_span!(
                "analyze",
                provider = self.analyzer.provider_name(),
                model = self.analyzer.model_name()
            ))
            .await?;
        analyzed.source_url = raw.source_url;

        self.cache.put(key, &analyzed)?;
        tracing::info!(bowls = analyzed.bowls.len(), "analysis stored");

        Ok(analyzed)
    }

    /// Number of URLs with a request currently holding or waiting on their lock.
    pub fn in_flight_requests(&self) -> usize {
        self.in_flight.as_ref().map_or(0, DashMap::len)
    }

    /// Most recently analyzed recipes, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AnalyzedRecipe>, PipelineError> {
        Ok(self.cache.recent(limit)?)
    }

    /// Flag the cached analysis for `url`. False when nothing is cached for it.
    pub fn flag(&self, url: &str) -> Result<bool, PipelineError> {
        Ok(self.cache.flag(&normalize(url))?)
    }
}

/// Registration of a request in the in-flight map.
///
/// Dropping it removes the key's entry once no other request shares the lock,
/// so entries do not outlive finished or cancelled requests. Lock handles
/// obtained from `join` must be dropped first.
struct InFlightSlot<'a> {
    map: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
}

impl<'a> InFlightSlot<'a> {
    fn new(map: &'a DashMap<String, Arc<Mutex<()>>>, key: &'a str) -> Self {
        Self { map, key }
    }

    fn join(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.map.entry(self.key.to_string()).or_default())
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        // Handles are cloned under the shard lock, so a count of one is final
        self.map
            .remove_if(self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let err = PipelineError::from(GuardError::InvalidUrl("ftp://x".to_string()));
        assert_eq!(err.kind(), FailureKind::Fetch);

        let err = PipelineError::from(FetchError::HttpStatus {
            status: 404,
            url: "https://recipes.example/".to_string(),
        });
        assert_eq!(err.kind(), FailureKind::Fetch);

        let err = PipelineError::from(ExtractError::InsufficientContent { length: 3 });
        assert_eq!(err.kind(), FailureKind::Fetch);

        let err = PipelineError::from(AnalysisError::EmptyResponse);
        assert_eq!(err.kind(), FailureKind::Analysis);

        let err = PipelineError::from(CacheError::Pool("gone".to_string()));
        assert_eq!(err.kind(), FailureKind::Storage);
    }

    #[test]
    fn test_validation_error_message_is_transparent() {
        let err = PipelineError::from(GuardError::InvalidUrl("only http and https".to_string()));
        assert_eq!(err.to_string(), "Invalid URL: only http and https");
    }
}
