//! Configuration, built once at process start and passed by reference.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default SQLite file for the result cache.
pub const DEFAULT_DB_PATH: &str = "cache.db";

/// Client-agent string sent with every page fetch.
pub const DEFAULT_USER_AGENT: &str = "OneBowl/1.0";

/// Default bound on DNS resolution and page fetches.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// Default number of redirect hops followed (each one re-validated).
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5-20250514";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Which analysis backend serves bowl analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisProvider {
    Anthropic,
    OpenAi,
    Fake,
}

impl AnalysisProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(AnalysisProvider::Anthropic),
            "openai" => Some(AnalysisProvider::OpenAi),
            "fake" => Some(AnalysisProvider::Fake),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisProvider::Anthropic => "anthropic",
            AnalysisProvider::OpenAi => "openai",
            AnalysisProvider::Fake => "fake",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            AnalysisProvider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            AnalysisProvider::OpenAi => DEFAULT_OPENAI_MODEL,
            AnalysisProvider::Fake => "fake-model",
        }
    }

    fn api_key_var(&self) -> Option<&'static str> {
        match self {
            AnalysisProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
            AnalysisProvider::OpenAi => Some("OPENAI_API_KEY"),
            AnalysisProvider::Fake => None,
        }
    }
}

/// Settings for the guard and the page fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Bounds both DNS resolution and the HTTP request.
    pub timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl FetchConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Fetch settings from `ONEBOWL_FETCH_TIMEOUT_SECS` and `ONEBOWL_MAX_REDIRECTS`.
    ///
    /// Unlike `Config::from_env` this needs no API key, so fetch-only tools can use it.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut fetch = Self::default();
        if let Some(secs) = parse_var::<u64>(&lookup, "ONEBOWL_FETCH_TIMEOUT_SECS")? {
            fetch = fetch.timeout(Duration::from_secs(secs));
        }
        if let Some(hops) = parse_var::<usize>(&lookup, "ONEBOWL_MAX_REDIRECTS")? {
            fetch = fetch.max_redirects(hops);
        }
        Ok(fetch)
    }
}

/// Settings for the analysis backend.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub provider: AnalysisProvider,
    /// Empty for the fake provider.
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl AnalysisConfig {
    /// Configuration for `provider` with its default model.
    pub fn new(provider: AnalysisProvider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: provider.default_model().to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub fetch: FetchConfig,
    pub analysis: AnalysisConfig,
    /// Serialize concurrent requests for the same uncached URL.
    pub dedup_in_flight: bool,
}

impl Config {
    pub fn new(db_path: impl Into<PathBuf>, analysis: AnalysisConfig) -> Self {
        Self {
            db_path: db_path.into(),
            fetch: FetchConfig::default(),
            analysis,
            dedup_in_flight: true,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `CACHE_DB_PATH`: SQLite cache file (default: "cache.db")
    /// - `ONEBOWL_PROVIDER`: "anthropic" (default), "openai" or "fake"
    /// - `ONEBOWL_MODEL`: model override for the selected provider
    /// - `ONEBOWL_FETCH_TIMEOUT_SECS`: fetch and DNS timeout (default: 15)
    /// - `ONEBOWL_MAX_REDIRECTS`: redirect hops to follow (default: 10)
    /// - `ONEBOWL_DEDUP_IN_FLIGHT`: "false" to let same-URL requests run concurrently
    ///
    /// Required for the selected provider:
    /// - `ANTHROPIC_API_KEY` or `OPENAI_API_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = env::var("CACHE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let provider = match env::var("ONEBOWL_PROVIDER") {
            Ok(value) => AnalysisProvider::parse(&value).ok_or(ConfigError::InvalidValue {
                name: "ONEBOWL_PROVIDER".to_string(),
                value,
            })?,
            Err(_) => AnalysisProvider::Anthropic,
        };

        let api_key = match provider.api_key_var() {
            Some(var) => env::var(var)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))?,
            None => String::new(),
        };

        let mut analysis = AnalysisConfig::new(provider, api_key);
        if let Ok(model) = env::var("ONEBOWL_MODEL") {
            analysis = analysis.model(model);
        }

        let fetch = FetchConfig::from_env()?;

        let dedup_in_flight = env::var("ONEBOWL_DEDUP_IN_FLIGHT")
            .map(|v| !(v == "false" || v == "0"))
            .unwrap_or(true);

        Ok(Self {
            db_path,
            fetch,
            analysis,
            dedup_in_flight,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(
            AnalysisProvider::parse("Anthropic"),
            Some(AnalysisProvider::Anthropic)
        );
        assert_eq!(
            AnalysisProvider::parse("claude"),
            Some(AnalysisProvider::Anthropic)
        );
        assert_eq!(
            AnalysisProvider::parse(" openai "),
            Some(AnalysisProvider::OpenAi)
        );
        assert_eq!(AnalysisProvider::parse("gemini"), None);
    }

    #[test]
    fn test_analysis_config_uses_provider_default_model() {
        let config = AnalysisConfig::new(AnalysisProvider::OpenAi, "key");
        assert_eq!(config.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);

        let config = AnalysisConfig::new(AnalysisProvider::Anthropic, "key").model("custom");
        assert_eq!(config.model, "custom");
    }

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.user_agent, "OneBowl/1.0");
        assert_eq!(config.max_redirects, 10);
    }

    #[test]
    fn test_fetch_config_reads_overrides() {
        let config = FetchConfig::from_lookup(|name| match name {
            "ONEBOWL_FETCH_TIMEOUT_SECS" => Some("3".to_string()),
            "ONEBOWL_MAX_REDIRECTS" => Some(" 2 ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_redirects, 2);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);

        let config = FetchConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.max_redirects, DEFAULT_MAX_REDIRECTS);
    }

    #[test]
    fn test_fetch_config_rejects_bad_numbers() {
        let err = FetchConfig::from_lookup(|name| {
            (name == "ONEBOWL_MAX_REDIRECTS").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref name, ref value }
                if name == "ONEBOWL_MAX_REDIRECTS" && value == "many"
        ));
    }
}
