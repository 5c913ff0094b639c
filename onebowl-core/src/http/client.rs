//! HTTP client trait and implementations.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::guard::{UrlGuard, ValidatedUrl};

/// Trait for HTTP clients, enabling mockability in tests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch HTML content from a URL that passed the guard.
    async fn fetch_html(&self, target: &ValidatedUrl) -> Result<String, FetchError>;
}

/// Production client: bounded timeout, fixed user agent, DNS pinned to the
/// guard-approved addresses, redirects followed manually and re-validated.
pub struct SafeClient {
    guard: UrlGuard,
    config: FetchConfig,
}

impl SafeClient {
    pub fn new(guard: UrlGuard, config: FetchConfig) -> Self {
        Self { guard, config }
    }

    /// Build a client whose DNS for this host resolves only to the validated addresses.
    fn client_for(&self, target: &ValidatedUrl) -> Result<reqwest::Client, FetchError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            // A proxy would resolve the host itself and bypass the pinned addresses
            .no_proxy();

        if target.url().domain().is_some() {
            builder = builder.resolve_to_addrs(target.host(), &target.socket_addrs());
        }

        builder
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {}", e)))
    }
}

#[async_trait]
impl HttpClient for SafeClient {
    async fn fetch_html(&self, target: &ValidatedUrl) -> Result<String, FetchError> {
        let mut current = target.clone();

        for hop in 0..=self.config.max_redirects {
            let client = self.client_for(&current)?;

            tracing::debug!(url = current.as_str(), hop, "network: fetching");
            let response = client
                .get(current.url().clone())
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            let status = response.status();
            if is_followed_redirect(status) {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok());
                let next = redirect_target(current.url(), location)?;
                tracing::debug!(
                    from = current.as_str(),
                    to = next.as_str(),
                    status = %status,
                    "network: redirect"
                );
                current = self.guard.validate_url(next).await?;
                continue;
            }

            if !status.is_success() {
                tracing::debug!(
                    url = current.as_str(),
                    status = %status,
                    "network: request failed"
                );
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: current.as_str().to_string(),
                });
            }

            tracing::debug!(
                url = current.as_str(),
                status = %status,
                "network: fetched successfully"
            );
            return response
                .text()
                .await
                .map_err(|e| FetchError::Network(format!("failed to read body: {}", e)));
        }

        Err(FetchError::Redirect(format!(
            "too many redirects (limit {})",
            self.config.max_redirects
        )))
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Resolve a `Location` header value against the URL that returned it.
pub fn redirect_target(base: &Url, location: Option<&str>) -> Result<Url, FetchError> {
    let location = location
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| {
            FetchError::Redirect(format!("redirect from {} without a Location header", base))
        })?;

    base.join(location)
        .map_err(|e| FetchError::Redirect(format!("invalid redirect target '{}': {}", location, e)))
}

/// Mock response for testing.
#[derive(Clone)]
pub enum MockResponse {
    Html(String),
    Status(u16),
    Error(String),
}

/// Mock HTTP client for testing.
///
/// Responses are keyed by URL with any fragment removed, mirroring what goes on the wire.
pub struct MockClient {
    responses: HashMap<String, MockResponse>,
    requests: AtomicUsize,
}

impl MockClient {
    /// Create a new empty mock client.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            requests: AtomicUsize::new(0),
        }
    }

    /// Add a response for a URL.
    pub fn with_response(mut self, url: &str, response: MockResponse) -> Self {
        self.responses.insert(wire_key(url), response);
        self
    }

    /// Add an HTML response for a URL.
    pub fn with_html(self, url: &str, html: &str) -> Self {
        self.with_response(url, MockResponse::Html(html.to_string()))
    }

    /// Add an HTTP status failure for a URL.
    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_response(url, MockResponse::Status(status))
    }

    /// Add a network error for a URL.
    pub fn with_error(self, url: &str, error: &str) -> Self {
        self.with_response(url, MockResponse::Error(error.to_string()))
    }

    /// Number of fetches attempted against this client.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

fn wire_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn fetch_html(&self, target: &ValidatedUrl) -> Result<String, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let key = wire_key(target.as_str());
        match self.responses.get(&key) {
            Some(MockResponse::Html(html)) => Ok(html.clone()),
            Some(MockResponse::Status(status)) => Err(FetchError::HttpStatus {
                status: *status,
                url: key,
            }),
            Some(MockResponse::Error(e)) => Err(FetchError::Network(e.clone())),
            None => Err(FetchError::Network(format!(
                "No mock response for URL: {}",
                key
            ))),
        }
    }
}
