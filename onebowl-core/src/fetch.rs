//! One-shot guarded fetching.
//!
//! Validates the URL with the system resolver and fetches it through a
//! [`SafeClient`]. Long-lived callers should build the guard and client once
//! and reuse them, as the pipeline does.

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::guard::UrlGuard;
use crate::http::{HttpClient, SafeClient};

/// Fetch HTML content from a URL after SSRF validation.
pub async fn fetch_html(url: &str, config: &FetchConfig) -> Result<String, FetchError> {
    let guard = UrlGuard::system(config.timeout);
    let target = guard.validate(url).await?;
    SafeClient::new(guard, config.clone()).fetch_html(&target).await
}
