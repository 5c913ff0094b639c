//! End-to-end tests for the request pipeline.
//!
//! The network is replaced by `MockClient`, DNS by `StaticResolver` and the
//! analysis backend by `FakeAnalyzer`; the cache is a real SQLite file.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use onebowl_core::analysis::FakeAnalyzer;
use onebowl_core::{
    AnalysisError, AnalyzedRecipe, Bowl, CacheStore, ExtractError, FailureKind, FetchError,
    GuardError, HttpClient, Ingredient, MockClient, Pipeline, PipelineError, StaticResolver,
    UrlGuard, ValidatedUrl,
};
use tempfile::TempDir;

const URL: &str = "https://recipes.example/bread";

const RECIPE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Simple Bread | Recipes Example</title>
    <script type="application/ld+json">
    {
        "@context": "https://schema.org",
        "@type": "Recipe",
        "name": "Simple Bread",
        "recipeIngredient": ["2 cups flour", "1 egg"],
        "recipeInstructions": "Mix and bake."
    }
    </script>
</head>
<body><main><h1>Simple Bread</h1></main></body>
</html>"#;

const TEXT_ONLY_PAGE: &str = r#"<html>
<head><title>Grandma's Stew</title></head>
<body>
    <nav>Home | Recipes</nav>
    <main>
        <p>You will need two pounds of beef, three carrots and an onion.</p>
        <p>Brown the beef, add the vegetables and simmer for two hours.</p>
    </main>
</body>
</html>"#;

fn guard() -> UrlGuard {
    let public: IpAddr = "93.184.216.34".parse().unwrap();
    let private: IpAddr = "10.0.0.5".parse().unwrap();
    let resolver = StaticResolver::new()
        .with_host("recipes.example", &[public])
        .with_host("internal.example", &[private]);
    UrlGuard::new(Arc::new(resolver), Duration::from_secs(1))
}

fn analyzed() -> AnalyzedRecipe {
    AnalyzedRecipe {
        title: "Simple Bread".to_string(),
        source_url: String::new(),
        bowls: vec![Bowl {
            label: "Everything".to_string(),
            explanation: "Mixed together at the start.".to_string(),
            ingredients: vec![
                Ingredient {
                    name: "flour".to_string(),
                    quantity: "2 cups".to_string(),
                    note: String::new(),
                },
                Ingredient {
                    name: "egg".to_string(),
                    quantity: "1".to_string(),
                    note: String::new(),
                },
            ],
        }],
        method_steps: vec!["Mix and bake.".to_string()],
    }
}

struct Harness {
    _dir: TempDir,
    pipeline: Pipeline,
    cache: CacheStore,
    client: Arc<MockClient>,
    analyzer: Arc<FakeAnalyzer>,
}

fn harness(client: MockClient, analyzer: FakeAnalyzer) -> Harness {
    let dir = TempDir::new().unwrap();
    let cache = CacheStore::open(dir.path().join("cache.db")).unwrap();
    let client = Arc::new(client);
    let analyzer = Arc::new(analyzer);

    let pipeline = Pipeline::new(cache.clone(), guard(), client.clone(), analyzer.clone());

    Harness {
        _dir: dir,
        pipeline,
        cache,
        client,
        analyzer,
    }
}

#[tokio::test]
async fn test_first_call_analyzes_second_call_hits_cache() {
    let h = harness(
        MockClient::new().with_html(URL, RECIPE_PAGE),
        FakeAnalyzer::new(analyzed()),
    );

    let first = h.pipeline.process(URL).await.unwrap();
    assert_eq!(first.title, "Simple Bread");
    assert_eq!(first.source_url, URL);
    assert_eq!(h.client.requests(), 1);
    assert_eq!(h.analyzer.call_count(), 1);
    assert_eq!(
        h.analyzer.messages(),
        vec![
            "Recipe: Simple Bread\n\nIngredients:\n- 2 cups flour\n- 1 egg\n\nMethod:\nMix and bake."
        ]
    );
    assert_eq!(h.cache.get(URL).unwrap(), Some(first.clone()));

    let second = h
        .pipeline
        .process("https://recipes.example/bread#comments")
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(h.client.requests(), 1);
    assert_eq!(h.analyzer.call_count(), 1);
}

#[tokio::test]
async fn test_text_only_page_uses_raw_text_framing() {
    let h = harness(
        MockClient::new().with_html(URL, TEXT_ONLY_PAGE),
        FakeAnalyzer::new(analyzed()),
    );

    h.pipeline.process(URL).await.unwrap();

    let messages = h.analyzer.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Below is raw text from a recipe page."));
    assert!(messages[0].contains("two pounds of beef"));
    assert!(!messages[0].contains("Home | Recipes"));
}

#[tokio::test]
async fn test_blocked_host_is_never_fetched() {
    let h = harness(
        MockClient::new().with_html("http://internal.example/admin", RECIPE_PAGE),
        FakeAnalyzer::new(analyzed()),
    );

    let err = h
        .pipeline
        .process("http://internal.example/admin")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(GuardError::BlockedNetwork { .. })
    ));
    assert_eq!(err.kind(), FailureKind::Fetch);
    assert_eq!(h.client.requests(), 0);
    assert_eq!(h.analyzer.call_count(), 0);
    assert!(h.cache.recent(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_non_http_scheme_is_rejected() {
    let h = harness(MockClient::new(), FakeAnalyzer::new(analyzed()));

    let err = h
        .pipeline
        .process("ftp://recipes.example/bread")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(GuardError::InvalidUrl(_))
    ));
    assert_eq!(h.client.requests(), 0);
}

#[tokio::test]
async fn test_http_error_writes_nothing() {
    let h = harness(
        MockClient::new().with_status(URL, 404),
        FakeAnalyzer::new(analyzed()),
    );

    let err = h.pipeline.process(URL).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Fetch(FetchError::HttpStatus { status: 404, .. })
    ));
    assert_eq!(err.kind(), FailureKind::Fetch);
    assert_eq!(h.analyzer.call_count(), 0);
    assert_eq!(h.cache.get(URL).unwrap(), None);
}

#[tokio::test]
async fn test_page_without_recipe_writes_nothing() {
    let h = harness(
        MockClient::new().with_html(URL, "<html><body><p>Nothing here.</p></body></html>"),
        FakeAnalyzer::new(analyzed()),
    );

    let err = h.pipeline.process(URL).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Extraction(ExtractError::InsufficientContent { .. })
    ));
    assert_eq!(err.kind(), FailureKind::Fetch);
    assert_eq!(h.analyzer.call_count(), 0);
    assert_eq!(h.cache.get(URL).unwrap(), None);
}

#[tokio::test]
async fn test_analysis_failure_writes_nothing() {
    let h = harness(
        MockClient::new().with_html(URL, RECIPE_PAGE),
        FakeAnalyzer::failing("model overloaded"),
    );

    let err = h.pipeline.process(URL).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Analysis(AnalysisError::ApiError { .. })
    ));
    assert_eq!(err.kind(), FailureKind::Analysis);
    assert_eq!(h.cache.get(URL).unwrap(), None);

    // Nothing was cached, so a retry goes back to the network
    let _ = h.pipeline.process(URL).await;
    assert_eq!(h.client.requests(), 2);
}

#[tokio::test]
async fn test_flag_and_recent_normalize_urls() {
    let h = harness(
        MockClient::new().with_html(URL, RECIPE_PAGE),
        FakeAnalyzer::new(analyzed()),
    );

    assert!(!h.pipeline.flag(URL).unwrap());

    h.pipeline.process(URL).await.unwrap();

    assert!(h.pipeline.flag("https://recipes.example/bread#method").unwrap());
    assert!(h.cache.entry(URL).unwrap().unwrap().flagged);

    let recent = h.pipeline.recent(10).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].source_url, URL);
}

/// Client that takes a while to answer, so concurrent requests overlap.
struct SlowClient {
    html: String,
    requests: AtomicUsize,
}

#[async_trait]
impl HttpClient for SlowClient {
    async fn fetch_html(&self, _target: &ValidatedUrl) -> Result<String, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(self.html.clone())
    }
}

fn slow_pipeline(dedup: bool) -> (TempDir, Arc<Pipeline>, Arc<SlowClient>) {
    let dir = TempDir::new().unwrap();
    let cache = CacheStore::open(dir.path().join("cache.db")).unwrap();
    let client = Arc::new(SlowClient {
        html: RECIPE_PAGE.to_string(),
        requests: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::new(
        cache,
        guard(),
        client.clone(),
        Arc::new(FakeAnalyzer::new(analyzed())),
    )
    .with_dedup(dedup);
    (dir, Arc::new(pipeline), client)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_url_fetches_once() {
    let (_dir, pipeline, client) = slow_pipeline(true);

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let url = format!("{}#copy{}", URL, i);
                pipeline.process(&url).await
            })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }

    assert_eq!(client.requests.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_without_dedup_concurrent_requests_each_fetch() {
    let (_dir, pipeline, client) = slow_pipeline(false);

    let a = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.process(URL).await })
    };
    let b = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.process(URL).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(client.requests.load(Ordering::SeqCst), 2);
}

/// Client that never answers within a test's lifetime.
struct HangingClient;

#[async_trait]
impl HttpClient for HangingClient {
    async fn fetch_html(&self, _target: &ValidatedUrl) -> Result<String, FetchError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(FetchError::Network("gave up".to_string()))
    }
}

fn hanging_pipeline() -> (TempDir, Arc<Pipeline>) {
    let dir = TempDir::new().unwrap();
    let cache = CacheStore::open(dir.path().join("cache.db")).unwrap();
    let pipeline = Pipeline::new(
        cache,
        guard(),
        Arc::new(HangingClient),
        Arc::new(FakeAnalyzer::new(analyzed())),
    );
    (dir, Arc::new(pipeline))
}

#[tokio::test]
async fn test_cancelled_requests_leave_no_in_flight_entries() {
    let (_dir, pipeline) = hanging_pipeline();

    for i in 0..50 {
        let url = format!("https://recipes.example/{}", i);
        let result = tokio::time::timeout(Duration::from_millis(5), pipeline.process(&url)).await;
        assert!(result.is_err(), "request {} should have timed out", i);
    }

    assert_eq!(pipeline.in_flight_requests(), 0);
}

#[tokio::test]
async fn test_in_flight_entry_lives_until_last_request_ends() {
    let (_dir, pipeline) = hanging_pipeline();

    let holder = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.process(URL).await })
    };
    while pipeline.in_flight_requests() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // A second caller waits on the holder's lock and gives up
    let waiter = tokio::time::timeout(Duration::from_millis(5), pipeline.process(URL)).await;
    assert!(waiter.is_err());
    assert_eq!(pipeline.in_flight_requests(), 1);

    holder.abort();
    assert!(holder.await.unwrap_err().is_cancelled());
    assert_eq!(pipeline.in_flight_requests(), 0);
}
