//! Integration tests for the fetcher
//!
//! These tests use wiremock to stand in for the catalog and check the cache,
//! retry budget and challenge handling end-to-end.

mod common;

use common::{fast_settings, test_fetcher, RecordingSleeper, ScriptedSolver, SolverMode};
use mdb_harvest::cache::ContentCache;
use mdb_harvest::crawler::PageRequest;
use mdb_harvest::{ErrorKind, HarvestError, Partition};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn url_for(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).expect("Failed to build URL")
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("network"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let cache = ContentCache::open(dir.path()).unwrap();
    let year = Partition::year(1999);
    let url = url_for(&server, "/film/1/");
    cache
        .store(Some(&year), &PageRequest::get(url.clone()).cache_key(), "cached")
        .unwrap();

    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = test_fetcher(
        cache,
        fast_settings(),
        ScriptedSolver::new(SolverMode::Solve),
        sleeper.clone(),
    );

    let body = fetcher.get(&url, Some(&year)).await.unwrap();
    assert_eq!(body.as_deref(), Some("cached"));
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn test_download_is_cached_in_partition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/2/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>two</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let cache = ContentCache::open(dir.path()).unwrap();
    let year = Partition::year(2000);
    let url = url_for(&server, "/film/2/");
    let fetcher = test_fetcher(
        cache.clone(),
        fast_settings(),
        ScriptedSolver::new(SolverMode::Solve),
        Arc::new(RecordingSleeper::default()),
    );

    let first = fetcher.get(&url, Some(&year)).await.unwrap();
    let second = fetcher.get(&url, Some(&year)).await.unwrap();

    assert_eq!(first.as_deref(), Some("<html>two</html>"));
    assert_eq!(first, second);
    assert!(cache.contains(Some(&year), &PageRequest::get(url).cache_key()));
}

#[tokio::test]
async fn test_force_download_refreshes_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/3/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let cache = ContentCache::open(dir.path()).unwrap();
    let year = Partition::year(2001);
    let url = url_for(&server, "/film/3/");
    let key = PageRequest::get(url.clone()).cache_key();
    cache.store(Some(&year), &key, "stale").unwrap();

    let fetcher = test_fetcher(
        cache.clone(),
        fast_settings(),
        ScriptedSolver::new(SolverMode::Solve),
        Arc::new(RecordingSleeper::default()),
    );

    let body = fetcher
        .fetch(&PageRequest::get(url).force_download(true), Some(&year))
        .await
        .unwrap();
    assert_eq!(body.as_deref(), Some("fresh"));
    assert_eq!(cache.lookup(Some(&year), &key).unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_transient_failures_consume_budget_with_growing_delay() {
    let server = MockServer::start().await;

    // First two requests outlive the client timeout
    Mock::given(method("GET"))
        .and(path("/film/4/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/film/4/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let mut settings = fast_settings();
    settings.max_attempts = 5;
    settings.request_timeout = Duration::from_millis(300);

    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = test_fetcher(
        ContentCache::open(dir.path()).unwrap(),
        settings,
        ScriptedSolver::new(SolverMode::Solve),
        sleeper.clone(),
    );

    let body = fetcher
        .get(&url_for(&server, "/film/4/"), Some(&Partition::year(2002)))
        .await
        .unwrap();

    assert_eq!(body.as_deref(), Some("finally"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(10), Duration::from_secs(20)]
    );
}

#[tokio::test]
async fn test_exhausted_budget_yields_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/5/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let cache = ContentCache::open(dir.path()).unwrap();
    let mut settings = fast_settings();
    settings.request_timeout = Duration::from_millis(300);

    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = test_fetcher(
        cache.clone(),
        settings,
        ScriptedSolver::new(SolverMode::Solve),
        sleeper.clone(),
    );

    let year = Partition::year(2003);
    let url = url_for(&server, "/film/5/");
    let body = fetcher.get(&url, Some(&year)).await.unwrap();

    assert_eq!(body, None);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    // No wait after the last failure
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(10), Duration::from_secs(20)]
    );
    assert!(!cache.contains(Some(&year), &PageRequest::get(url).cache_key()));
}

#[tokio::test]
async fn test_http_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/6/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let fetcher = test_fetcher(
        ContentCache::open(dir.path()).unwrap(),
        fast_settings(),
        ScriptedSolver::new(SolverMode::Solve),
        Arc::new(RecordingSleeper::default()),
    );

    let body = fetcher
        .get(&url_for(&server, "/film/6/"), None)
        .await
        .unwrap();
    assert_eq!(body, None);
}

#[tokio::test]
async fn test_challenges_are_transparent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/7/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::challenge_html()))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/film/7/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>real film</html>"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let cache = ContentCache::open(dir.path()).unwrap();
    let solver = ScriptedSolver::new(SolverMode::Solve);
    let fetcher = test_fetcher(
        cache.clone(),
        fast_settings(),
        solver.clone(),
        Arc::new(RecordingSleeper::default()),
    );

    let year = Partition::year(2004);
    let url = url_for(&server, "/film/7/");
    let body = fetcher.get(&url, Some(&year)).await.unwrap();

    assert_eq!(body.as_deref(), Some("<html>real film</html>"));
    assert_eq!(solver.call_count(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    // The challenge page never reaches the cache
    let cached = cache
        .lookup(Some(&year), &PageRequest::get(url).cache_key())
        .unwrap();
    assert_eq!(cached.as_deref(), Some("<html>real film</html>"));
}

#[tokio::test]
async fn test_endless_challenges_are_bounded_by_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/17/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::challenge_html()))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let solver = ScriptedSolver::new(SolverMode::Solve);
    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = test_fetcher(
        ContentCache::open(dir.path()).unwrap(),
        fast_settings(),
        solver.clone(),
        sleeper.clone(),
    );

    let body = tokio::time::timeout(
        Duration::from_secs(10),
        fetcher.get(&url_for(&server, "/film/17/"), None),
    )
    .await
    .expect("fetch must stop once the budget is spent")
    .unwrap();

    assert_eq!(body, None);
    assert_eq!(solver.call_count(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn test_unresolved_challenges_share_the_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/8/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::challenge_html()))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let solver = ScriptedSolver::new(SolverMode::Unresolved);
    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = test_fetcher(
        ContentCache::open(dir.path()).unwrap(),
        fast_settings(),
        solver.clone(),
        sleeper.clone(),
    );

    let body = fetcher
        .get(&url_for(&server, "/film/8/"), None)
        .await
        .unwrap();

    assert_eq!(body, None);
    assert_eq!(solver.call_count(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(10), Duration::from_secs(20)]
    );
}

#[tokio::test]
async fn test_malformed_challenge_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/film/9/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::challenge_html()))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let fetcher = test_fetcher(
        ContentCache::open(dir.path()).unwrap(),
        fast_settings(),
        ScriptedSolver::new(SolverMode::Malformed),
        Arc::new(RecordingSleeper::default()),
    );

    let err = fetcher
        .get(&url_for(&server, "/film/9/"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::ChallengeMalformed { .. }));
    assert_eq!(err.kind(), ErrorKind::Fatal);
}

#[tokio::test]
async fn test_post_requests_are_salted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/list/"))
        .and(body_string_contains("page=2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("page two"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let cache = ContentCache::open(dir.path()).unwrap();
    let fetcher = test_fetcher(
        cache.clone(),
        fast_settings(),
        ScriptedSolver::new(SolverMode::Solve),
        Arc::new(RecordingSleeper::default()),
    );

    let url = url_for(&server, "/list/");
    let request = PageRequest::post(url.clone(), vec![("page".to_string(), "2".to_string())])
        .with_salt("2");
    let year = Partition::year(2005);

    assert_eq!(
        fetcher.fetch(&request, Some(&year)).await.unwrap().as_deref(),
        Some("page two")
    );
    // Served from the salted entry the second time
    assert_eq!(
        fetcher.fetch(&request, Some(&year)).await.unwrap().as_deref(),
        Some("page two")
    );
    assert!(!cache.contains(Some(&year), &PageRequest::get(url).cache_key()));
}
