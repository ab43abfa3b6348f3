//! Integration tests for the captcha resolver
//!
//! A single mock server plays both the catalog (image and check endpoints)
//! and the OCR service (createTask / getTaskResult).

mod common;

use base64::Engine;
use common::{challenge_html, fast_settings, RecordingSleeper};
use mdb_harvest::cache::{CacheKey, ContentCache};
use mdb_harvest::crawler::{
    build_http_client, CaptchaResolver, CaptchaSettings, ChallengeSolver, ChallengeStage, Fetcher,
    CAPTCHA_NAMESPACE,
};
use mdb_harvest::{HarvestError, Partition};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMAGE: &[u8] = b"\x89PNG fake image bytes";

fn resolver(server: &MockServer, cache: ContentCache, sleeper: Arc<RecordingSleeper>) -> CaptchaResolver {
    let client = build_http_client(&fast_settings()).expect("Failed to build client");
    let settings = CaptchaSettings {
        service_url: Url::parse(&server.uri()).unwrap(),
        client_key: "secret".to_string(),
        language_pool: "rn".to_string(),
        poll_interval: Duration::from_secs(10),
    };
    CaptchaResolver::new(client, settings, cache, sleeper)
}

async fn mount_image(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/captchaimg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE))
        .mount(server)
        .await;
}

async fn mount_create_task(server: &MockServer) {
    let encoded = base64::engine::general_purpose::STANDARD.encode(IMAGE);
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .and(body_partial_json(json!({
            "clientKey": "secret",
            "languagePool": "rn",
            "task": { "type": "ImageToTextTask", "body": encoded }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errorId": 0, "taskId": 7 })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_ready_after_one_poll(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/getTaskResult"))
        .and(body_partial_json(json!({ "clientKey": "secret", "taskId": 7 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorId": 0,
            "status": "processing"
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/getTaskResult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorId": 0,
            "status": "ready",
            "solution": { "text": "xyzzy" }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_resolver_solves_challenge() {
    let server = MockServer::start().await;
    mount_image(&server).await;
    mount_create_task(&server).await;
    mount_ready_after_one_poll(&server).await;
    Mock::given(method("GET"))
        .and(path("/checkcaptcha"))
        .and(query_param("key", "00aa11bb"))
        .and(query_param("retpath", "/film/1/_retpath"))
        .and(query_param("rep", "xyzzy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let cache = ContentCache::open(dir.path()).unwrap();
    let sleeper = Arc::new(RecordingSleeper::default());
    let resolver = resolver(&server, cache.clone(), sleeper.clone());

    let page = Url::parse(&format!("{}/film/1/", server.uri())).unwrap();
    resolver
        .solve(&page, &challenge_html())
        .await
        .expect("Challenge should be solved");

    // One wait between the two polls
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(10)]);

    let image_key = CacheKey::derive(&format!("{}/captchaimg?aW1n", server.uri()), None);
    let stored = std::fs::read(cache.artifact_path(CAPTCHA_NAMESPACE, &image_key)).unwrap();
    assert_eq!(stored, IMAGE);
}

#[tokio::test]
async fn test_service_error_is_unresolved_at_submission() {
    let server = MockServer::start().await;
    mount_image(&server).await;
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorId": 1,
            "errorCode": "ERROR_KEY_DOES_NOT_EXIST",
            "errorDescription": "Account authorization key not found in the system"
        })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let resolver = resolver(
        &server,
        ContentCache::open(dir.path()).unwrap(),
        Arc::new(RecordingSleeper::default()),
    );

    let page = Url::parse(&format!("{}/film/1/", server.uri())).unwrap();
    let err = resolver.solve(&page, &challenge_html()).await.unwrap_err();

    match err {
        HarvestError::ChallengeUnresolved { stage, reason } => {
            assert_eq!(stage, ChallengeStage::TaskSubmitted);
            assert!(reason.contains("authorization key"));
        }
        other => panic!("expected unresolved challenge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_image_is_unresolved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/captchaimg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let resolver = resolver(
        &server,
        ContentCache::open(dir.path()).unwrap(),
        Arc::new(RecordingSleeper::default()),
    );

    let page = Url::parse(&format!("{}/film/1/", server.uri())).unwrap();
    let err = resolver.solve(&page, &challenge_html()).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        HarvestError::ChallengeUnresolved {
            stage: ChallengeStage::ImageFetched,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_task_is_unresolved_while_polling() {
    let server = MockServer::start().await;
    mount_image(&server).await;
    mount_create_task(&server).await;
    Mock::given(method("POST"))
        .and(path("/getTaskResult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorId": 0,
            "status": "failed"
        })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let resolver = resolver(
        &server,
        ContentCache::open(dir.path()).unwrap(),
        Arc::new(RecordingSleeper::default()),
    );

    let page = Url::parse(&format!("{}/film/1/", server.uri())).unwrap();
    let err = resolver.solve(&page, &challenge_html()).await.unwrap_err();
    assert!(matches!(
        err,
        HarvestError::ChallengeUnresolved {
            stage: ChallengeStage::Polling,
            ..
        }
    ));
}

#[tokio::test]
async fn test_rejected_answer_is_unresolved() {
    let server = MockServer::start().await;
    mount_image(&server).await;
    mount_create_task(&server).await;
    mount_ready_after_one_poll(&server).await;
    Mock::given(method("GET"))
        .and(path("/checkcaptcha"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let resolver = resolver(
        &server,
        ContentCache::open(dir.path()).unwrap(),
        Arc::new(RecordingSleeper::default()),
    );

    let page = Url::parse(&format!("{}/film/1/", server.uri())).unwrap();
    let err = resolver.solve(&page, &challenge_html()).await.unwrap_err();
    assert!(matches!(
        err,
        HarvestError::ChallengeUnresolved {
            stage: ChallengeStage::SolutionSubmitted,
            ..
        }
    ));
}

#[tokio::test]
async fn test_fetcher_with_resolver_gets_real_page() {
    let server = MockServer::start().await;
    mount_image(&server).await;
    mount_create_task(&server).await;
    mount_ready_after_one_poll(&server).await;
    Mock::given(method("GET"))
        .and(path("/checkcaptcha"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/film/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(challenge_html()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/film/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>film one</html>"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let cache = ContentCache::open(dir.path()).unwrap();
    let sleeper = Arc::new(RecordingSleeper::default());
    let settings = fast_settings();
    let client = build_http_client(&settings).unwrap();
    let fetcher = Fetcher::new(
        client,
        cache.clone(),
        settings,
        Box::new(resolver(&server, cache, sleeper.clone())),
        sleeper,
    );

    let page = Url::parse(&format!("{}/film/1/", server.uri())).unwrap();
    let body = fetcher
        .get(&page, Some(&Partition::year(1999)))
        .await
        .unwrap();
    assert_eq!(body.as_deref(), Some("<html>film one</html>"));
}
