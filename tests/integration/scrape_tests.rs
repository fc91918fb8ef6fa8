//! Method selection against live (mock) HTTP endpoints

use crate::{build_engine, product_page};
use quarry::{FailureKind, Method, PageIssue, ScrapeOptions, Strategy};
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_firecrawl(server: &MockServer, html: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": { "rawHtml": html }
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_not_found_never_reaches_remote() {
    let site = MockServer::start().await;
    let remote = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/404page"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&site)
        .await;
    mount_firecrawl(&remote, "<html>never</html>", 0).await;

    let engine = build_engine(Some(&remote));
    let outcome = engine
        .scrape(&format!("{}/404page", site.uri()), Strategy::Auto, &ScrapeOptions::default())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, Some(404));
    assert_eq!(outcome.failure, Some(FailureKind::NotFound));
    assert_eq!(outcome.methods_tried.iter().copied().collect::<Vec<_>>(), vec![Method::Direct]);
}

#[tokio::test]
async fn test_direct_success_does_not_call_remote() {
    let site = MockServer::start().await;
    let remote = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chair"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("Chair")))
        .mount(&site)
        .await;
    mount_firecrawl(&remote, "<html>never</html>", 0).await;

    let engine = build_engine(Some(&remote));
    let outcome = engine
        .scrape(&format!("{}/chair", site.uri()), Strategy::Auto, &ScrapeOptions::default())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.final_method, Method::Direct);
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn test_bot_wall_falls_back_to_remote() {
    let site = MockServer::start().await;
    let remote = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lamp"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>Attention Required! | Cloudflare</title></head>
               <body><div class="cf-browser-verification">Checking your browser</div></body></html>"#,
        ))
        .expect(2)
        .mount(&site)
        .await;
    mount_firecrawl(&remote, &product_page("Lamp"), 1).await;

    let engine = build_engine(Some(&remote));
    let url = format!("{}/lamp", site.uri());
    let outcome = engine.scrape(&url, Strategy::Auto, &ScrapeOptions::default()).await;

    assert!(outcome.success);
    assert_eq!(outcome.final_method, Method::RemoteApi);
    assert_eq!(outcome.status_code, Some(200));
    assert!(outcome.methods_tried.contains(&Method::Direct));
    assert!(outcome.methods_tried.contains(&Method::RemoteApi));
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.has_issue(PageIssue::BotDetected));
    assert!(outcome.has_issue(PageIssue::CaptchaPresent));
    assert!(outcome.content.unwrap().contains("Lamp"));
}

#[tokio::test]
async fn test_unreachable_site_falls_back_to_remote() {
    let remote = MockServer::start().await;
    mount_firecrawl(&remote, &product_page("Desk"), 1).await;

    let engine = build_engine(Some(&remote));
    let outcome = engine
        .scrape("http://127.0.0.1:1/desk", Strategy::Auto, &ScrapeOptions::default())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.final_method, Method::RemoteApi);
    assert_eq!(outcome.attempts, 3);
}

#[tokio::test]
async fn test_remote_provider_error_is_reported() {
    let site = MockServer::start().await;
    let remote = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&site)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
            "success": false,
            "error": "Insufficient credits"
        })))
        .expect(1)
        .mount(&remote)
        .await;

    let engine = build_engine(Some(&remote));
    let outcome = engine
        .scrape(&format!("{}/sofa", site.uri()), Strategy::Auto, &ScrapeOptions::default())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.final_method, Method::RemoteApi);
    assert_eq!(outcome.failure, Some(FailureKind::RemoteApi { timeout: false }));
    assert!(outcome.error_reason.unwrap().contains("Insufficient credits"));
    assert_eq!(outcome.methods_tried.len(), 2);
}

#[tokio::test]
async fn test_remote_only_strategy_skips_direct() {
    let site = MockServer::start().await;
    let remote = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("Rug")))
        .expect(0)
        .mount(&site)
        .await;
    mount_firecrawl(&remote, &product_page("Rug"), 1).await;

    let engine = build_engine(Some(&remote));
    let outcome = engine
        .scrape(&format!("{}/rug", site.uri()), Strategy::RemoteApi, &ScrapeOptions::default())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.methods_tried.len(), 1);
}

#[tokio::test]
async fn test_governor_bounds_parallel_remote_calls() {
    let remote = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "success": true,
                    "data": { "rawHtml": "<html>slow</html>" }
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(6)
        .mount(&remote)
        .await;

    let engine = std::sync::Arc::new(build_engine(Some(&remote)));
    let started = Instant::now();

    let mut handles = Vec::new();
    for i in 0..6 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .scrape(
                    &format!("https://shop.example/item/{}", i),
                    Strategy::RemoteApi,
                    &ScrapeOptions::default(),
                )
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    // Two slots, six calls of 200ms each: at least three rounds
    assert!(started.elapsed() >= Duration::from_millis(550));
    assert_eq!(engine.governor().available(), 2);
}
