//! Cache-aware fetching and cache persistence

use crate::{build_engine, product_page};
use quarry::cache::CacheStore;
use quarry::{Method, OriginFlag, ScrapeOptions, Strategy};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_cached_page_survives_reopen() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shelf"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("Shelf")))
        .expect(1)
        .mount(&site)
        .await;
    let dir = TempDir::new().unwrap();
    let url = format!("{}/shelf", site.uri());
    let engine = build_engine(None);

    {
        let cache = CacheStore::open(dir.path()).unwrap();
        let outcome = engine
            .fetch(&cache, &url, Strategy::Auto, &ScrapeOptions::default())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.final_method, Method::Direct);
    }

    let cache = CacheStore::open(dir.path()).unwrap();
    assert_eq!(cache.memory_len(), 0);

    let outcome = engine
        .fetch(&cache, &url, Strategy::Auto, &ScrapeOptions::default())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.final_method, Method::Cached);
    assert_eq!(outcome.content, Some(product_page("Shelf")));

    let entry = cache.entry(&url).unwrap().unwrap();
    assert_eq!(entry.origin, OriginFlag::Scraped);
    assert_eq!(entry.access_count, 1);
}

#[tokio::test]
async fn test_imported_pages_are_served_without_fetching() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("Live")))
        .expect(0)
        .mount(&site)
        .await;
    let dir = TempDir::new().unwrap();
    let url = format!("{}/bench", site.uri());
    let seed = dir.path().join("llm_results.csv");
    std::fs::write(
        &seed,
        format!(
            "product_url,success,html_content,final_method,status_code\n{},True,<html>imported bench</html>,firecrawl,200.0\n",
            url
        ),
    )
    .unwrap();

    let cache = CacheStore::open(dir.path().join("cache")).unwrap();
    assert_eq!(cache.import_from(&seed, false).await.unwrap(), 1);

    let engine = build_engine(None);
    let outcome = engine
        .fetch(&cache, &url, Strategy::Auto, &ScrapeOptions::default())
        .await;

    assert_eq!(outcome.final_method, Method::Cached);
    assert_eq!(outcome.content.as_deref(), Some("<html>imported bench</html>"));
    assert_eq!(cache.entry(&url).unwrap().unwrap().origin, OriginFlag::Imported);
}

#[tokio::test]
async fn test_concurrent_puts_are_visible_to_all_readers() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(CacheStore::open(dir.path()).unwrap());

    let mut handles = Vec::new();
    for i in 0..20 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let url = format!("https://shop.example/item/{}", i);
            cache
                .put(&url, &format!("<html>{}</html>", i), Default::default())
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let urls: Vec<String> = (0..20)
        .map(|i| format!("https://shop.example/item/{}", i))
        .collect();
    cache.clear_memory();
    let found = cache.get_batch(&urls).await.unwrap();

    assert_eq!(found.len(), 20);
    assert_eq!(
        found["https://shop.example/item/7"].as_deref(),
        Some("<html>7</html>")
    );
    assert_eq!(cache.stats(3).unwrap().total_entries, 20);
}

#[tokio::test]
async fn test_export_manifest_lists_every_entry() {
    let dir = TempDir::new().unwrap();
    let cache = CacheStore::open(dir.path().join("cache")).unwrap();
    for name in ["a", "b", "c"] {
        cache
            .put(
                &format!("https://shop.example/{}", name),
                "<html></html>",
                Default::default(),
            )
            .await
            .unwrap();
    }

    let manifest = dir.path().join("manifest.csv");
    assert_eq!(cache.export_manifest(&manifest).unwrap(), 3);

    let written = std::fs::read_to_string(&manifest).unwrap();
    assert_eq!(written.lines().count(), 4);
    assert!(written.lines().next().unwrap().starts_with("url,cache_key,"));
}
