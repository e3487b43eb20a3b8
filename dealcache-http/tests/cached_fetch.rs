//! End-to-end: REST producer behind the keyed cache.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dealcache_http::{ApiClient, ApiConfig};
use dealcache_store::{BindingPhase, CacheError, KeyedAsyncCache, ObserveOptions};

#[derive(Debug, Deserialize, PartialEq)]
struct Deal {
    id: String,
    stage: String,
}

async fn deals_server(expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/p1/deals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "d1", "stage": "diligence" },
            { "id": "d2", "stage": "closing" }
        ])))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_second_observer_within_ttl_skips_network() {
    let server = deals_server(1).await;
    let client = ApiClient::new(ApiConfig::new(server.uri())).unwrap();
    let cache = KeyedAsyncCache::new();

    let producer = client.producer::<Vec<Deal>>("/api/projects/p1/deals");
    let key = producer.cache_key();
    let options = ObserveOptions::new().ttl_ms(300_000);

    let first = cache.observe(key.clone(), producer.clone(), options.clone()).unwrap();
    let snapshot = first.wait_settled().await;
    assert_eq!(snapshot.data().unwrap().len(), 2);

    let second = cache.observe(key, producer, options).unwrap();
    assert!(!second.is_loading());
    assert_eq!(second.data().unwrap()[1].stage, "closing");
    // MockServer verifies `expect(1)` on drop
}

#[tokio::test]
async fn test_refetch_hits_network_again() {
    let server = deals_server(2).await;
    let client = ApiClient::new(ApiConfig::new(server.uri())).unwrap();
    let cache = KeyedAsyncCache::new();

    let producer = client.producer::<Vec<Deal>>("/api/projects/p1/deals");
    let binding = cache
        .observe(producer.cache_key(), producer, ObserveOptions::new())
        .unwrap();
    binding.wait_settled().await;

    binding.refetch().await;
    assert_eq!(binding.phase(), BindingPhase::Fresh);
    assert_eq!(cache.stats().fetches, 2);
}

#[tokio::test]
async fn test_backend_error_lands_in_binding() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Project not found" })))
        .mount(&server)
        .await;

    let client = ApiClient::new(ApiConfig::new(server.uri())).unwrap();
    let cache = KeyedAsyncCache::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let producer = client.producer::<Vec<Deal>>("/api/projects/missing/deals");
    let options = ObserveOptions::new().on_error(move |e| {
        let _ = tx.send(e.clone());
    });
    let binding = cache.observe(producer.cache_key(), producer, options).unwrap();

    let snapshot = binding.wait_settled().await;
    assert_eq!(snapshot.phase, BindingPhase::Errored);
    assert!(snapshot.error.unwrap().contains("Project not found"));
    assert_eq!(
        rx.recv().await.unwrap(),
        CacheError::Status {
            status: 404,
            body: "Project not found".into()
        }
    );
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_superseded_request_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let client = ApiClient::new(ApiConfig::new(server.uri())).unwrap();
    let cache = KeyedAsyncCache::new();

    let producer = client.producer::<Vec<Deal>>("/api/projects/p1/deals");
    let binding = cache
        .observe(producer.cache_key(), producer, ObserveOptions::new())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(binding);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = cache.stats();
    assert_eq!(stats.cancellations, 1);
    assert_eq!(stats.failures, 0);
    assert!(cache.is_empty());
}
