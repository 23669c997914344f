//! Caching, configuration updates and event listeners.

mod common;

use common::{builder, event_names, json, record_events, ScriptedTransport};
use resilient_api_client::{ApiEventKind, ConfigPatch, ErrorKind, RequestConfig};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize, PartialEq)]
struct Pokemon {
    id: u32,
    name: String,
}

#[tokio::test(start_paused = true)]
async fn test_repeated_gets_are_served_from_cache() {
    let transport = ScriptedTransport::new([json(200, r#"{"id":25,"name":"pikachu"}"#)]);
    let client = builder(&transport).build().unwrap();

    let first = client.get::<Pokemon>("/pokemon/25").await.unwrap();
    assert!(!first.from_cache);
    let before = client.metrics();

    for _ in 0..10 {
        let hit = client.get::<Pokemon>("/pokemon/25").await.unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.data.name, "pikachu");
        assert_eq!(hit.header("X-Cache"), Some("HIT"));
    }

    let after = client.metrics();
    assert_eq!(transport.calls(), 1);
    assert_eq!(after.cache_hits - before.cache_hits, 10);
    assert_eq!(after.cache_misses, before.cache_misses);
    assert_eq!(after.total_requests, 11);
    assert_eq!(client.cache_size(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_ttl() {
    let transport = ScriptedTransport::new([
        json(200, r#"{"v":1}"#),
        json(200, r#"{"v":2}"#),
    ]);
    let client = builder(&transport)
        .cache(true, Duration::from_secs(30))
        .build()
        .unwrap();

    assert_eq!(client.get::<Value>("/v").await.unwrap().data["v"], 1);
    tokio::time::advance(Duration::from_secs(20)).await;
    assert_eq!(client.get::<Value>("/v").await.unwrap().data["v"], 1);

    tokio::time::advance(Duration::from_secs(11)).await;
    let refreshed = client.get::<Value>("/v").await.unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(refreshed.data["v"], 2);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shorter_ttl_applies_to_existing_entries() {
    let transport = ScriptedTransport::new([json(200, "{}"), json(200, "{}")]);
    let client = builder(&transport).build().unwrap();

    client.get::<Value>("/v").await.unwrap();
    tokio::time::advance(Duration::from_secs(5)).await;
    client
        .update_config(ConfigPatch::new().cache_ttl(Duration::from_secs(1)))
        .unwrap();

    assert!(!client.get::<Value>("/v").await.unwrap().from_cache);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_bypassing_the_cache() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport).build().unwrap();

    client.get_with::<Value>("/live", false, RequestConfig::new()).await.unwrap();
    client.get_with::<Value>("/live", false, RequestConfig::new()).await.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(client.cache_size(), 0);
    let metrics = client.metrics();
    assert_eq!(metrics.cache_hits, 0);
    assert_eq!(metrics.cache_misses, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_cache_stores_nothing() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport)
        .cache(false, Duration::from_secs(60))
        .build()
        .unwrap();

    client.get::<Value>("/a").await.unwrap();
    client.get::<Value>("/a").await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(client.cache_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_params_are_part_of_the_key() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport).build().unwrap();

    let page = |n: u32| RequestConfig::new().with_param("page", n);
    client.get_with::<Value>("/list", true, page(1)).await.unwrap();
    client.get_with::<Value>("/list", true, page(2)).await.unwrap();
    client.get_with::<Value>("/list", true, page(1)).await.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(client.cache_size(), 2);
    assert!(transport.requests()[1].url.ends_with("/list?page=2"));
}

#[tokio::test(start_paused = true)]
async fn test_non_200_success_is_not_cached() {
    let transport = ScriptedTransport::new([json(203, r#"{"partial":true}"#)]);
    let client = builder(&transport).build().unwrap();

    let response = client.get::<Value>("/p").await.unwrap();
    assert_eq!(response.status, 203);
    assert_eq!(client.cache_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cache_by_pattern() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport).build().unwrap();
    for endpoint in ["/pokemon/1", "/pokemon/2", "/berry/1"] {
        client.get::<Value>(endpoint).await.unwrap();
    }
    let events = record_events(&client);

    assert_eq!(client.clear_cache(Some("pokemon")), 2);
    assert_eq!(client.cache_size(), 1);
    assert_eq!(client.clear_cache(None), 1);
    assert_eq!(client.cache_size(), 0);

    let events = events.lock().unwrap();
    let keys: Vec<(String, usize)> = events
        .iter()
        .filter_map(|e| match &e.kind {
            ApiEventKind::CacheClear { key, removed } => Some((key.clone(), *removed)),
            _ => None,
        })
        .collect();
    assert_eq!(keys, vec![("pokemon".to_string(), 2), ("all".to_string(), 1)]);
}

#[tokio::test(start_paused = true)]
async fn test_cached_value_of_the_wrong_shape_is_a_parse_error() {
    let transport = ScriptedTransport::new([json(200, r#"{"unexpected":true}"#)]);
    let client = builder(&transport).build().unwrap();

    client.get::<Value>("/shape").await.unwrap();
    let err = client.get::<Pokemon>("/shape").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
    assert_eq!(err.status, Some(200));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_does_not_break_the_call() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport).build().unwrap();
    client.add_event_listener(|_| panic!("listener bug"));
    let events = record_events(&client);

    let response = client.get::<Value>("/ok").await;
    assert!(response.is_ok());
    assert_eq!(event_names(&events), vec!["request", "cache_miss", "response"]);
}

#[tokio::test(start_paused = true)]
async fn test_removed_listener_stops_receiving() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport).build().unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let id = client.add_event_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    client.get::<Value>("/a").await.unwrap();
    let after_first = seen.load(Ordering::SeqCst);
    assert!(after_first > 0);

    assert!(client.remove_event_listener(id));
    assert!(!client.remove_event_listener(id));
    client.get::<Value>("/b").await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), after_first);
}

#[tokio::test(start_paused = true)]
async fn test_events_can_be_switched_off() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport).build().unwrap();
    let events = record_events(&client);

    client
        .update_config(ConfigPatch::new().events_enabled(false))
        .unwrap();
    client.get::<Value>("/quiet").await.unwrap();
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_patch_leaves_config_untouched() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport).retries(4).build().unwrap();

    let err = client
        .update_config(ConfigPatch::new().timeout(Duration::ZERO).retries(9))
        .unwrap_err();
    assert!(err.to_string().contains("timeout"));
    assert_eq!(client.config().retries, 4);

    client
        .update_config(ConfigPatch::new().retries(9))
        .unwrap();
    assert_eq!(client.config().retries, 9);
}

#[tokio::test(start_paused = true)]
async fn test_reset_metrics() {
    let transport = ScriptedTransport::new([]);
    let client = builder(&transport).build().unwrap();
    client.get::<Value>("/a").await.unwrap();
    assert_eq!(client.metrics().total_requests, 1);

    client.reset_metrics();
    assert_eq!(client.metrics(), Default::default());
}
