mod support;

use std::collections::HashSet;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::{Value, json};
use serial_test::serial;
use support::{Harness, MemoryStore, entity};
use tripwire::cache::{CacheConfig, FetchOnMiss, PageKey, RenderedPage};
use tripwire::domain::entities::EntityType;
use tripwire::domain::pages::PageType;

#[tokio::test]
#[serial]
async fn invalidation_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = MemoryStore::new();
    store.live(EntityType::City, "lis", &[]);
    store.live(EntityType::Hotel, "h1", &[("cityId", "lis")]);
    let harness = Harness::new(
        store.clone(),
        CacheConfig {
            storage_limit: 2,
            retry_attempts: 1,
            ..CacheConfig::default()
        },
    );

    // Entity cache: miss + fetch, hit, capacity eviction.
    let fetch = Some(FetchOnMiss {
        expire_in_seconds: Some(60),
    });
    let ids: Vec<String> = ["h1", "h2", "h3"].iter().map(|id| id.to_string()).collect();
    let _: Option<Vec<Value>> = harness
        .entities
        .get(EntityType::Hotel, &ids, &[], fetch)
        .await
        .expect("fetch");
    let _: Option<Value> = harness
        .entities
        .get_single(EntityType::Hotel, "h3")
        .await
        .expect("hit");
    harness.clock.advance(std::time::Duration::from_secs(120));
    let _: Option<Value> = harness
        .entities
        .get_single(EntityType::Hotel, "h3")
        .await
        .expect("expired");
    harness
        .entities
        .set(EntityType::City, &json!({"id": "lis"}), None)
        .await
        .expect("set");

    // Invalidation: precise closure, then a conservative fallback.
    harness.pages.insert(
        PageKey::entity(PageType::HotelDetail, "h1"),
        RenderedPage::html("<h1>h1</h1>"),
    );
    harness
        .trigger
        .entities_changed(vec![entity(EntityType::City, "lis")], true)
        .await
        .expect("consumed");
    store.fail_lookups(true);
    harness
        .trigger
        .entities_changed(vec![entity(EntityType::Hotel, "h1")], true)
        .await
        .expect("consumed");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "tripwire_entity_cache_hit_total",
        "tripwire_entity_cache_miss_total",
        "tripwire_entity_cache_expired_total",
        "tripwire_entity_cache_evict_total",
        "tripwire_origin_fetch_ms",
        "tripwire_invalidation_queue_len",
        "tripwire_invalidation_consume_ms",
        "tripwire_invalidation_fallback_total",
        "tripwire_page_cache_invalidated_total",
        "tripwire_tracker_resolve_ms",
        "tripwire_tracker_closure_size",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
