//! End-to-end cache behavior through the public crate API.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use strato::cache::ComputeError;

use support::harness;

#[tokio::test]
async fn set_value_is_retrievable_until_its_ttl_elapses() {
    let h = harness();

    h.remote
        .set("k1", &json!({"payload": true}), Duration::from_millis(40))
        .await
        .unwrap();
    assert_eq!(
        h.remote.get("k1").await.unwrap(),
        Some(json!({"payload": true}))
    );

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.remote.get("k1").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_callers_coalesce_into_one_computation() {
    let h = harness();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = h.manager.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            manager
                .get_or_compute("shared", Duration::from_secs(60), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(json!("answer"))
                })
                .await
        }));
    }

    let mut results: Vec<Result<Value, ComputeError>> = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap(), json!("answer"));
    }
}

#[tokio::test]
async fn tier_counters_account_for_every_read() {
    let h = harness();

    // three cold keys: memory miss + distributed miss + compute each
    for key in ["a", "b", "c"] {
        h.manager
            .get_or_compute(key, Duration::from_secs(60), || async { Ok(json!("v")) })
            .await
            .unwrap();
    }

    // two warm repeats served by the memory tier
    for key in ["a", "b"] {
        h.manager
            .get_or_compute(key, Duration::from_secs(60), || async {
                Err(ComputeError::new("must not compute"))
            })
            .await
            .unwrap();
    }

    // one cold key while the distributed tier is down
    h.backend.fail_get.store(true, Ordering::Relaxed);
    h.manager
        .get_or_compute("d", Duration::from_secs(60), || async { Ok(json!("v")) })
        .await
        .unwrap();

    let report = h.manager.performance_report();
    assert_eq!(report.tiers.memory.hits, 2);
    assert_eq!(report.tiers.memory.misses, 4);

    let remote = h.remote.counters();
    assert_eq!(remote.hits + remote.misses + remote.errors, 4);
    assert_eq!(remote.misses, 3);
    assert_eq!(remote.errors, 1);
}

#[tokio::test]
async fn warmup_refreshes_registered_keys_from_upstream() {
    let h = harness();
    h.backend
        .seed_raw("hot:posts", "\"rendered-index\"", Duration::from_secs(60));

    // warm by refreshing from the distributed tier, the way the binary
    // wires configured keys
    let remote = h.remote.clone();
    h.manager.register_hot_key(
        "hot:posts",
        Duration::from_secs(60),
        Arc::new(move || {
            let remote = remote.clone();
            Box::pin(async move {
                match remote.get("hot:posts").await {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Err(ComputeError::new("no upstream value")),
                    Err(err) => Err(ComputeError::new(err.to_string())),
                }
            })
        }),
    );

    let report = h.manager.warm_up().await;
    assert_eq!(report.warmed, vec!["hot:posts".to_string()]);

    // the key is now served from the memory tier
    let value = h
        .manager
        .get_or_compute("hot:posts", Duration::from_secs(60), || async {
            Err(ComputeError::new("must not compute"))
        })
        .await
        .unwrap();
    assert_eq!(value, json!("rendered-index"));
}

#[tokio::test]
async fn values_written_by_one_path_are_visible_to_the_other() {
    let h = harness();

    // a compute write lands in both tiers; a direct distributed read sees it
    h.manager
        .get_or_compute("k1", Duration::from_secs(60), || async {
            Ok(json!({"n": 1}))
        })
        .await
        .unwrap();
    assert_eq!(h.remote.get("k1").await.unwrap(), Some(json!({"n": 1})));

    // a direct distributed write is picked up by the manager read path
    h.remote
        .set("k2", &json!({"n": 2}), Duration::from_secs(60))
        .await
        .unwrap();
    let value = h
        .manager
        .get_or_compute("k2", Duration::from_secs(60), || async {
            Err(ComputeError::new("must not compute"))
        })
        .await
        .unwrap();
    assert_eq!(value, json!({"n": 2}));
}
