use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use storefront::cache::{
    CacheAside, CacheClient, CacheConfig, Capabilities, MemorySubstrate, PrefixDeletion,
    Substrate, keys,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    id: i64,
    name: String,
}

fn widget(id: i64) -> Widget {
    Widget {
        id,
        name: format!("widget-{id}"),
    }
}

fn emulated() -> Capabilities {
    Capabilities {
        native_ttl: false,
        prefix_deletion: PrefixDeletion::Index,
        atomic_locks: false,
    }
}

async fn aside_with(capabilities: Capabilities) -> (CacheAside, Arc<MemorySubstrate>) {
    let config = CacheConfig {
        capabilities,
        ..CacheConfig::memory()
    };
    let substrate = Arc::new(MemorySubstrate::new());
    let client = CacheClient::connect(
        substrate.clone() as Arc<dyn Substrate>,
        capabilities,
        config.operation_timeout,
    )
    .await;
    (CacheAside::new(client, &config), substrate)
}

fn descriptors() -> [Capabilities; 2] {
    [Capabilities::defaults_for(storefront::cache::Backend::Memory), emulated()]
}

#[tokio::test]
async fn second_read_is_served_from_cache() {
    for caps in descriptors() {
        let (aside, _) = aside_with(caps).await;
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for _ in 0..3 {
            let value: Result<Widget, String> = aside
                .get_or_compute("widgets:id:id:1", None, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(widget(1))
                })
                .await;
            assert_eq!(value, Ok(widget(1)));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1, "{caps:?}");
    }
}

#[tokio::test]
async fn concurrent_misses_run_the_loader_once() {
    for caps in descriptors() {
        let (aside, _) = aside_with(caps).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..16).map(|_| {
            let aside = aside.clone();
            let calls = calls.clone();
            async move {
                aside
                    .get_or_compute("widgets:list:limit:100:skip:0", None, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, String>(vec![widget(1), widget(2)])
                    })
                    .await
            }
        });

        for result in join_all(callers).await {
            assert_eq!(result, Ok(vec![widget(1), widget(2)]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "{caps:?}");
    }
}

#[tokio::test]
async fn loader_errors_propagate_and_are_not_cached() {
    for caps in descriptors() {
        let (aside, substrate) = aside_with(caps).await;

        let failed: Result<Widget, String> = aside
            .get_or_compute("widgets:id:id:7", None, || async {
                Err("store unavailable".to_string())
            })
            .await;
        assert_eq!(failed, Err("store unavailable".to_string()));
        assert_eq!(substrate.get("widgets:id:id:7").await.expect("get"), None);

        // Lock was released on the error path.
        assert_eq!(
            substrate
                .get(&keys::lock_key("widgets:id:id:7"))
                .await
                .expect("get"),
            None
        );

        let recovered: Result<Widget, String> = aside
            .get_or_compute("widgets:id:id:7", None, || async { Ok(widget(7)) })
            .await;
        assert_eq!(recovered, Ok(widget(7)));
    }
}

#[tokio::test]
async fn malformed_payload_is_recomputed() {
    let (aside, substrate) = aside_with(Capabilities::defaults_for(
        storefront::cache::Backend::Memory,
    ))
    .await;
    substrate
        .set_ex("widgets:id:id:3", "{\"id\": 3, \"na", 60)
        .await
        .expect("seed");

    let value: Result<Widget, String> = aside
        .get_or_compute("widgets:id:id:3", None, || async { Ok(widget(3)) })
        .await;
    assert_eq!(value, Ok(widget(3)));

    let cached = substrate
        .get("widgets:id:id:3")
        .await
        .expect("get")
        .expect("entry rewritten");
    assert!(cached.contains("widget-3"));
}

#[tokio::test]
async fn disabled_cache_always_runs_the_loader() {
    let aside = CacheAside::new(CacheClient::disabled(), &CacheConfig::default());
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    for _ in 0..2 {
        let value: Result<Widget, String> = aside
            .get_or_compute("widgets:id:id:1", None, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(widget(1))
            })
            .await;
        assert_eq!(value, Ok(widget(1)));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(aside.invalidate_prefix("widgets:").await, 0);
    assert!(!aside.invalidate_key("widgets:id:id:1").await);
}

#[tokio::test]
async fn busy_lock_falls_back_after_bounded_retries() {
    let config = CacheConfig {
        lock_retries: 2,
        lock_retry_delay: Duration::from_millis(10),
        ..CacheConfig::memory()
    };
    let substrate = Arc::new(MemorySubstrate::new());
    let client = CacheClient::connect(
        substrate.clone() as Arc<dyn Substrate>,
        config.capabilities,
        config.operation_timeout,
    )
    .await;
    let aside = CacheAside::new(client.clone(), &config);

    // A crashed holder left the lock behind.
    assert!(
        client
            .try_acquire_lock(&keys::lock_key("widgets:id:id:9"), Duration::from_secs(10))
            .await
            .is_some()
    );

    let value: Result<Widget, String> = aside
        .get_or_compute("widgets:id:id:9", None, || async { Ok(widget(9)) })
        .await;
    assert_eq!(value, Ok(widget(9)));
    assert!(client.get("widgets:id:id:9").await.is_some());
}

#[tokio::test]
async fn invalidation_forces_a_reload() {
    for caps in descriptors() {
        let (aside, _) = aside_with(caps).await;
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let load = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(widget(1))
        };

        aside
            .get_or_compute::<Widget, _, _, _>("widgets:id:id:1", None, load)
            .await
            .expect("first load");
        aside
            .get_or_compute::<Widget, _, _, _>("widgets:list:limit:1:skip:0", None, load)
            .await
            .expect("list load");

        assert!(aside.invalidate_key("widgets:id:id:1").await);
        aside
            .get_or_compute::<Widget, _, _, _>("widgets:id:id:1", None, load)
            .await
            .expect("reload");
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        assert_eq!(aside.invalidate_prefix("widgets:").await, 2, "{caps:?}");
        aside
            .get_or_compute::<Widget, _, _, _>("widgets:list:limit:1:skip:0", None, load)
            .await
            .expect("list reload");
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}

#[tokio::test]
async fn explicit_ttl_is_honoured() {
    for caps in descriptors() {
        let (aside, _) = aside_with(caps).await;
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let load = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(widget(4))
        };

        let ttl = Some(Duration::from_secs(1));
        aside
            .get_or_compute::<Widget, _, _, _>("widgets:id:id:4", ttl, load)
            .await
            .expect("load");
        aside
            .get_or_compute::<Widget, _, _, _>("widgets:id:id:4", ttl, load)
            .await
            .expect("hit");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        aside
            .get_or_compute::<Widget, _, _, _>("widgets:id:id:4", ttl, load)
            .await
            .expect("reload");
        assert_eq!(counter.load(Ordering::SeqCst), 2, "{caps:?}");
    }
}
