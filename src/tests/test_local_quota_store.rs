use std::{sync::Arc, time::Duration};

use super::runtime::{async_sleep, block_on};
use crate::{
    Algorithm, QuotaPolicy, QuotaState, QuotaStore,
    algorithms::FixedWindowState,
    common::now_ms,
    local::LocalQuotaStore,
};

fn fixed_window() -> QuotaPolicy {
    // 10 per 60 s
    QuotaPolicy::default_for(Algorithm::FixedWindow)
}

#[test]
fn apply_persists_state_under_the_key() {
    let store = LocalQuotaStore::new();
    let policy = fixed_window();

    store.apply("k", &policy, 1_000);
    store.apply("k", &policy, 1_500);

    assert_eq!(
        store.get("k", 1_500),
        Some(QuotaState::FixedWindow(FixedWindowState {
            count: 2,
            window_expires_at_ms: 61_000,
        }))
    );
    assert_eq!(store.get("other", 1_500), None);
}

#[test]
fn keys_are_isolated() {
    let store = LocalQuotaStore::new();
    let policy = QuotaPolicy::default_for(Algorithm::TokenBucket);

    for _ in 0..10 {
        assert!(store.apply("a", &policy, 0).admitted);
    }
    assert!(!store.apply("a", &policy, 0).admitted);

    assert!(store.apply("b", &policy, 0).admitted);
    assert_eq!(store.len(), 2);
}

#[test]
fn expired_entry_is_treated_as_absent() {
    let store = LocalQuotaStore::new();
    let policy = fixed_window();

    for _ in 0..10 {
        store.apply("k", &policy, 0);
    }
    assert!(!store.apply("k", &policy, 0).admitted);

    assert_eq!(store.get("k", 60_000), None);
    let reply = store.apply("k", &policy, 60_000);
    assert!(reply.admitted);
    assert_eq!(reply.observed, 1f64);
}

#[test]
fn purge_expired_removes_only_expired_entries() {
    let store = LocalQuotaStore::new();
    let fixed = fixed_window();
    let bucket = QuotaPolicy::default_for(Algorithm::TokenBucket);

    store.apply("fixed", &fixed, 0);
    // expires after a full refill, 10 s
    store.apply("bucket", &bucket, 0);

    assert_eq!(store.purge_expired(9_999), 0);
    assert_eq!(store.purge_expired(10_000), 1);
    assert_eq!(store.len(), 1);
    assert!(store.get("fixed", 10_000).is_some());

    assert_eq!(store.purge_expired(60_000), 1);
    assert!(store.is_empty());
}

#[test]
fn eval_matches_apply() {
    let store = LocalQuotaStore::new();
    let policy = QuotaPolicy::default_for(Algorithm::LeakingBucket);

    let reply = block_on(store.eval("k", &policy, 0)).unwrap();

    assert!(reply.admitted);
    assert_eq!(reply.observed, 1f64);
}

#[test]
fn concurrent_applies_on_one_key_are_serialised() {
    let store = Arc::new(LocalQuotaStore::new());
    let policy = fixed_window();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let policy = policy.clone();
            std::thread::spawn(move || {
                (0..100)
                    .filter(|_| store.apply("hot", &policy, 5).admitted)
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(admitted, 10);
    assert!(matches!(
        store.get("hot", 5),
        Some(QuotaState::FixedWindow(FixedWindowState { count: 800, .. }))
    ));
}

#[test]
fn cleanup_loop_purges_expired_entries() {
    let store = Arc::new(LocalQuotaStore::new());
    let policy = fixed_window();

    // written two minutes ago, so already past its 60 s window
    let past = now_ms() - 120_000;
    store.apply("stale-1", &policy, past);
    store.apply("stale-2", &policy, past);
    store.apply("fresh", &policy, now_ms());
    assert_eq!(store.len(), 3);

    block_on(async {
        store.run_cleanup_loop(Duration::from_millis(20));
        async_sleep(Duration::from_millis(150)).await;
    });

    assert_eq!(store.len(), 1);
    assert!(store.get("fresh", now_ms()).is_some());
}

#[test]
fn cleanup_loop_start_and_stop_are_idempotent() {
    let store = Arc::new(LocalQuotaStore::new());
    let policy = fixed_window();

    block_on(async {
        store.run_cleanup_loop(Duration::from_millis(20));
        store.run_cleanup_loop(Duration::from_millis(20));

        store.stop_cleanup_loop();
        store.stop_cleanup_loop();

        store.apply("stale", &policy, now_ms() - 120_000);
        async_sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len(), 1);

        store.run_cleanup_loop(Duration::from_millis(20));
        async_sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());
    });
}
