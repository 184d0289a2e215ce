use std::env;

use redis::AsyncCommands;

use super::runtime::block_on;
use crate::{
    Algorithm, Capacity, QuotaGateError, QuotaPolicy, QuotaStore, RatePerSecond, RequestLimit, WindowSizeMs,
    algorithms::{
        FixedWindowCounter, LeakingBucket, SlidingWindowCounter, SlidingWindowLog, TokenBucket,
    },
    local::LocalQuotaStore,
    redis::{RedisQuotaStore, RedisQuotaStoreOptions, parse_script_reply},
};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_key(algorithm: Algorithm) -> String {
    let n: u64 = rand::random();
    format!("quotagate_test_{n}:client:{algorithm}")
}

async fn connect(url: &str) -> redis::aio::ConnectionManager {
    let client = redis::Client::open(url).unwrap();
    client.get_connection_manager().await.unwrap()
}

fn policies() -> Vec<QuotaPolicy> {
    let limit = RequestLimit::try_from(3u64).unwrap();
    let window = WindowSizeMs::try_from(1_000u64).unwrap();
    let capacity = Capacity::try_from(3u64).unwrap();
    let rate = RatePerSecond::try_from(2f64).unwrap();

    vec![
        QuotaPolicy::FixedWindow(FixedWindowCounter::new(limit, window)),
        QuotaPolicy::SlidingWindowLog(SlidingWindowLog::new(limit, window)),
        QuotaPolicy::SlidingWindowCounter(SlidingWindowCounter::new(limit, window)),
        QuotaPolicy::TokenBucket(TokenBucket::new(capacity, rate)),
        QuotaPolicy::LeakingBucket(LeakingBucket::new(capacity, rate)),
    ]
}

#[test]
fn redis_store_agrees_with_local_store() {
    let Some(url) = redis_url() else {
        eprintln!("REDIS_URL not set, skipping");
        return;
    };

    block_on(async {
        let redis_store = RedisQuotaStore::new(RedisQuotaStoreOptions {
            connection_manager: connect(&url).await,
        });
        let local_store = LocalQuotaStore::new();

        // caller clock, so the sequence is deterministic apart from the
        // fixed window whose expiry Redis tracks in real time
        let base = crate::common::now_ms();
        let offsets = [0u64, 0, 0, 0, 100, 250, 500, 600, 900];

        for policy in policies() {
            let algorithm = policy.algorithm();
            let key = unique_key(algorithm);

            for offset in offsets {
                let now = base + offset;
                let remote = redis_store.eval(&key, &policy, now).await.unwrap();
                let local = local_store.apply(&key, &policy, now);

                if algorithm == Algorithm::FixedWindow {
                    assert_eq!(remote.admitted, local.admitted, "{algorithm} at +{offset}");
                    assert_eq!(remote.observed, local.observed, "{algorithm} at +{offset}");
                } else {
                    assert_eq!(remote, local, "{algorithm} at +{offset}");
                }
            }
        }
    });
}

#[test]
fn redis_keys_carry_an_expiry() {
    let Some(url) = redis_url() else {
        eprintln!("REDIS_URL not set, skipping");
        return;
    };

    block_on(async {
        let mut conn = connect(&url).await;
        let store = RedisQuotaStore::new(RedisQuotaStoreOptions {
            connection_manager: conn.clone(),
        });
        let now = crate::common::now_ms();

        for policy in policies() {
            let key = unique_key(policy.algorithm());
            store.eval(&key, &policy, now).await.unwrap();

            let ttl: i64 = conn.pttl(&key).await.unwrap();
            assert!(ttl > 0, "{} key has no expiry: {ttl}", policy.algorithm());
        }
    });
}

#[test]
fn sliding_log_counts_same_millisecond_requests() {
    let Some(url) = redis_url() else {
        eprintln!("REDIS_URL not set, skipping");
        return;
    };

    block_on(async {
        let mut conn = connect(&url).await;
        let store = RedisQuotaStore::new(RedisQuotaStoreOptions {
            connection_manager: conn.clone(),
        });
        let policy = QuotaPolicy::default_for(Algorithm::SlidingWindowLog);
        let key = unique_key(Algorithm::SlidingWindowLog);
        let now = crate::common::now_ms();

        for _ in 0..5 {
            assert!(store.eval(&key, &policy, now).await.unwrap().admitted);
        }

        let logged: u64 = conn.zcard(&key).await.unwrap();
        assert_eq!(logged, 5);
    });
}

#[test]
fn script_reply_is_parsed() {
    let reply = parse_script_reply(Algorithm::TokenBucket, (1, "2.5".to_string(), 1_000)).unwrap();

    assert!(reply.admitted);
    assert_eq!(reply.observed, 2.5);
    assert_eq!(reply.horizon_ms, 1_000);
}

#[test]
fn malformed_script_replies_are_store_errors() {
    let negative_horizon = parse_script_reply(Algorithm::FixedWindow, (1, "1".to_string(), -2));
    assert!(
        matches!(negative_horizon, Err(QuotaGateError::StoreUnavailable(msg)) if msg.contains("horizon `-2`"))
    );

    let bad_observed = parse_script_reply(Algorithm::FixedWindow, (1, "nan?".to_string(), 10));
    assert!(matches!(bad_observed, Err(QuotaGateError::StoreUnavailable(_))));
}
