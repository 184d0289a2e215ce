use crate::{
    Capacity, Decision, QuotaPolicy, RatePerSecond,
    algorithms::{TokenBucket, TokenBucketState},
    common::MAX_TTL_MS,
    local::LocalQuotaStore,
};

fn policy(capacity: u64, rate: f64) -> TokenBucket {
    TokenBucket::new(
        Capacity::try_from(capacity).unwrap(),
        RatePerSecond::try_from(rate).unwrap(),
    )
}

fn hit(policy: &TokenBucket, state: &mut Option<TokenBucketState>, now_ms: u64) -> Decision {
    let transition = policy.apply(state.take(), now_ms);
    *state = Some(transition.state);
    policy.decision(&transition.reply, now_ms)
}

#[test]
fn new_client_starts_with_a_full_bucket() {
    let p = policy(5, 1.0);
    let mut state = None;

    let d = hit(&p, &mut state, 0);
    assert!(d.allowed);
    assert_eq!(d.remaining, 4);
    assert_eq!(d.limit, 5);
    assert_eq!(d.reset_at_ms, 1000);
}

#[test]
fn burst_up_to_capacity_then_denies() {
    let p = policy(5, 1.0);
    let mut state = None;

    for _ in 0..5 {
        assert!(hit(&p, &mut state, 0).allowed);
    }

    let d = hit(&p, &mut state, 0);
    assert!(!d.allowed);
    assert_eq!(d.retry_after_secs(), 1);
    assert_eq!(d.reset_at_ms, 5000);
}

#[test]
fn refills_at_the_configured_rate() {
    let p = policy(5, 2.0);
    let mut state = None;

    for _ in 0..5 {
        hit(&p, &mut state, 0);
    }
    assert!(!p.apply(state, 400).reply.admitted);

    // 0.5 s at 2/s is exactly one token
    assert!(hit(&p, &mut state, 500).allowed);
    assert!(!hit(&p, &mut state, 500).allowed);
}

#[test]
fn refill_is_capped_at_capacity() {
    let p = policy(3, 1.0);
    let mut state = None;

    hit(&p, &mut state, 0);

    let mut admitted = 0;
    for _ in 0..10 {
        if hit(&p, &mut state, 100_000).allowed {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 3);
}

#[test]
fn denied_requests_still_persist_the_refill() {
    let p = policy(1, 1.0);
    let mut state = None;

    hit(&p, &mut state, 0);
    hit(&p, &mut state, 600);

    let s = state.unwrap();
    assert_eq!(s.last_refill_ms, 600);
    assert!((s.tokens - 0.6).abs() < 1e-9);
}

#[test]
fn clock_moving_backwards_adds_no_tokens() {
    let p = policy(5, 1.0);
    let state = TokenBucketState {
        tokens: 0.5,
        last_refill_ms: 10_000,
    };

    let transition = p.apply(Some(state), 4_000);

    assert!(!transition.reply.admitted);
    assert_eq!(transition.state.tokens, 0.5);
    assert_eq!(transition.state.last_refill_ms, 10_000);
}

#[test]
fn retry_after_covers_the_missing_fraction() {
    let p = policy(10, 0.25);
    let state = TokenBucketState {
        tokens: 0.5,
        last_refill_ms: 0,
    };

    let transition = p.apply(Some(state), 0);
    let d = p.decision(&transition.reply, 0);

    // (1 - 0.5) / 0.25 = 2 s
    assert_eq!(d.retry_after_secs(), 2);
}

#[test]
fn state_expires_after_a_full_refill() {
    assert_eq!(policy(10, 1.0).full_refill_ms(), 10_000);
    assert_eq!(policy(1, 3.0).full_refill_ms(), 334);
    assert_eq!(policy(10, 1.0).apply(None, 0).ttl_ms, 10_000);
}

#[test]
fn tiny_refill_rate_keeps_the_bucket_instead_of_expiring_it() {
    let p = policy(10, 1e-308);
    assert_eq!(p.full_refill_ms(), MAX_TTL_MS);

    let store = LocalQuotaStore::new();
    let policy = QuotaPolicy::TokenBucket(p);

    let admitted = (0..50u64)
        .filter(|i| store.apply("k", &policy, i * 2).admitted)
        .count();

    assert_eq!(admitted, 10);
}
