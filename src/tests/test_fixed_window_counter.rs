use std::time::Duration;

use crate::{
    RequestLimit, WindowSizeMs,
    algorithms::{FixedWindowCounter, FixedWindowState},
};

fn policy(limit: u64, window_ms: u64) -> FixedWindowCounter {
    FixedWindowCounter::new(
        RequestLimit::try_from(limit).unwrap(),
        WindowSizeMs::try_from(window_ms).unwrap(),
    )
}

fn hit(
    policy: &FixedWindowCounter,
    state: &mut Option<FixedWindowState>,
    now_ms: u64,
) -> crate::Decision {
    let transition = policy.apply(state.take(), now_ms);
    *state = Some(transition.state);
    policy.decision(&transition.reply, now_ms)
}

#[test]
fn admits_up_to_limit_then_denies() {
    let p = policy(3, 1000);
    let mut state = None;

    for expected_remaining in [2, 1, 0] {
        let d = hit(&p, &mut state, 0);
        assert!(d.allowed);
        assert_eq!(d.remaining, expected_remaining);
        assert_eq!(d.limit, 3);
        assert_eq!(d.reset_at_ms, 1000);
    }

    let d = hit(&p, &mut state, 500);
    assert!(!d.allowed);
    assert_eq!(d.remaining, 0);
    assert_eq!(d.retry_after, Some(Duration::from_secs(1)));
    assert_eq!(d.reset_at_ms, 1000);
}

#[test]
fn window_opens_on_first_request_and_resets_after_expiry() {
    let p = policy(2, 1000);
    let mut state = None;

    assert!(hit(&p, &mut state, 250).allowed);
    assert!(hit(&p, &mut state, 900).allowed);
    assert!(!hit(&p, &mut state, 1249).allowed);

    let d = hit(&p, &mut state, 1250);
    assert!(d.allowed);
    assert_eq!(d.remaining, 1);
    assert_eq!(d.reset_at_ms, 2250);
}

#[test]
fn denied_requests_still_count() {
    let p = policy(1, 1000);
    let mut state = None;

    hit(&p, &mut state, 0);
    hit(&p, &mut state, 1);
    hit(&p, &mut state, 2);

    assert_eq!(state.unwrap().count, 3);
}

#[test]
fn retry_after_rounds_remaining_window_up() {
    let p = policy(1, 10_000);
    let mut state = None;

    hit(&p, &mut state, 0);
    let d = hit(&p, &mut state, 1);

    // 9_999 ms left in the window
    assert_eq!(d.retry_after_secs(), 10);
}

#[test]
fn boundary_burst_admits_up_to_twice_the_limit() {
    let p = policy(5, 1000);
    let mut state = None;

    hit(&p, &mut state, 0);
    let mut admitted = 0;
    for now in [996, 997, 998, 999, 1000, 1000, 1000, 1000, 1000, 1000] {
        if hit(&p, &mut state, now).allowed {
            admitted += 1;
        }
    }

    // 4 more in the old window, 5 in the new one, all within 5 ms
    assert_eq!(admitted, 9);
}

#[test]
fn ttl_tracks_window_expiry() {
    let p = policy(5, 1000);

    let first = p.apply(None, 100);
    assert_eq!(first.ttl_ms, 1000);

    let second = p.apply(Some(first.state), 600);
    assert_eq!(second.ttl_ms, 500);
    assert_eq!(second.state.window_expires_at_ms, 1100);
}
