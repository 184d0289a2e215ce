use std::{str::FromStr, time::Duration};

use crate::{
    Algorithm, Capacity, ClientKey, Decision, KeyPrefix, QuotaGateError, RatePerSecond,
    RequestLimit, WindowSizeMs,
    common::{QuotaKeyGenerator, ceil_ms, ceil_non_negative, ceil_secs_from_ms, duration_ms},
};

#[test]
fn request_limit_try_from_validates_positive() {
    let l = RequestLimit::try_from(5u64).unwrap();
    assert_eq!(*l, 5);

    assert_eq!(
        RequestLimit::try_from(0u64).unwrap_err(),
        "Request limit must be greater than 0"
    );
    assert_eq!(*RequestLimit::default(), 10);
}

#[test]
fn window_size_ms_validates_and_converts() {
    let w = WindowSizeMs::try_from(1500u64).unwrap();
    assert_eq!(*w, 1500);
    assert_eq!(w.as_duration(), Duration::from_millis(1500));

    assert_eq!(*WindowSizeMs::from_secs(60).unwrap(), 60_000);
    assert_eq!(
        WindowSizeMs::try_from(0u64).unwrap_err(),
        "Window size must be greater than 0"
    );
    assert_eq!(*WindowSizeMs::default(), 60_000);
}

#[test]
fn capacity_try_from_validates_positive() {
    assert_eq!(*Capacity::try_from(3u64).unwrap(), 3);
    assert_eq!(
        Capacity::try_from(0u64).unwrap_err(),
        "Capacity must be greater than 0"
    );
}

#[test]
fn rate_per_second_rejects_zero_negative_and_non_finite() {
    assert_eq!(*RatePerSecond::try_from(0.5).unwrap(), 0.5);
    assert_eq!(*RatePerSecond::default(), 1f64);

    for bad in [0f64, -1f64, f64::NAN, f64::INFINITY] {
        assert_eq!(
            RatePerSecond::try_from(bad).unwrap_err(),
            "Rate must be a finite number greater than 0"
        );
    }
}

#[test]
fn algorithm_names_round_trip_through_from_str() {
    for algorithm in Algorithm::ALL {
        assert_eq!(Algorithm::from_str(algorithm.as_str()).unwrap(), algorithm);
        assert_eq!(algorithm.to_string(), algorithm.as_str());
    }

    assert!(matches!(
        Algorithm::from_str("gcra"),
        Err(QuotaGateError::InvalidConfiguration(_))
    ));
}

#[test]
fn client_key_rejects_empty_long_and_colon() {
    assert_eq!(ClientKey::try_from("127.0.0.1").unwrap().as_str(), "127.0.0.1");

    for bad in [String::new(), "a".repeat(256), "::1".to_string()] {
        assert!(matches!(
            ClientKey::try_from(bad),
            Err(QuotaGateError::InvalidClientKey(_))
        ));
    }

    assert!(ClientKey::try_from("a".repeat(255)).is_ok());
}

#[test]
fn key_prefix_defaults_to_quotagate() {
    assert_eq!(&*KeyPrefix::default(), "quotagate");
    assert!(KeyPrefix::try_from("a:b".to_string()).is_err());
}

#[test]
fn key_generator_namespaces_by_client_and_algorithm() {
    let kg = QuotaKeyGenerator::new(KeyPrefix::try_from("svc".to_string()).unwrap());
    let client = ClientKey::try_from("10.0.0.1").unwrap();

    assert_eq!(
        kg.key(&client, Algorithm::TokenBucket),
        "svc:10.0.0.1:token-bucket"
    );
    assert_ne!(
        kg.key(&client, Algorithm::FixedWindow),
        kg.key(&client, Algorithm::SlidingWindowLog)
    );
}

#[test]
fn decision_constructors_enforce_bounds() {
    let allowed = Decision::allowed(5, 9, 1_000);
    assert!(allowed.allowed);
    assert_eq!(allowed.remaining, 5);
    assert_eq!(allowed.retry_after, None);
    assert_eq!(allowed.retry_after_secs(), 0);

    let denied = Decision::denied(5, 1_001, 0);
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after, Some(Duration::from_secs(1)));
    assert_eq!(denied.reset_at_secs(), 2);
}

#[test]
fn ceil_helpers_round_up_and_clamp() {
    assert_eq!(ceil_secs_from_ms(0), 0);
    assert_eq!(ceil_secs_from_ms(1), 1);
    assert_eq!(ceil_secs_from_ms(1000), 1);
    assert_eq!(ceil_secs_from_ms(1001), 2);

    assert_eq!(ceil_non_negative(0.2), 1);
    assert_eq!(ceil_non_negative(-3.0), 0);
    assert_eq!(ceil_non_negative(f64::NAN), 0);

    assert_eq!(ceil_ms(0.0015), 2);
}

#[test]
fn ceil_helpers_saturate_on_overflow() {
    assert_eq!(ceil_non_negative(f64::INFINITY), u64::MAX);
    assert_eq!(ceil_non_negative(1e300), u64::MAX);
    assert_eq!(ceil_ms(10.0 / 1e-308), u64::MAX);
}

#[test]
fn duration_ms_saturates() {
    assert_eq!(duration_ms(Duration::from_millis(1_500)), 1_500);
    assert_eq!(duration_ms(Duration::MAX), u64::MAX);
}
