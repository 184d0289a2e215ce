use std::{
    fmt,
    ops::Deref,
    str::FromStr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::Deserialize;

use crate::QuotaGateError;

/// Maximum number of requests admitted per window.
///
/// Must be greater than zero. Defaults to `10`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestLimit(u64);

impl Deref for RequestLimit {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for RequestLimit {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Request limit must be greater than 0")
        } else {
            Ok(Self(value))
        }
    }
}

impl Default for RequestLimit {
    fn default() -> Self {
        Self(10)
    }
}

/// Window length in milliseconds used by the window based algorithms.
///
/// Must be greater than zero. Defaults to one minute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowSizeMs(u64);

impl WindowSizeMs {
    /// Build a window from whole seconds.
    pub fn from_secs(secs: u64) -> Result<Self, &'static str> {
        Self::try_from(secs.saturating_mul(1000))
    }

    /// The window as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Deref for WindowSizeMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for WindowSizeMs {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Window size must be greater than 0")
        } else {
            Ok(Self(value))
        }
    }
}

impl Default for WindowSizeMs {
    fn default() -> Self {
        Self(60_000)
    }
}

/// Bucket capacity for the token and leaking buckets.
///
/// Must be greater than zero. Defaults to `10`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Capacity(u64);

impl Deref for Capacity {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for Capacity {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Capacity must be greater than 0")
        } else {
            Ok(Self(value))
        }
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self(10)
    }
}

/// Units per second a bucket refills (token bucket) or drains (leaking bucket).
///
/// Must be finite and greater than zero. Defaults to `1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatePerSecond(f64);

impl Deref for RatePerSecond {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for RatePerSecond {
    type Error = &'static str;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value <= 0f64 {
            Err("Rate must be a finite number greater than 0")
        } else {
            Ok(Self(value))
        }
    }
}

impl Default for RatePerSecond {
    fn default() -> Self {
        Self(1f64)
    }
}

/// The five admission strategies.
///
/// Names follow the route configuration vocabulary: `fixed-window`,
/// `sliding-window-log`, `sliding-window-counter`, `token-bucket` and
/// `leaking-bucket`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Counter reset every fixed interval.
    FixedWindow,
    /// Exact trailing window over a log of admitted timestamps.
    SlidingWindowLog,
    /// Interpolated estimate over the current and previous fixed windows.
    SlidingWindowCounter,
    /// Refilling bucket that allows bursts up to capacity.
    TokenBucket,
    /// Draining bucket modelling a bounded service queue.
    LeakingBucket,
}

impl Algorithm {
    /// Every algorithm, in declaration order.
    pub const ALL: [Algorithm; 5] = [
        Algorithm::FixedWindow,
        Algorithm::SlidingWindowLog,
        Algorithm::SlidingWindowCounter,
        Algorithm::TokenBucket,
        Algorithm::LeakingBucket,
    ];

    /// Configuration name of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => "fixed-window",
            Algorithm::SlidingWindowLog => "sliding-window-log",
            Algorithm::SlidingWindowCounter => "sliding-window-counter",
            Algorithm::TokenBucket => "token-bucket",
            Algorithm::LeakingBucket => "leaking-bucket",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = QuotaGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == s)
            .ok_or_else(|| QuotaGateError::InvalidConfiguration(format!("unknown algorithm `{s}`")))
    }
}

fn validate_key_segment(value: &str) -> Result<(), String> {
    if value.is_empty() {
        Err("key must not be empty".to_string())
    } else if value.len() > 255 {
        Err("key must not be longer than 255 bytes".to_string())
    } else if value.contains(':') {
        Err("key must not contain colons".to_string())
    } else {
        Ok(())
    }
}

/// A validated, opaque caller identity (for instance the remote address).
///
/// Constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
///
/// IPv6 addresses contain colons; callers should normalise them (for instance
/// by replacing `:` with `-`) before building a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(Arc<str>);

impl ClientKey {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ClientKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClientKey {
    type Error = QuotaGateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_key_segment(&value).map_err(QuotaGateError::InvalidClientKey)?;
        Ok(Self(Arc::from(value)))
    }
}

impl TryFrom<&str> for ClientKey {
    type Error = QuotaGateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Namespace prepended to every store key. Same constraints as [`ClientKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPrefix(Arc<str>);

impl KeyPrefix {
    /// The default `quotagate` prefix.
    pub fn default_prefix() -> Self {
        Self(Arc::from("quotagate"))
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::default_prefix()
    }
}

impl Deref for KeyPrefix {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = QuotaGateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_key_segment(&value).map_err(QuotaGateError::InvalidClientKey)?;
        Ok(Self(Arc::from(value)))
    }
}

/// Builds the store key for a `(client, algorithm)` pair:
/// `<prefix>:<client>:<algorithm>`.
#[derive(Clone, Debug)]
pub(crate) struct QuotaKeyGenerator {
    prefix: KeyPrefix,
}

impl QuotaKeyGenerator {
    pub(crate) fn new(prefix: KeyPrefix) -> Self {
        Self { prefix }
    }

    pub(crate) fn key(&self, client: &ClientKey, algorithm: Algorithm) -> String {
        format!("{}:{}:{}", &*self.prefix, client.as_str(), algorithm)
    }
}

/// Outcome of one admission check.
///
/// Produced fresh per request and never persisted. `remaining` never exceeds
/// `limit`, and a denied decision always carries a `retry_after` of at least
/// one second.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// The configured limit (requests per window or bucket capacity).
    pub limit: u64,
    /// Requests still available right now.
    pub remaining: u64,
    /// Unix time in milliseconds at which the quota is fully restored.
    pub reset_at_ms: u64,
    /// Minimum delay before retrying, whole seconds. `None` when allowed.
    pub retry_after: Option<Duration>,
}

impl Decision {
    pub(crate) fn allowed(limit: u64, remaining: u64, reset_at_ms: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: remaining.min(limit),
            reset_at_ms,
            retry_after: None,
        }
    }

    pub(crate) fn denied(limit: u64, reset_at_ms: u64, retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at_ms,
            retry_after: Some(Duration::from_secs(retry_after_secs.max(1))),
        }
    }

    /// `reset_at_ms` rounded up to unix seconds.
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }

    /// `retry_after` in whole seconds, `0` when allowed.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.map(|d| d.as_secs()).unwrap_or(0)
    }
}

/// Whole seconds needed to cover `ms` milliseconds.
pub(crate) fn ceil_secs_from_ms(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

/// Longest TTL handed to a store. Integral and exact as a Lua number.
pub(crate) const MAX_TTL_MS: u64 = 1 << 52;

/// Rounds up to an integer, clamping negatives and NaN to zero and
/// saturating at `u64::MAX`.
pub(crate) fn ceil_non_negative(value: f64) -> u64 {
    if value > 0f64 {
        // float to int casts saturate, so infinity lands on u64::MAX
        value.ceil() as u64
    } else {
        0
    }
}

/// Milliseconds needed to cover `secs` seconds.
pub(crate) fn ceil_ms(secs: f64) -> u64 {
    ceil_non_negative(secs * 1000f64)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Wall clock in unix milliseconds.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_ms)
        .unwrap_or(0)
}
