use crate::{
    Capacity, Decision, RatePerSecond,
    algorithms::{ScriptReply, Transition},
    common::{MAX_TTL_MS, ceil_ms, ceil_non_negative},
};

/// Refilling bucket: bursts up to `capacity`, then `refill_rate` per second.
///
/// # Algorithm
///
/// ```text
/// elapsed = max(0, now − last_refill)
/// tokens  = min(capacity, tokens + elapsed × refill_rate)
/// ```
///
/// - `tokens ≥ 1`: take one token, allow with `remaining = floor(tokens)`
/// - otherwise deny with `retry_after = ceil((1 − tokens) / refill_rate)`
///
/// The refilled state is persisted on both paths so refills compound across
/// misses. Tokens stay fractional between requests; only the comparison
/// against `1` and the `remaining` floor are integral. The state expires
/// after the time needed to refill from empty.
///
/// A new client starts with a full bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TokenBucket {
    /// Maximum tokens, also the reported limit.
    pub capacity: Capacity,
    /// Tokens regenerated per second.
    pub refill_rate: RatePerSecond,
}

/// Persisted token bucket state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenBucketState {
    /// Tokens available, in `[0, capacity]`.
    pub tokens: f64,
    /// Unix ms of the last refill computation. Never moves backwards.
    pub last_refill_ms: u64,
}

impl TokenBucket {
    /// Create a token bucket policy.
    pub fn new(capacity: Capacity, refill_rate: RatePerSecond) -> Self {
        Self {
            capacity,
            refill_rate,
        }
    }

    /// Milliseconds for an empty bucket to refill completely, bounded by the
    /// longest TTL a store accepts.
    pub fn full_refill_ms(&self) -> u64 {
        ceil_ms(*self.capacity as f64 / *self.refill_rate).clamp(1, MAX_TTL_MS)
    }

    pub(crate) fn apply(
        &self,
        state: Option<TokenBucketState>,
        now_ms: u64,
    ) -> Transition<TokenBucketState> {
        let capacity = *self.capacity as f64;
        let rate = *self.refill_rate;

        let TokenBucketState {
            tokens,
            last_refill_ms,
        } = state.unwrap_or(TokenBucketState {
            tokens: capacity,
            last_refill_ms: now_ms,
        });

        let elapsed_ms = now_ms.saturating_sub(last_refill_ms);
        let mut tokens = (tokens + elapsed_ms as f64 / 1000f64 * rate).clamp(0f64, capacity);

        let admitted = tokens >= 1f64;
        if admitted {
            tokens -= 1f64;
        }

        let state = TokenBucketState {
            tokens,
            last_refill_ms: last_refill_ms.max(now_ms),
        };

        Transition {
            state,
            ttl_ms: self.full_refill_ms(),
            reply: ScriptReply {
                admitted,
                observed: tokens,
                horizon_ms: state.last_refill_ms,
            },
        }
    }

    pub(crate) fn decision(&self, reply: &ScriptReply, now_ms: u64) -> Decision {
        let limit = *self.capacity;
        let rate = *self.refill_rate;
        let tokens = reply.observed.clamp(0f64, limit as f64);
        let full_at_ms = now_ms.saturating_add(ceil_ms((limit as f64 - tokens) / rate));

        if reply.admitted {
            Decision::allowed(limit, tokens.floor() as u64, full_at_ms)
        } else {
            Decision::denied(limit, full_at_ms, ceil_non_negative((1f64 - tokens) / rate))
        }
    }
}
