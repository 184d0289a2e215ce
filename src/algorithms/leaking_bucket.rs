use crate::{
    Capacity, Decision, RatePerSecond,
    algorithms::{ScriptReply, Transition},
    common::{MAX_TTL_MS, ceil_ms, ceil_non_negative},
};

/// Draining bucket modelling a bounded FIFO service queue.
///
/// # Algorithm
///
/// ```text
/// elapsed = max(0, now − last_leak)
/// level   = max(0, level − elapsed × leak_rate)
/// ```
///
/// - one more unit fits (`level + 1 ≤ capacity`): `level += 1`, allow with
///   `remaining = floor(capacity − level)`
/// - otherwise persist the leaked level and deny with
///   `retry_after = ceil((level − capacity + 1) / leak_rate)`
///
/// Unlike [`TokenBucket`](crate::algorithms::TokenBucket) a full bucket frees
/// exactly one slot every `1 / leak_rate` seconds; there is no burst
/// allowance beyond the queue length. The state expires once the bucket
/// would have drained to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LeakingBucket {
    /// Queue length, also the reported limit.
    pub capacity: Capacity,
    /// Units drained per second.
    pub leak_rate: RatePerSecond,
}

/// Persisted leaking bucket state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeakingBucketState {
    /// Queued request equivalents, in `[0, capacity]`.
    pub level: f64,
    /// Unix ms of the last leak computation. Never moves backwards.
    pub last_leak_ms: u64,
}

impl LeakingBucket {
    /// Create a leaking bucket policy.
    pub fn new(capacity: Capacity, leak_rate: RatePerSecond) -> Self {
        Self {
            capacity,
            leak_rate,
        }
    }

    pub(crate) fn apply(
        &self,
        state: Option<LeakingBucketState>,
        now_ms: u64,
    ) -> Transition<LeakingBucketState> {
        let capacity = *self.capacity as f64;
        let rate = *self.leak_rate;

        let LeakingBucketState {
            level,
            last_leak_ms,
        } = state.unwrap_or(LeakingBucketState {
            level: 0f64,
            last_leak_ms: now_ms,
        });

        let elapsed_ms = now_ms.saturating_sub(last_leak_ms);
        let mut level = (level - elapsed_ms as f64 / 1000f64 * rate).max(0f64);

        let admitted = level + 1f64 <= capacity;
        if admitted {
            level += 1f64;
        }

        let state = LeakingBucketState {
            level,
            last_leak_ms: last_leak_ms.max(now_ms),
        };

        Transition {
            state,
            ttl_ms: ceil_ms(level / rate).clamp(1, MAX_TTL_MS),
            reply: ScriptReply {
                admitted,
                observed: level,
                horizon_ms: state.last_leak_ms,
            },
        }
    }

    pub(crate) fn decision(&self, reply: &ScriptReply, now_ms: u64) -> Decision {
        let limit = *self.capacity;
        let capacity = limit as f64;
        let rate = *self.leak_rate;
        let level = reply.observed.clamp(0f64, capacity);
        let drained_at_ms = now_ms.saturating_add(ceil_ms(level / rate));

        if reply.admitted {
            Decision::allowed(limit, (capacity - level).floor() as u64, drained_at_ms)
        } else {
            let retry_after_secs = ceil_non_negative((level - capacity + 1f64) / rate);
            Decision::denied(limit, drained_at_ms, retry_after_secs)
        }
    }
}
