//! The five admission strategies as pure state transitions.
//!
//! Every strategy is split in two halves:
//!
//! - a transition `(state, now) -> (new state, ttl, reply)` that a store runs
//!   atomically per key ([`LocalQuotaStore`](crate::local::LocalQuotaStore)
//!   runs the Rust version under the key's shard lock,
//!   [`RedisQuotaStore`](crate::redis::RedisQuotaStore) runs the equivalent
//!   Lua script);
//! - a mapping `reply -> Decision` shared by every store.
//!
//! # Strategies
//!
//! | Strategy | State per client | Burst behaviour |
//! |---|---|---|
//! | [`FixedWindowCounter`] | one counter | up to `2 × limit` across a boundary |
//! | [`SlidingWindowLog`] | one timestamp per admitted request | exact |
//! | [`SlidingWindowCounter`] | two counters | approximate |
//! | [`TokenBucket`] | tokens + last refill | up to capacity at once |
//! | [`LeakingBucket`] | level + last leak | queue of `capacity` |

mod fixed_window_counter;
pub use fixed_window_counter::*;

mod sliding_window_log;
pub use sliding_window_log::*;

mod sliding_window_counter;
pub use sliding_window_counter::*;

mod token_bucket;
pub use token_bucket::*;

mod leaking_bucket;
pub use leaking_bucket::*;

use crate::{Algorithm, Decision};

/// Raw result of one atomic evaluation, identical for every store.
///
/// Field meaning depends on the strategy:
///
/// | Strategy | `observed` | `horizon_ms` |
/// |---|---|---|
/// | fixed window | count after increment | remaining ttl of the window |
/// | sliding log | entries in the window | oldest logged timestamp |
/// | sliding counter | estimate before this request | end of the current window |
/// | token bucket | tokens left | last refill timestamp |
/// | leaking bucket | level after this request | last leak timestamp |
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScriptReply {
    /// Whether the transition admitted the request.
    pub admitted: bool,
    /// Strategy specific quantity, see the table above.
    pub observed: f64,
    /// Strategy specific timestamp or duration in milliseconds.
    pub horizon_ms: u64,
}

/// A computed transition: the state to persist, how long to keep it and the
/// reply to hand back.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Transition<S> {
    pub state: S,
    pub ttl_ms: u64,
    pub reply: ScriptReply,
}

impl<S> Transition<S> {
    fn map<T>(self, f: impl FnOnce(S) -> T) -> Transition<T> {
        Transition {
            state: f(self.state),
            ttl_ms: self.ttl_ms,
            reply: self.reply,
        }
    }
}

/// Persisted per-client state, one variant per strategy.
#[derive(Clone, Debug, PartialEq)]
pub enum QuotaState {
    /// See [`FixedWindowState`].
    FixedWindow(FixedWindowState),
    /// See [`SlidingWindowLogState`].
    SlidingWindowLog(SlidingWindowLogState),
    /// See [`SlidingWindowCounterState`].
    SlidingWindowCounter(SlidingWindowCounterState),
    /// See [`TokenBucketState`].
    TokenBucket(TokenBucketState),
    /// See [`LeakingBucketState`].
    LeakingBucket(LeakingBucketState),
}

/// A configured strategy. Selected per route, never per request.
#[derive(Clone, Debug, PartialEq)]
pub enum QuotaPolicy {
    /// See [`FixedWindowCounter`].
    FixedWindow(FixedWindowCounter),
    /// See [`SlidingWindowLog`].
    SlidingWindowLog(SlidingWindowLog),
    /// See [`SlidingWindowCounter`].
    SlidingWindowCounter(SlidingWindowCounter),
    /// See [`TokenBucket`].
    TokenBucket(TokenBucket),
    /// See [`LeakingBucket`].
    LeakingBucket(LeakingBucket),
}

impl QuotaPolicy {
    /// The policy with the default parameters for `algorithm`
    /// (10 requests per minute, or capacity 10 at 1 unit per second).
    pub fn default_for(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::FixedWindow => QuotaPolicy::FixedWindow(FixedWindowCounter::default()),
            Algorithm::SlidingWindowLog => QuotaPolicy::SlidingWindowLog(SlidingWindowLog::default()),
            Algorithm::SlidingWindowCounter => {
                QuotaPolicy::SlidingWindowCounter(SlidingWindowCounter::default())
            }
            Algorithm::TokenBucket => QuotaPolicy::TokenBucket(TokenBucket::default()),
            Algorithm::LeakingBucket => QuotaPolicy::LeakingBucket(LeakingBucket::default()),
        }
    }

    /// Which strategy this policy runs.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            QuotaPolicy::FixedWindow(_) => Algorithm::FixedWindow,
            QuotaPolicy::SlidingWindowLog(_) => Algorithm::SlidingWindowLog,
            QuotaPolicy::SlidingWindowCounter(_) => Algorithm::SlidingWindowCounter,
            QuotaPolicy::TokenBucket(_) => Algorithm::TokenBucket,
            QuotaPolicy::LeakingBucket(_) => Algorithm::LeakingBucket,
        }
    }

    /// The limit reported in every decision.
    pub fn limit(&self) -> u64 {
        match self {
            QuotaPolicy::FixedWindow(p) => *p.limit,
            QuotaPolicy::SlidingWindowLog(p) => *p.limit,
            QuotaPolicy::SlidingWindowCounter(p) => *p.limit,
            QuotaPolicy::TokenBucket(p) => *p.capacity,
            QuotaPolicy::LeakingBucket(p) => *p.capacity,
        }
    }

    /// Turn a store reply into a [`Decision`].
    pub fn decision(&self, reply: &ScriptReply, now_ms: u64) -> Decision {
        match self {
            QuotaPolicy::FixedWindow(p) => p.decision(reply, now_ms),
            QuotaPolicy::SlidingWindowLog(p) => p.decision(reply, now_ms),
            QuotaPolicy::SlidingWindowCounter(p) => p.decision(reply, now_ms),
            QuotaPolicy::TokenBucket(p) => p.decision(reply, now_ms),
            QuotaPolicy::LeakingBucket(p) => p.decision(reply, now_ms),
        }
    }

    /// Run the transition for this policy.
    ///
    /// A `state` of another strategy is treated as absent; store keys embed
    /// the algorithm name so this only happens on a misconfigured store.
    pub(crate) fn apply(&self, state: Option<QuotaState>, now_ms: u64) -> Transition<QuotaState> {
        match (self, state) {
            (QuotaPolicy::FixedWindow(p), state) => {
                let state = match state {
                    Some(QuotaState::FixedWindow(s)) => Some(s),
                    _ => None,
                };
                p.apply(state, now_ms).map(QuotaState::FixedWindow)
            }
            (QuotaPolicy::SlidingWindowLog(p), state) => {
                let state = match state {
                    Some(QuotaState::SlidingWindowLog(s)) => Some(s),
                    _ => None,
                };
                p.apply(state, now_ms).map(QuotaState::SlidingWindowLog)
            }
            (QuotaPolicy::SlidingWindowCounter(p), state) => {
                let state = match state {
                    Some(QuotaState::SlidingWindowCounter(s)) => Some(s),
                    _ => None,
                };
                p.apply(state, now_ms).map(QuotaState::SlidingWindowCounter)
            }
            (QuotaPolicy::TokenBucket(p), state) => {
                let state = match state {
                    Some(QuotaState::TokenBucket(s)) => Some(s),
                    _ => None,
                };
                p.apply(state, now_ms).map(QuotaState::TokenBucket)
            }
            (QuotaPolicy::LeakingBucket(p), state) => {
                let state = match state {
                    Some(QuotaState::LeakingBucket(s)) => Some(s),
                    _ => None,
                };
                p.apply(state, now_ms).map(QuotaState::LeakingBucket)
            }
        }
    }
}
