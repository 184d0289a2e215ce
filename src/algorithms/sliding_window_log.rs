use std::collections::VecDeque;

use crate::{
    Decision, RequestLimit, WindowSizeMs,
    algorithms::{ScriptReply, Transition},
    common::ceil_secs_from_ms,
};

/// Exact trailing window: at most `limit` admissions in any `window`.
///
/// # Algorithm
///
/// One atomic step:
///
/// 1. Drop timestamps older than `now - window` (inclusive)
/// 2. If the survivors already number `limit`, deny with
///    `retry_after = ceil((oldest + window - now) / 1000)` seconds
/// 3. Otherwise log `now` and allow with `remaining = limit - count`
///
/// Only admitted requests are logged, so the log never holds more than
/// `limit` entries. The state expires `window` after the last update.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlidingWindowLog {
    /// Admissions allowed in any trailing window.
    pub limit: RequestLimit,
    /// Trailing window length.
    pub window: WindowSizeMs,
}

/// Persisted sliding log state: admitted timestamps, oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlidingWindowLogState {
    /// Unix ms of each admitted request still inside the window.
    pub timestamps_ms: VecDeque<u64>,
}

impl SlidingWindowLog {
    /// Create a sliding log policy.
    pub fn new(limit: RequestLimit, window: WindowSizeMs) -> Self {
        Self { limit, window }
    }

    pub(crate) fn apply(
        &self,
        state: Option<SlidingWindowLogState>,
        now_ms: u64,
    ) -> Transition<SlidingWindowLogState> {
        let window_ms = *self.window;
        let mut state = state.unwrap_or_default();

        while let Some(&oldest) = state.timestamps_ms.front()
            && oldest.saturating_add(window_ms) <= now_ms
        {
            state.timestamps_ms.pop_front();
        }

        let admitted = (state.timestamps_ms.len() as u64) < *self.limit;

        if admitted {
            // a reading behind the newest entry still lands in order
            let index = state.timestamps_ms.partition_point(|&ts| ts <= now_ms);
            state.timestamps_ms.insert(index, now_ms);
        }

        let count = state.timestamps_ms.len() as u64;
        let oldest_ms = state.timestamps_ms.front().copied().unwrap_or(now_ms);

        Transition {
            state,
            ttl_ms: window_ms,
            reply: ScriptReply {
                admitted,
                observed: count as f64,
                horizon_ms: oldest_ms,
            },
        }
    }

    pub(crate) fn decision(&self, reply: &ScriptReply, now_ms: u64) -> Decision {
        let limit = *self.limit;
        let window_ms = *self.window;

        if reply.admitted {
            let count = reply.observed as u64;
            Decision::allowed(
                limit,
                limit.saturating_sub(count),
                now_ms.saturating_add(window_ms),
            )
        } else {
            let frees_at_ms = reply.horizon_ms.saturating_add(window_ms);
            let retry_after_secs = ceil_secs_from_ms(frees_at_ms.saturating_sub(now_ms));
            Decision::denied(limit, frees_at_ms, retry_after_secs)
        }
    }
}
