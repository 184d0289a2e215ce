use crate::{
    Decision, RequestLimit, WindowSizeMs,
    algorithms::{ScriptReply, Transition},
    common::{ceil_non_negative, ceil_secs_from_ms},
};

/// Approximates [`SlidingWindowLog`](crate::algorithms::SlidingWindowLog) with
/// two counters per client.
///
/// # Algorithm
///
/// Windows are indexed by `floor(now / window)`. With `offset` the position
/// of `now` inside the current window:
///
/// ```text
/// estimate = current + previous × (1 − offset / window)
/// ```
///
/// - `estimate ≥ limit`: deny, `retry_after = window` (not refined further)
/// - otherwise increment `current` and allow with
///   `remaining = limit − ceil(estimate + 1)`
///
/// The state expires after `2 × window` so the previous window's count is
/// still readable during the next window.
///
/// # Clock skew
///
/// Window indices never move backwards: a reading that maps to an older
/// window is evaluated against the stored, newer window with a zero offset.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlidingWindowCounter {
    /// Admissions allowed per (interpolated) window.
    pub limit: RequestLimit,
    /// Window length.
    pub window: WindowSizeMs,
}

/// Persisted sliding counter state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlidingWindowCounterState {
    /// `floor(now / window)` of the newest window seen.
    pub window_index: u64,
    /// Admissions in `window_index`.
    pub current_count: u64,
    /// Admissions in `window_index - 1`.
    pub previous_count: u64,
}

impl SlidingWindowCounter {
    /// Create a sliding counter policy.
    pub fn new(limit: RequestLimit, window: WindowSizeMs) -> Self {
        Self { limit, window }
    }

    pub(crate) fn apply(
        &self,
        state: Option<SlidingWindowCounterState>,
        now_ms: u64,
    ) -> Transition<SlidingWindowCounterState> {
        let window_ms = *self.window;
        let observed_index = now_ms / window_ms;

        let mut state = match state {
            None => SlidingWindowCounterState {
                window_index: observed_index,
                ..Default::default()
            },
            Some(state) if observed_index <= state.window_index => state,
            Some(state) if observed_index == state.window_index + 1 => SlidingWindowCounterState {
                window_index: observed_index,
                current_count: 0,
                previous_count: state.current_count,
            },
            Some(_) => SlidingWindowCounterState {
                window_index: observed_index,
                ..Default::default()
            },
        };

        let window_start_ms = state.window_index.saturating_mul(window_ms);
        let offset_ms = now_ms.saturating_sub(window_start_ms).min(window_ms);
        let weight = 1f64 - offset_ms as f64 / window_ms as f64;
        let estimate = state.current_count as f64 + state.previous_count as f64 * weight;

        let admitted = estimate < *self.limit as f64;
        if admitted {
            state.current_count += 1;
        }

        Transition {
            state,
            ttl_ms: window_ms.saturating_mul(2),
            reply: ScriptReply {
                admitted,
                observed: estimate,
                horizon_ms: window_start_ms.saturating_add(window_ms),
            },
        }
    }

    pub(crate) fn decision(&self, reply: &ScriptReply, _now_ms: u64) -> Decision {
        let limit = *self.limit;
        let window_ends_at_ms = reply.horizon_ms;

        if reply.admitted {
            let used = ceil_non_negative(reply.observed + 1f64);
            Decision::allowed(limit, limit.saturating_sub(used), window_ends_at_ms)
        } else {
            Decision::denied(limit, window_ends_at_ms, ceil_secs_from_ms(*self.window))
        }
    }
}
