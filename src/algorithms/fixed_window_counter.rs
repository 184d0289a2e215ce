use crate::{
    Decision, RequestLimit, WindowSizeMs,
    algorithms::{ScriptReply, Transition},
    common::ceil_secs_from_ms,
};

/// Counter reset every `window`, admitting at most `limit` requests per window.
///
/// # Algorithm
///
/// 1. Increment the client's counter; the first increment opens a window
///    that expires after `window`
/// 2. Deny when the post-increment count exceeds `limit`, with
///    `retry_after` = remaining lifetime of the window
/// 3. Otherwise allow with `remaining = limit - count`
///
/// Denied requests still count, matching the `INCR` then compare shape of the
/// Redis script.
///
/// # Boundary bursts
///
/// Windows open on the first request and are not aligned to the clock, but a
/// client can still spend `limit` requests at the very end of one window and
/// `limit` more right after it expires. Up to `2 × limit` admissions in a
/// short span is an accepted property of this strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FixedWindowCounter {
    /// Requests admitted per window.
    pub limit: RequestLimit,
    /// Window length.
    pub window: WindowSizeMs,
}

/// Persisted fixed window state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedWindowState {
    /// Requests seen in the current window, denied ones included.
    pub count: u64,
    /// Unix ms at which the current window closes.
    pub window_expires_at_ms: u64,
}

impl FixedWindowCounter {
    /// Create a fixed window policy.
    pub fn new(limit: RequestLimit, window: WindowSizeMs) -> Self {
        Self { limit, window }
    }

    pub(crate) fn apply(
        &self,
        state: Option<FixedWindowState>,
        now_ms: u64,
    ) -> Transition<FixedWindowState> {
        let state = match state {
            Some(state) if now_ms < state.window_expires_at_ms => FixedWindowState {
                count: state.count.saturating_add(1),
                ..state
            },
            _ => FixedWindowState {
                count: 1,
                window_expires_at_ms: now_ms.saturating_add(*self.window),
            },
        };

        let ttl_ms = state.window_expires_at_ms.saturating_sub(now_ms);

        Transition {
            state,
            ttl_ms,
            reply: ScriptReply {
                admitted: state.count <= *self.limit,
                observed: state.count as f64,
                horizon_ms: ttl_ms,
            },
        }
    }

    pub(crate) fn decision(&self, reply: &ScriptReply, now_ms: u64) -> Decision {
        let limit = *self.limit;
        let ttl_ms = reply.horizon_ms;
        let reset_at_ms = now_ms.saturating_add(ttl_ms);

        if reply.admitted {
            let count = reply.observed as u64;
            Decision::allowed(limit, limit.saturating_sub(count), reset_at_ms)
        } else {
            Decision::denied(limit, reset_at_ms, ceil_secs_from_ms(ttl_ms))
        }
    }
}
