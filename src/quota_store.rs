use std::{future::Future, sync::Arc};

use crate::{QuotaGateError, algorithms::QuotaPolicy, algorithms::ScriptReply};

/// A shared counter store able to run one strategy transition atomically.
///
/// `eval` must behave as a single indivisible read-compute-persist step for
/// `key`: no other evaluation against the same key may interleave between the
/// read and the write. Different keys may proceed in parallel. The store also
/// owns expiry; every transition carries the lifetime of the state it writes.
///
/// Failures (unreachable store, script error, malformed reply) are reported as
/// [`QuotaGateError::StoreUnavailable`] and leave the state untouched.
pub trait QuotaStore: Send + Sync {
    /// Evaluate `policy` for `key` at `now_ms` (unix milliseconds).
    fn eval(
        &self,
        key: &str,
        policy: &QuotaPolicy,
        now_ms: u64,
    ) -> impl Future<Output = Result<ScriptReply, QuotaGateError>> + Send;
}

impl<S: QuotaStore> QuotaStore for Arc<S> {
    fn eval(
        &self,
        key: &str,
        policy: &QuotaPolicy,
        now_ms: u64,
    ) -> impl Future<Output = Result<ScriptReply, QuotaGateError>> + Send {
        (**self).eval(key, policy, now_ms)
    }
}
