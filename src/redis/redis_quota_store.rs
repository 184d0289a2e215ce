use redis::{Script, aio::ConnectionManager};

use crate::{
    Algorithm, QuotaGateError, QuotaStore,
    algorithms::{QuotaPolicy, ScriptReply},
    common::MAX_TTL_MS,
    redis::scripts::{
        FIXED_WINDOW_SCRIPT, LEAKING_BUCKET_SCRIPT, SLIDING_WINDOW_COUNTER_SCRIPT,
        SLIDING_WINDOW_LOG_SCRIPT, TOKEN_BUCKET_SCRIPT,
    },
};

/// Configuration for [`RedisQuotaStore`].
///
/// # Examples
///
/// ```ignore
/// use quotagate::redis::{RedisQuotaStore, RedisQuotaStoreOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let connection_manager = client.get_connection_manager().await?;
///
/// let store = RedisQuotaStore::new(RedisQuotaStoreOptions { connection_manager });
/// ```
#[derive(Clone)]
pub struct RedisQuotaStoreOptions {
    /// Redis connection manager from the `redis` crate.
    ///
    /// Use `ConnectionManager` for automatic reconnection; it is cloned per
    /// evaluation.
    pub connection_manager: ConnectionManager,
}

struct QuotaScripts {
    fixed_window: Script,
    sliding_window_log: Script,
    sliding_window_counter: Script,
    token_bucket: Script,
    leaking_bucket: Script,
}

impl QuotaScripts {
    fn new() -> Self {
        Self {
            fixed_window: Script::new(FIXED_WINDOW_SCRIPT),
            sliding_window_log: Script::new(SLIDING_WINDOW_LOG_SCRIPT),
            sliding_window_counter: Script::new(SLIDING_WINDOW_COUNTER_SCRIPT),
            token_bucket: Script::new(TOKEN_BUCKET_SCRIPT),
            leaking_bucket: Script::new(LEAKING_BUCKET_SCRIPT),
        }
    }
}

/// Quota store shared across processes through Redis.
///
/// # Consistency Semantics
///
/// - **Atomic per key:** each evaluation is one Lua script, so no two
///   evaluations for the same `(client, algorithm)` interleave
/// - **All-or-nothing:** a failed or timed-out call leaves either the old
///   state or the fully applied new one, never a partial write
/// - **Caller clock:** timestamps come from the caller, not from `TIME`, except
///   the fixed window whose expiry is tracked by Redis itself
pub struct RedisQuotaStore {
    connection_manager: ConnectionManager,
    scripts: QuotaScripts,
}

impl RedisQuotaStore {
    /// Create a store over an existing connection manager.
    pub fn new(options: RedisQuotaStoreOptions) -> Self {
        Self {
            connection_manager: options.connection_manager,
            scripts: QuotaScripts::new(),
        }
    }

    fn script_and_args(&self, policy: &QuotaPolicy, now_ms: u64) -> (&Script, Vec<String>) {
        match policy {
            QuotaPolicy::FixedWindow(p) => (
                &self.scripts.fixed_window,
                vec![p.window.to_string(), p.limit.to_string()],
            ),
            QuotaPolicy::SlidingWindowLog(p) => {
                let nonce: u64 = rand::random();

                (
                    &self.scripts.sliding_window_log,
                    vec![
                        now_ms.to_string(),
                        p.window.to_string(),
                        p.limit.to_string(),
                        format!("{now_ms}-{nonce:016x}"),
                    ],
                )
            }
            QuotaPolicy::SlidingWindowCounter(p) => (
                &self.scripts.sliding_window_counter,
                vec![now_ms.to_string(), p.window.to_string(), p.limit.to_string()],
            ),
            QuotaPolicy::TokenBucket(p) => (
                &self.scripts.token_bucket,
                vec![
                    now_ms.to_string(),
                    p.capacity.to_string(),
                    p.refill_rate.to_string(),
                    p.full_refill_ms().to_string(),
                ],
            ),
            QuotaPolicy::LeakingBucket(p) => (
                &self.scripts.leaking_bucket,
                vec![
                    now_ms.to_string(),
                    p.capacity.to_string(),
                    p.leak_rate.to_string(),
                    MAX_TTL_MS.to_string(),
                ],
            ),
        }
    }
}

impl QuotaStore for RedisQuotaStore {
    async fn eval(
        &self,
        key: &str,
        policy: &QuotaPolicy,
        now_ms: u64,
    ) -> Result<ScriptReply, QuotaGateError> {
        let (script, args) = self.script_and_args(policy, now_ms);

        let mut invocation = script.key(key);
        for arg in &args {
            invocation.arg(arg);
        }

        let mut connection_manager = self.connection_manager.clone();

        let reply: (i64, String, i64) = invocation.invoke_async(&mut connection_manager).await?;

        parse_script_reply(policy.algorithm(), reply)
    } // end method eval
}

/// Validate a raw `{admitted, observed, horizon_ms}` script reply.
pub(crate) fn parse_script_reply(
    algorithm: Algorithm,
    (admitted, observed, horizon_ms): (i64, String, i64),
) -> Result<ScriptReply, QuotaGateError> {
    let malformed = |what: &str| {
        QuotaGateError::StoreUnavailable(format!(
            "unexpected reply from {algorithm} script: {what}"
        ))
    };

    let observed: f64 = observed
        .parse()
        .map_err(|_| malformed(&format!("observed value `{observed}`")))?;
    let horizon_ms =
        u64::try_from(horizon_ms).map_err(|_| malformed(&format!("horizon `{horizon_ms}`")))?;

    Ok(ScriptReply {
        admitted: admitted == 1,
        observed,
        horizon_ms,
    })
}
