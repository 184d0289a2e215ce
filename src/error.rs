/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum QuotaGateError {
    /// The store could not complete the atomic operation (unreachable, script
    /// failure, malformed reply or timeout).
    ///
    /// Never interpreted as allow or deny; the caller picks the fail-open or
    /// fail-closed policy.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A policy parameter was rejected at setup.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A client key or key prefix failed validation.
    #[error("invalid client key: {0}")]
    InvalidClientKey(String),

    /// No policy is configured for the requested route.
    #[error("unknown route: {0}")]
    UnknownRoute(String),
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
impl From<redis::RedisError> for QuotaGateError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
