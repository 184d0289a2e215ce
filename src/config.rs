use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    Algorithm, Capacity, QuotaGateError, RatePerSecond, RequestLimit, WindowSizeMs,
    algorithms::{
        FixedWindowCounter, LeakingBucket, QuotaPolicy, SlidingWindowCounter, SlidingWindowLog,
        TokenBucket,
    },
};

fn default_limit() -> u64 {
    *RequestLimit::default()
}

fn default_window_ms() -> u64 {
    *WindowSizeMs::default()
}

fn default_capacity() -> u64 {
    *Capacity::default()
}

fn default_rate() -> f64 {
    *RatePerSecond::default()
}

/// Unvalidated policy description, as read from configuration.
///
/// Tagged by `algorithm`; omitted fields take the defaults (10 requests per
/// 60 s window, capacity 10 at 1 per second).
///
/// ```
/// use quotagate::{PolicyConfig, QuotaPolicy};
///
/// let config: PolicyConfig =
///     serde_json::from_str(r#"{"algorithm": "token-bucket", "capacity": 5}"#).unwrap();
/// let policy = QuotaPolicy::try_from(config).unwrap();
/// assert_eq!(policy.limit(), 5);
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum PolicyConfig {
    /// See [`FixedWindowCounter`].
    FixedWindow {
        /// Requests per window.
        #[serde(default = "default_limit")]
        limit: u64,
        /// Window length in milliseconds.
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
    /// See [`SlidingWindowLog`].
    SlidingWindowLog {
        /// Requests per trailing window.
        #[serde(default = "default_limit")]
        limit: u64,
        /// Window length in milliseconds.
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
    /// See [`SlidingWindowCounter`].
    SlidingWindowCounter {
        /// Requests per interpolated window.
        #[serde(default = "default_limit")]
        limit: u64,
        /// Window length in milliseconds.
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
    /// See [`TokenBucket`].
    TokenBucket {
        /// Bucket capacity.
        #[serde(default = "default_capacity")]
        capacity: u64,
        /// Tokens regenerated per second.
        #[serde(default = "default_rate")]
        refill_per_second: f64,
    },
    /// See [`LeakingBucket`].
    LeakingBucket {
        /// Queue length.
        #[serde(default = "default_capacity")]
        capacity: u64,
        /// Units drained per second.
        #[serde(default = "default_rate")]
        leak_per_second: f64,
    },
}

fn invalid(reason: &'static str) -> QuotaGateError {
    QuotaGateError::InvalidConfiguration(reason.to_string())
}

impl TryFrom<PolicyConfig> for QuotaPolicy {
    type Error = QuotaGateError;

    fn try_from(config: PolicyConfig) -> Result<Self, Self::Error> {
        let policy = match config {
            PolicyConfig::FixedWindow { limit, window_ms } => {
                QuotaPolicy::FixedWindow(FixedWindowCounter::new(
                    RequestLimit::try_from(limit).map_err(invalid)?,
                    WindowSizeMs::try_from(window_ms).map_err(invalid)?,
                ))
            }
            PolicyConfig::SlidingWindowLog { limit, window_ms } => {
                QuotaPolicy::SlidingWindowLog(SlidingWindowLog::new(
                    RequestLimit::try_from(limit).map_err(invalid)?,
                    WindowSizeMs::try_from(window_ms).map_err(invalid)?,
                ))
            }
            PolicyConfig::SlidingWindowCounter { limit, window_ms } => {
                QuotaPolicy::SlidingWindowCounter(SlidingWindowCounter::new(
                    RequestLimit::try_from(limit).map_err(invalid)?,
                    WindowSizeMs::try_from(window_ms).map_err(invalid)?,
                ))
            }
            PolicyConfig::TokenBucket {
                capacity,
                refill_per_second,
            } => QuotaPolicy::TokenBucket(TokenBucket::new(
                Capacity::try_from(capacity).map_err(invalid)?,
                RatePerSecond::try_from(refill_per_second).map_err(invalid)?,
            )),
            PolicyConfig::LeakingBucket {
                capacity,
                leak_per_second,
            } => QuotaPolicy::LeakingBucket(LeakingBucket::new(
                Capacity::try_from(capacity).map_err(invalid)?,
                RatePerSecond::try_from(leak_per_second).map_err(invalid)?,
            )),
        };

        Ok(policy)
    }
}

/// Route to policy mapping. Algorithm selection is a per-route configuration
/// choice, never a request parameter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteTable {
    routes: HashMap<String, QuotaPolicy>,
}

impl RouteTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The demo service layout: one route per algorithm with default
    /// parameters.
    ///
    /// | Route | Algorithm |
    /// |---|---|
    /// | `/fixed-window` | fixed window |
    /// | `/sliding-window` | sliding window log |
    /// | `/sliding-window-counter` | sliding window counter |
    /// | `/token-bucket` | token bucket |
    /// | `/leaking-bucket` | leaking bucket |
    pub fn with_default_routes() -> Self {
        [
            ("/fixed-window", Algorithm::FixedWindow),
            ("/sliding-window", Algorithm::SlidingWindowLog),
            ("/sliding-window-counter", Algorithm::SlidingWindowCounter),
            ("/token-bucket", Algorithm::TokenBucket),
            ("/leaking-bucket", Algorithm::LeakingBucket),
        ]
        .into_iter()
        .fold(Self::new(), |table, (route, algorithm)| {
            table.with_route(route, QuotaPolicy::default_for(algorithm))
        })
    }

    /// Add (or replace) a route, builder style.
    pub fn with_route(mut self, route: impl Into<String>, policy: QuotaPolicy) -> Self {
        self.insert(route, policy);
        self
    }

    /// Add (or replace) a route.
    pub fn insert(&mut self, route: impl Into<String>, policy: QuotaPolicy) {
        self.routes.insert(route.into(), policy);
    }

    /// Policy configured for `route`.
    pub fn policy(&self, route: &str) -> Option<&QuotaPolicy> {
        self.routes.get(route)
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` when no route is configured.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Validate a set of route configurations. The first invalid entry aborts
    /// the whole table.
    pub fn from_configs<I, R>(configs: I) -> Result<Self, QuotaGateError>
    where
        I: IntoIterator<Item = (R, PolicyConfig)>,
        R: Into<String>,
    {
        let mut table = Self::new();

        for (route, config) in configs {
            let route = route.into();
            let policy = QuotaPolicy::try_from(config).map_err(|err| match err {
                QuotaGateError::InvalidConfiguration(reason) => {
                    QuotaGateError::InvalidConfiguration(format!("route `{route}`: {reason}"))
                }
                other => other,
            })?;
            table.insert(route, policy);
        }

        Ok(table)
    }

    /// Parse a JSON object mapping routes to [`PolicyConfig`]s.
    ///
    /// ```
    /// use quotagate::RouteTable;
    ///
    /// let table = RouteTable::from_json(
    ///     r#"{ "/login": { "algorithm": "sliding-window-log", "limit": 5 } }"#,
    /// )
    /// .unwrap();
    /// assert_eq!(table.policy("/login").unwrap().limit(), 5);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, QuotaGateError> {
        let configs: HashMap<String, PolicyConfig> = serde_json::from_str(json)
            .map_err(|err| QuotaGateError::InvalidConfiguration(err.to_string()))?;

        Self::from_configs(configs)
    }
}
