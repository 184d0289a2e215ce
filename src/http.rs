//! Fixed mapping from a [`Decision`] to transport-level fields.
//!
//! The crate ships no HTTP server; a request pipeline renders
//! [`DecisionResponse`] with whatever framework it uses.
//!
//! | Outcome | Status | Body |
//! |---|---|---|
//! | allowed | `200` | `{success, message, rateLimit: {limit, remaining, resetAt}}` |
//! | denied | `429` | `{error, retryAfter, message}` |
//! | store failure | `500` | `{error, message}` |
//!
//! Allowed and denied responses carry `X-RateLimit-Limit`,
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset` (unix seconds); denied
//! responses add `Retry-After` (seconds).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::{Decision, QuotaGateError};

/// `X-RateLimit-Limit` header name.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// `X-RateLimit-Remaining` header name.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// `X-RateLimit-Reset` header name.
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
/// `Retry-After` header name.
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Quota metadata included in an allowed response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBody {
    /// Configured limit.
    pub limit: u64,
    /// Requests still available.
    pub remaining: u64,
    /// ISO-8601 instant at which the quota is restored.
    pub reset_at: String,
}

/// Body of a `200` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedBody {
    /// Always `true`.
    pub success: bool,
    /// Human readable message.
    pub message: String,
    /// Quota metadata.
    pub rate_limit: RateLimitBody,
}

/// Body of a `429` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedBody {
    /// Short error label.
    pub error: String,
    /// Seconds to wait before retrying.
    pub retry_after: u64,
    /// Human readable message.
    pub message: String,
}

/// Body of a `500` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Short error label.
    pub error: String,
    /// Error detail.
    pub message: String,
}

/// Response body variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// `200` body.
    Allowed(AllowedBody),
    /// `429` body.
    Denied(DeniedBody),
    /// `500` body.
    Error(ErrorBody),
}

/// Status, headers and body for one decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, in emission order.
    pub headers: Vec<(&'static str, String)>,
    /// Response body.
    pub body: ResponseBody,
}

impl DecisionResponse {
    /// Map a decision to its response.
    pub fn from_decision(decision: &Decision) -> Self {
        let mut headers = vec![
            (HEADER_LIMIT, decision.limit.to_string()),
            (HEADER_REMAINING, decision.remaining.to_string()),
            (HEADER_RESET, decision.reset_at_secs().to_string()),
        ];

        if decision.allowed {
            return Self {
                status: 200,
                headers,
                body: ResponseBody::Allowed(AllowedBody {
                    success: true,
                    message: "Request successful!".to_string(),
                    rate_limit: RateLimitBody {
                        limit: decision.limit,
                        remaining: decision.remaining,
                        reset_at: iso_timestamp(decision.reset_at_ms),
                    },
                }),
            };
        }

        let retry_after = decision.retry_after_secs();
        headers.push((HEADER_RETRY_AFTER, retry_after.to_string()));

        Self {
            status: 429,
            headers,
            body: ResponseBody::Denied(DeniedBody {
                error: "Rate limit exceeded".to_string(),
                retry_after,
                message: format!("Too many requests. Please try again after {retry_after} seconds"),
            }),
        }
    }

    /// Map a failed admission check to a `500` response.
    ///
    /// Only for fail-closed pipelines; a fail-open pipeline forwards the
    /// request instead.
    pub fn from_error(err: &QuotaGateError) -> Self {
        Self {
            status: 500,
            headers: Vec::new(),
            body: ResponseBody::Error(ErrorBody {
                error: "Something went wrong!".to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Value of the header `name`, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body serialized as JSON.
    pub fn body_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.body)
    }
}

impl From<&Decision> for DecisionResponse {
    fn from(decision: &Decision) -> Self {
        Self::from_decision(decision)
    }
}

/// `2023-11-14T22:13:20.000Z` style timestamp for unix milliseconds.
fn iso_timestamp(ms: u64) -> String {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
