//! In-process quota store.
//!
//! [`LocalQuotaStore`] keeps quota state inside the current process using
//! [`DashMap`](dashmap::DashMap). Each evaluation holds the shard lock for its
//! key for the whole read-compute-persist step, so a key's transitions never
//! interleave while other keys proceed in parallel.
//!
//! # Key Characteristics
//!
//! - **Atomic per key:** same guarantee as a Lua script in Redis
//! - **Zero external dependencies:** no network or database required
//! - **Process-scoped:** state is not shared across processes
//! - **Lazy expiry:** expired entries are ignored on access and reclaimed by
//!   [`LocalQuotaStore::purge_expired`] or the background cleanup loop
//!
//! # When to Use
//!
//! - Single-process services
//! - Tests that need a deterministic store (every call takes an explicit
//!   `now_ms`)
//!
//! Use [`RedisQuotaStore`](crate::redis::RedisQuotaStore) when several
//! processes must share one quota.
//!
//! # Examples
//!
//! ```no_run
//! use quotagate::{
//!     AdmissionController, AdmissionControllerOptions, ClientKey, QuotaPolicy,
//!     local::LocalQuotaStore, Algorithm,
//! };
//!
//! # async fn run() -> Result<(), quotagate::QuotaGateError> {
//! let controller = AdmissionController::new(
//!     LocalQuotaStore::new(),
//!     AdmissionControllerOptions::default(),
//! );
//!
//! let client = ClientKey::try_from("203.0.113.7")?;
//! let policy = QuotaPolicy::default_for(Algorithm::TokenBucket);
//!
//! let decision = controller.decide(&client, &policy, 1_700_000_000_000).await?;
//! assert!(decision.allowed);
//! # Ok(())
//! # }
//! ```

mod local_quota_store;
pub use local_quota_store::*;
