//! Redis-backed quota store.
//!
//! Every strategy runs as one Lua script (`EVALSHA`, falling back to `EVAL`),
//! so each read-compute-persist step is atomic within Redis. Scripts take the
//! caller's clock as an argument instead of `TIME` so a single process sees
//! the same timeline on both stores.
//!
//! # Requirements
//!
//! - **Redis:** >= 6.2.0
//! - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
//!
//! # Data model
//!
//! One key per `(client, algorithm)`: `<prefix>:<client>:<algorithm>`.
//!
//! | Strategy | Redis type | Expiry |
//! |---|---|---|
//! | fixed window | string counter | window |
//! | sliding log | sorted set scored by timestamp | window |
//! | sliding counter | hash `index` / `current` / `previous` | 2 × window |
//! | token bucket | hash `tokens` / `last_refill_ms` | full refill time |
//! | leaking bucket | hash `level` / `last_leak_ms` | full drain time |

mod redis_quota_store;
pub use redis_quota_store::*;

mod scripts;
