
mod test_common_validation;
mod test_fixed_window_counter;
mod test_local_quota_store;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod test_redis_quota_store;
mod test_token_bucket;
