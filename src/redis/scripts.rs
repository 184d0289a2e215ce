//! Lua twins of the transitions in [`crate::algorithms`].
//!
//! Every script returns `{admitted, observed, horizon_ms}`; `observed` is sent
//! back as a string because Redis truncates Lua numbers to integers, and is
//! formatted with `%.17g` wherever it can be fractional.

pub(crate) const FIXED_WINDOW_SCRIPT: &str = r#"
    local key = KEYS[1]

    local window_ms = tonumber(ARGV[1])
    local limit = tonumber(ARGV[2])

    local count = redis.call("INCR", key)

    if count == 1 then
        redis.call("PEXPIRE", key, window_ms)
    end

    local ttl_ms = redis.call("PTTL", key)
    if ttl_ms < 0 then
        -- counter without expiry, restore the window
        redis.call("PEXPIRE", key, window_ms)
        ttl_ms = window_ms
    end

    local admitted = 0
    if count <= limit then
        admitted = 1
    end

    return {admitted, tostring(count), ttl_ms}
"#;

pub(crate) const SLIDING_WINDOW_LOG_SCRIPT: &str = r#"
    local key = KEYS[1]

    local now_ms = tonumber(ARGV[1])
    local window_ms = tonumber(ARGV[2])
    local limit = tonumber(ARGV[3])
    local member = ARGV[4]

    redis.call("ZREMRANGEBYSCORE", key, "-inf", now_ms - window_ms)

    local count = redis.call("ZCARD", key)
    local admitted = 0

    if count < limit then
        redis.call("ZADD", key, now_ms, member)
        count = count + 1
        admitted = 1
    end

    local oldest_ms = now_ms
    local oldest = redis.call("ZRANGE", key, 0, 0, "WITHSCORES")
    if #oldest > 0 then
        oldest_ms = tonumber(oldest[2])
    end

    redis.call("PEXPIRE", key, window_ms)

    return {admitted, tostring(count), oldest_ms}
"#;

pub(crate) const SLIDING_WINDOW_COUNTER_SCRIPT: &str = r#"
    local key = KEYS[1]

    local now_ms = tonumber(ARGV[1])
    local window_ms = tonumber(ARGV[2])
    local limit = tonumber(ARGV[3])

    local observed_index = math.floor(now_ms / window_ms)

    local state = redis.call("HMGET", key, "index", "current", "previous")
    local index = tonumber(state[1])
    local current = tonumber(state[2]) or 0
    local previous = tonumber(state[3]) or 0

    if index == nil then
        index = observed_index
        current = 0
        previous = 0
    elseif observed_index == index + 1 then
        previous = current
        current = 0
        index = observed_index
    elseif observed_index > index + 1 then
        previous = 0
        current = 0
        index = observed_index
    end

    local window_start_ms = index * window_ms
    local offset_ms = math.min(window_ms, math.max(0, now_ms - window_start_ms))
    local estimate = current + previous * (1 - offset_ms / window_ms)

    local admitted = 0
    if estimate < limit then
        current = current + 1
        admitted = 1
    end

    redis.call("HSET", key, "index", string.format("%d", index), "current", current, "previous", previous)
    redis.call("PEXPIRE", key, window_ms * 2)

    return {admitted, string.format("%.17g", estimate), window_start_ms + window_ms}
"#;

pub(crate) const TOKEN_BUCKET_SCRIPT: &str = r#"
    local key = KEYS[1]

    local now_ms = tonumber(ARGV[1])
    local capacity = tonumber(ARGV[2])
    local refill_rate = tonumber(ARGV[3])
    local ttl_ms = tonumber(ARGV[4])

    local state = redis.call("HMGET", key, "tokens", "last_refill_ms")
    local tokens = tonumber(state[1]) or capacity
    local last_refill_ms = tonumber(state[2]) or now_ms

    local elapsed_ms = math.max(0, now_ms - last_refill_ms)
    tokens = math.max(0, math.min(capacity, tokens + (elapsed_ms / 1000) * refill_rate))

    local admitted = 0
    if tokens >= 1 then
        tokens = tokens - 1
        admitted = 1
    end

    last_refill_ms = math.max(last_refill_ms, now_ms)

    redis.call("HSET", key, "tokens", string.format("%.17g", tokens), "last_refill_ms", string.format("%d", last_refill_ms))
    redis.call("PEXPIRE", key, ttl_ms)

    return {admitted, string.format("%.17g", tokens), last_refill_ms}
"#;

pub(crate) const LEAKING_BUCKET_SCRIPT: &str = r#"
    local key = KEYS[1]

    local now_ms = tonumber(ARGV[1])
    local capacity = tonumber(ARGV[2])
    local leak_rate = tonumber(ARGV[3])
    local max_ttl_ms = tonumber(ARGV[4])

    local state = redis.call("HMGET", key, "level", "last_leak_ms")
    local level = tonumber(state[1]) or 0
    local last_leak_ms = tonumber(state[2]) or now_ms

    local elapsed_ms = math.max(0, now_ms - last_leak_ms)
    level = math.max(0, level - (elapsed_ms / 1000) * leak_rate)

    local admitted = 0
    if level + 1 <= capacity then
        level = level + 1
        admitted = 1
    end

    last_leak_ms = math.max(last_leak_ms, now_ms)

    local ttl_ms = math.min(max_ttl_ms, math.max(1, math.ceil((level / leak_rate) * 1000)))

    redis.call("HSET", key, "level", string.format("%.17g", level), "last_leak_ms", string.format("%d", last_leak_ms))
    redis.call("PEXPIRE", key, ttl_ms)

    return {admitted, string.format("%.17g", level), last_leak_ms}
"#;
