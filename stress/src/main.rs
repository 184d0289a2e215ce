use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing_subscriber::EnvFilter;

use quotagate::{
    AdmissionController, AdmissionControllerOptions, Algorithm, ClientKey, KeyPrefix,
    PolicyConfig, QuotaPolicy, QuotaStore, local::LocalQuotaStore,
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Store {
    Local,
    Redis,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum AlgorithmArg {
    FixedWindow,
    SlidingWindowLog,
    SlidingWindowCounter,
    TokenBucket,
    LeakingBucket,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(value: AlgorithmArg) -> Self {
        match value {
            AlgorithmArg::FixedWindow => Algorithm::FixedWindow,
            AlgorithmArg::SlidingWindowLog => Algorithm::SlidingWindowLog,
            AlgorithmArg::SlidingWindowCounter => Algorithm::SlidingWindowCounter,
            AlgorithmArg::TokenBucket => Algorithm::TokenBucket,
            AlgorithmArg::LeakingBucket => Algorithm::LeakingBucket,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyDist {
    Hot,
    Uniform,
    Skewed,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    Max,
    TargetQps,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "quotagate-stress",
    about = "Load test / benchmark harness for quotagate"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Store::Local)]
    store: Store,

    #[arg(long, value_enum, default_value_t = AlgorithmArg::TokenBucket)]
    algorithm: AlgorithmArg,

    #[arg(long, value_enum, default_value_t = KeyDist::Hot)]
    key_dist: KeyDist,

    #[arg(long, value_enum, default_value_t = Mode::Max)]
    mode: Mode,

    /// Concurrent client tasks.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    #[arg(long, default_value_t = 10)]
    duration_s: u64,

    /// Limit (window algorithms) or capacity (bucket algorithms).
    #[arg(long, default_value_t = 100)]
    limit: u64,

    #[arg(long, default_value_t = 1_000)]
    window_ms: u64,

    /// Refill or leak rate per second for the bucket algorithms.
    #[arg(long, default_value_t = 100.0)]
    rate_per_s: f64,

    #[arg(long, default_value_t = 10_000)]
    key_space: usize,

    #[arg(long, default_value_t = 0.8)]
    hot_fraction: f64,

    #[arg(long, default_value_t = 100)]
    sample_every: u64,

    #[arg(long)]
    target_qps: Option<u64>,

    #[arg(long, default_value_t = 500)]
    store_timeout_ms: u64,

    #[arg(long, default_value = "redis://127.0.0.1:6379/")]
    redis_url: String,

    #[arg(long, default_value = "stress")]
    prefix: String,
}

#[derive(Default)]
struct Counts {
    allowed: AtomicU64,
    denied: AtomicU64,
    errors: AtomicU64,
}

fn build_policy(args: &Args) -> QuotaPolicy {
    let config = match args.algorithm {
        AlgorithmArg::FixedWindow => PolicyConfig::FixedWindow {
            limit: args.limit,
            window_ms: args.window_ms,
        },
        AlgorithmArg::SlidingWindowLog => PolicyConfig::SlidingWindowLog {
            limit: args.limit,
            window_ms: args.window_ms,
        },
        AlgorithmArg::SlidingWindowCounter => PolicyConfig::SlidingWindowCounter {
            limit: args.limit,
            window_ms: args.window_ms,
        },
        AlgorithmArg::TokenBucket => PolicyConfig::TokenBucket {
            capacity: args.limit,
            refill_per_second: args.rate_per_s,
        },
        AlgorithmArg::LeakingBucket => PolicyConfig::LeakingBucket {
            capacity: args.limit,
            leak_per_second: args.rate_per_s,
        },
    };

    QuotaPolicy::try_from(config).unwrap()
}

fn build_options(args: &Args) -> AdmissionControllerOptions {
    AdmissionControllerOptions {
        prefix: Some(KeyPrefix::try_from(args.prefix.clone()).unwrap()),
        store_timeout: Duration::from_millis(args.store_timeout_ms),
        ..Default::default()
    }
}

fn build_keys(args: &Args) -> Vec<ClientKey> {
    let n = match args.key_dist {
        KeyDist::Hot => 1,
        _ => args.key_space.max(1),
    };
    (0..n)
        .map(|i| ClientKey::try_from(format!("client_{i}")).unwrap())
        .collect()
}

fn pick_key<'a>(
    args: &Args,
    keys: &'a [ClientKey],
    rng: &mut impl FnMut() -> u64,
) -> &'a ClientKey {
    match args.key_dist {
        KeyDist::Hot => &keys[0],
        KeyDist::Uniform => &keys[(rng() as usize) % keys.len()],
        KeyDist::Skewed => {
            let r = (rng() % 10_000) as f64 / 10_000.0;
            if r < args.hot_fraction {
                &keys[0]
            } else {
                let idx = 1 + ((rng() as usize) % keys.len().saturating_sub(1).max(1));
                &keys[idx % keys.len()]
            }
        }
    }
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Upper bound on admissions for a single key over `elapsed`.
fn admission_ceiling(args: &Args, elapsed: Duration) -> u64 {
    let elapsed_ms = elapsed.as_millis() as u64;
    match args.algorithm {
        // two full windows may straddle any span
        AlgorithmArg::FixedWindow => (elapsed_ms / args.window_ms + 2) * args.limit,
        AlgorithmArg::SlidingWindowLog | AlgorithmArg::SlidingWindowCounter => {
            (elapsed_ms / args.window_ms + 1) * args.limit
        }
        AlgorithmArg::TokenBucket | AlgorithmArg::LeakingBucket => {
            args.limit + (elapsed.as_secs_f64() * args.rate_per_s).ceil() as u64
        }
    }
}

fn print_results(args: &Args, elapsed: Duration, hist: &Histogram<u64>, counts: &Counts) {
    let allowed = counts.allowed.load(Ordering::Relaxed);
    let denied = counts.denied.load(Ordering::Relaxed);
    let errors = counts.errors.load(Ordering::Relaxed);
    let ops = allowed + denied + errors;

    println!(
        "store={:?} algorithm={} mode={:?} key_dist={:?}",
        args.store,
        Algorithm::from(args.algorithm),
        args.mode,
        args.key_dist
    );
    println!(
        "concurrency={} duration_s={} limit={} window_ms={} rate_per_s={} key_space={}",
        args.concurrency,
        args.duration_s,
        args.limit,
        args.window_ms,
        args.rate_per_s,
        args.key_space
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64()
    );
    println!("allowed={allowed} denied={denied} errors={errors}");

    if matches!(args.key_dist, KeyDist::Hot) {
        let ceiling = admission_ceiling(args, elapsed);
        let verdict = if allowed <= ceiling { "ok" } else { "EXCEEDED" };
        println!("hot_key_ceiling={ceiling} {verdict}");
    }

    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

async fn run<S>(args: Args, controller: Arc<AdmissionController<S>>)
where
    S: QuotaStore + 'static,
{
    let keys = Arc::new(build_keys(&args));
    let policy = Arc::new(build_policy(&args));

    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());

    let started = Instant::now();
    let per_task_qps = args
        .target_qps
        .filter(|_| args.mode == Mode::TargetQps)
        .map(|qps| (qps / args.concurrency.max(1) as u64).max(1));

    let mut join = Vec::with_capacity(args.concurrency);
    for t in 0..args.concurrency {
        let controller = Arc::clone(&controller);
        let keys = Arc::clone(&keys);
        let policy = Arc::clone(&policy);
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let args = args.clone();

        join.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0x9E37_79B9_7F4A_7C15;
            let mut next_deadline = Instant::now();

            let mut rng_u64 = || {
                // xorshift64*
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while !stop.load(Ordering::Relaxed) {
                if let Some(qps) = per_task_qps {
                    let now = Instant::now();
                    if now < next_deadline {
                        tokio::time::sleep(next_deadline - now).await;
                    }
                    next_deadline += Duration::from_nanos(1_000_000_000 / qps);
                }

                i = i.wrapping_add(1);
                let client = pick_key(&args, &keys, &mut rng_u64);
                let t0 = should_sample(i, args.sample_every).then(Instant::now);

                let result = controller.decide(client, &policy, now_ms()).await;

                if let Some(t0) = t0 {
                    let us = t0.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }

                match result {
                    Ok(decision) if decision.allowed => {
                        counts.allowed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {
                        counts.denied.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        tracing::debug!(error = ?err, "stress.decide.error");
                        counts.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            hist
        }));
    }

    tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
    stop.store(true, Ordering::Relaxed);

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for handle in join {
        let hist = handle.await.unwrap();
        merged.add(&hist).unwrap();
    }

    print_results(&args, started.elapsed(), &merged, &counts);
}

#[cfg(feature = "redis-tokio")]
async fn run_redis(args: Args) {
    use quotagate::redis::RedisQuotaStoreOptions;

    let client = redis::Client::open(args.redis_url.as_str()).unwrap();
    let connection_manager = client.get_connection_manager().await.unwrap();

    let controller = Arc::new(AdmissionController::redis(
        RedisQuotaStoreOptions { connection_manager },
        build_options(&args),
    ));

    run(args, controller).await;
}

#[cfg(not(feature = "redis-tokio"))]
async fn run_redis(_args: Args) {
    eprintln!("--store redis needs the `redis-tokio` feature");
    std::process::exit(2);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.concurrency.clamp(2, 64))
        .build()
        .unwrap();

    rt.block_on(async move {
        match args.store {
            Store::Local => {
                let store = Arc::new(LocalQuotaStore::new());
                store.run_cleanup_loop(Duration::from_secs(1));

                let controller = Arc::new(AdmissionController::new(
                    Arc::clone(&store),
                    build_options(&args),
                ));
                run(args, controller).await;

                tracing::info!(entries = store.len(), "stress.local.done");
                store.stop_cleanup_loop();
            }
            Store::Redis => run_redis(args).await,
        }
    });
}
