//! Uniform entry point turning `(client, policy, now)` into a [`Decision`].

use std::{sync::Arc, time::Duration};

use crate::{
    ClientKey, Decision, KeyPrefix, QuotaGateError, QuotaStore, RouteTable,
    algorithms::QuotaPolicy,
    common::{QuotaKeyGenerator, duration_ms, now_ms},
    local::LocalQuotaStore,
    runtime,
};

/// Configuration for [`AdmissionController`].
#[derive(Clone, Debug)]
pub struct AdmissionControllerOptions {
    /// Namespace for store keys: `<prefix>:<client>:<algorithm>`.
    ///
    /// If `None`, defaults to `"quotagate"`.
    pub prefix: Option<KeyPrefix>,

    /// Upper bound on one store round trip. Exceeding it yields
    /// [`QuotaGateError::StoreUnavailable`].
    pub store_timeout: Duration,

    /// Policies used by [`AdmissionController::decide_route`].
    pub routes: RouteTable,
}

impl Default for AdmissionControllerOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            store_timeout: Duration::from_millis(500),
            routes: RouteTable::with_default_routes(),
        }
    }
}

/// Admission controller over a [`QuotaStore`].
///
/// Holds no counters of its own: every decision is one atomic round trip to
/// the store, so the controller can be shared freely (`Arc`) across tasks.
///
/// # Failure handling
///
/// Store failures and timeouts are returned as
/// [`QuotaGateError::StoreUnavailable`]. They are never turned into an allow
/// or a deny, and nothing is retried; the caller owns the fail-open or
/// fail-closed policy and any retry.
///
/// # Examples
///
/// ```no_run
/// use quotagate::{AdmissionController, AdmissionControllerOptions, ClientKey};
///
/// # async fn run() -> Result<(), quotagate::QuotaGateError> {
/// let controller = AdmissionController::local(AdmissionControllerOptions::default());
/// let client = ClientKey::try_from("198.51.100.23")?;
///
/// let decision = controller.decide_route_now("/token-bucket", &client).await?;
/// if !decision.allowed {
///     println!("retry in {}s", decision.retry_after_secs());
/// }
/// # Ok(())
/// # }
/// ```
pub struct AdmissionController<S> {
    store: S,
    key_generator: QuotaKeyGenerator,
    store_timeout: Duration,
    routes: RouteTable,
}

impl AdmissionController<Arc<LocalQuotaStore>> {
    /// Controller over a fresh in-process store.
    ///
    /// Expired entries are only dropped when their key is touched again. Start
    /// the cleanup loop through [`store`](Self::store) to reclaim idle clients:
    ///
    /// ```no_run
    /// # use std::time::Duration;
    /// # use quotagate::{AdmissionController, AdmissionControllerOptions};
    /// # async fn run() {
    /// let controller = AdmissionController::local(AdmissionControllerOptions::default());
    /// controller.store().run_cleanup_loop(Duration::from_secs(30));
    /// # }
    /// ```
    pub fn local(options: AdmissionControllerOptions) -> Self {
        Self::new(Arc::new(LocalQuotaStore::new()), options)
    }
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
impl AdmissionController<crate::redis::RedisQuotaStore> {
    /// Controller over a Redis store.
    pub fn redis(
        store_options: crate::redis::RedisQuotaStoreOptions,
        options: AdmissionControllerOptions,
    ) -> Self {
        Self::new(crate::redis::RedisQuotaStore::new(store_options), options)
    }
}

impl<S: QuotaStore> AdmissionController<S> {
    /// Create a controller over `store`.
    pub fn new(store: S, options: AdmissionControllerOptions) -> Self {
        let prefix = options.prefix.unwrap_or_else(KeyPrefix::default_prefix);

        Self {
            store,
            key_generator: QuotaKeyGenerator::new(prefix),
            store_timeout: options.store_timeout,
            routes: options.routes,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The configured routes.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decide whether `client` may proceed under `policy` at `now_ms`
    /// (unix milliseconds).
    pub async fn decide(
        &self,
        client: &ClientKey,
        policy: &QuotaPolicy,
        now_ms: u64,
    ) -> Result<Decision, QuotaGateError> {
        let algorithm = policy.algorithm();
        let key = self.key_generator.key(client, algorithm);

        let reply = match runtime::timeout(self.store_timeout, self.store.eval(&key, policy, now_ms))
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                tracing::warn!(error = ?err, %algorithm, key = %key, "quota.store.error");
                return Err(err);
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = duration_ms(self.store_timeout),
                    %algorithm,
                    key = %key,
                    "quota.store.timeout"
                );
                return Err(QuotaGateError::StoreUnavailable(format!(
                    "store did not answer within {:?}",
                    self.store_timeout
                )));
            }
        };

        let decision = policy.decision(&reply, now_ms);

        if !decision.allowed {
            tracing::debug!(
                %client,
                %algorithm,
                limit = decision.limit,
                retry_after_secs = decision.retry_after_secs(),
                "quota.denied"
            );
        }

        Ok(decision)
    } // end method decide

    /// [`decide`](Self::decide) at the current wall clock time.
    pub async fn decide_now(
        &self,
        client: &ClientKey,
        policy: &QuotaPolicy,
    ) -> Result<Decision, QuotaGateError> {
        self.decide(client, policy, now_ms()).await
    }

    /// Decide using the policy configured for `route`.
    ///
    /// Returns [`QuotaGateError::UnknownRoute`] when no policy is configured.
    pub async fn decide_route(
        &self,
        route: &str,
        client: &ClientKey,
        now_ms: u64,
    ) -> Result<Decision, QuotaGateError> {
        let Some(policy) = self.routes.policy(route) else {
            return Err(QuotaGateError::UnknownRoute(route.to_string()));
        };

        self.decide(client, policy, now_ms).await
    }

    /// [`decide_route`](Self::decide_route) at the current wall clock time.
    pub async fn decide_route_now(
        &self,
        route: &str,
        client: &ClientKey,
    ) -> Result<Decision, QuotaGateError> {
        self.decide_route(route, client, now_ms()).await
    }
}
