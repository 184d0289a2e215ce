use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    QuotaGateError, QuotaStore,
    algorithms::{QuotaPolicy, QuotaState, ScriptReply},
    common::now_ms,
    runtime,
};

#[derive(Clone, Debug)]
struct StoredQuota {
    state: QuotaState,
    expires_at_ms: u64,
}

/// Quota store kept in process memory.
///
/// Every call takes an explicit `now_ms`, which makes the store deterministic
/// under test. Expired entries are treated as absent and removed lazily.
#[derive(Debug, Default)]
pub struct LocalQuotaStore {
    entries: DashMap<String, StoredQuota>,
    cleanup_running: AtomicBool,
    cleanup_generation: AtomicU64,
}

impl LocalQuotaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the live state for `key`, `None` when absent or expired.
    pub fn get(&self, key: &str, now_ms: u64) -> Option<QuotaState> {
        self.entries
            .get(key)
            .filter(|stored| now_ms < stored.expires_at_ms)
            .map(|stored| stored.state.clone())
    }

    /// Run one transition for `key`.
    ///
    /// The entry guard is held from the read to the write, so concurrent calls
    /// for the same key are serialised.
    pub fn apply(&self, key: &str, policy: &QuotaPolicy, now_ms: u64) -> ScriptReply {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get();
                let previous = (now_ms < stored.expires_at_ms).then(|| stored.state.clone());
                let transition = policy.apply(previous, now_ms);

                occupied.insert(StoredQuota {
                    state: transition.state,
                    expires_at_ms: now_ms.saturating_add(transition.ttl_ms),
                });

                transition.reply
            }
            Entry::Vacant(vacant) => {
                let transition = policy.apply(None, now_ms);

                vacant.insert(StoredQuota {
                    state: transition.state,
                    expires_at_ms: now_ms.saturating_add(transition.ttl_ms),
                });

                transition.reply
            }
        }
    } // end method apply

    /// Remove every entry expired at `now_ms`. Returns how many were removed.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, stored| now_ms < stored.expires_at_ms);
        before.saturating_sub(self.entries.len())
    } // end method purge_expired

    /// Start a background task purging expired entries every `interval`,
    /// using the wall clock.
    ///
    /// Idempotent while a loop is running. The task holds a weak reference and
    /// exits once the store is dropped or [`stop_cleanup_loop`] is called.
    /// Must be called from within the async runtime selected by the crate
    /// features.
    ///
    /// [`stop_cleanup_loop`]: LocalQuotaStore::stop_cleanup_loop
    pub fn run_cleanup_loop(self: &Arc<Self>, interval: Duration) {
        if self.cleanup_running.swap(true, Ordering::AcqRel) {
            return;
        }

        let generation = self.cleanup_generation.load(Ordering::Acquire);
        let store: Weak<Self> = Arc::downgrade(self);

        runtime::spawn_task(async move {
            let mut interval = runtime::new_interval(interval);

            loop {
                runtime::tick(&mut interval).await;

                let Some(store) = store.upgrade() else {
                    break;
                };

                if !store.cleanup_running.load(Ordering::Acquire)
                    || store.cleanup_generation.load(Ordering::Acquire) != generation
                {
                    break;
                }

                let purged = store.purge_expired(now_ms());
                if purged > 0 {
                    tracing::trace!(purged, remaining = store.len(), "quota.local.cleanup");
                }
            }
        });
    } // end method run_cleanup_loop

    /// Stop the background cleanup loop. Idempotent.
    pub fn stop_cleanup_loop(&self) {
        if self.cleanup_running.swap(false, Ordering::AcqRel) {
            self.cleanup_generation.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl QuotaStore for LocalQuotaStore {
    async fn eval(
        &self,
        key: &str,
        policy: &QuotaPolicy,
        now_ms: u64,
    ) -> Result<ScriptReply, QuotaGateError> {
        Ok(self.apply(key, policy, now_ms))
    }
}
