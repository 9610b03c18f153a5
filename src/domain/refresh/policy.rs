use crate::domain::feed::{FeedKey, FeedStore, RefreshPolicy};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

pub const DEFAULT_MAX_AGE_MINUTES: i64 = 60;

/// Reports whether the network is reachable.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 60;

#[derive(Debug, Default)]
struct Reachability {
    consecutive_failures: u32,
    offline_until: Option<Instant>,
}

/// Connectivity inferred from remote calls: after `threshold` consecutive
/// transport failures the API counts as offline for `retry_after`, then one
/// attempt is let through again. Any success brings it back online.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    threshold: u32,
    retry_after: StdDuration,
    state: Mutex<Reachability>,
}

impl ConnectivityMonitor {
    pub fn new(threshold: u32, retry_after: StdDuration) -> Self {
        Self {
            threshold: threshold.max(1),
            retry_after,
            state: Mutex::new(Reachability::default()),
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.offline_until.take().is_some() {
            tracing::info!("Remote API reachable again");
        }
        state.consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.threshold {
            if state.offline_until.is_none() {
                tracing::warn!(
                    failures = state.consecutive_failures,
                    retry_after_secs = self.retry_after.as_secs(),
                    "Remote API unreachable, pausing background refreshes"
                );
            }
            state.offline_until = Some(Instant::now() + self.retry_after);
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(
            DEFAULT_FAILURE_THRESHOLD,
            StdDuration::from_secs(DEFAULT_RETRY_AFTER_SECONDS),
        )
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        match self.state.lock().offline_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }
}

/// Refreshes feeds that are marked stale, were never refreshed, or whose last
/// successful refresh is older than `max_age`. Never refreshes while offline.
pub struct StalenessPolicy {
    store: Arc<dyn FeedStore>,
    connectivity: Arc<dyn Connectivity>,
    max_age: Duration,
}

impl StalenessPolicy {
    pub fn new(
        store: Arc<dyn FeedStore>,
        connectivity: Arc<dyn Connectivity>,
        max_age: Duration,
    ) -> Self {
        Self {
            store,
            connectivity,
            max_age,
        }
    }
}

#[async_trait]
impl RefreshPolicy for StalenessPolicy {
    async fn should_refresh(&self, key: &FeedKey) -> bool {
        if !self.connectivity.is_online() {
            return false;
        }

        let metadata = match self.store.metadata(key).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(feed = %key, error = %e, "Could not read feed metadata, refreshing");
                return true;
            }
        };

        if metadata.is_stale {
            return true;
        }
        match metadata.last_refreshed_at {
            Some(at) => Utc::now() - at >= self.max_age,
            None => true,
        }
    }
}
