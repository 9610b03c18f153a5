use crate::domain::feed::{FeedKey, OutcomeBus, RefreshMode, RefreshOutcome, RefreshPolicy, RemoteFetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Periodically refreshes a fixed set of feeds outside of any repository and
/// announces the outcomes on the [`OutcomeBus`].
///
/// `fetcher` has to be the same [`FetchCoordinator`](crate::domain::feed::FetchCoordinator)
/// the repositories use, so a tick never races a repository's own fetch.
pub struct BackgroundRefresher {
    keys: Vec<FeedKey>,
    policy: Arc<dyn RefreshPolicy>,
    fetcher: Arc<dyn RemoteFetcher>,
    outcomes: Arc<OutcomeBus>,
    interval: Duration,
}

/// Running refresher loop. Dropping it without [`shutdown`](Self::shutdown)
/// leaves the loop running.
pub struct RefresherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Background refresher ended abnormally");
        }
    }
}

impl BackgroundRefresher {
    pub fn new(
        keys: Vec<FeedKey>,
        policy: Arc<dyn RefreshPolicy>,
        fetcher: Arc<dyn RemoteFetcher>,
        outcomes: Arc<OutcomeBus>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            keys,
            policy,
            fetcher,
            outcomes,
            interval,
        })
    }

    /// Fetches `key` and publishes the outcome to the feed's listeners.
    pub async fn request(&self, key: FeedKey, mode: RefreshMode) -> RefreshOutcome {
        let outcome = self.fetcher.fetch(&key, mode).await;
        self.outcomes.publish(&key, outcome.clone());
        outcome
    }

    /// One pass over every configured feed the policy considers due.
    /// Returns how many feeds were fetched.
    pub async fn run_once(self: &Arc<Self>) -> usize {
        let mut fetches = JoinSet::new();
        for key in &self.keys {
            if !self.policy.should_refresh(key).await {
                continue;
            }
            let this = self.clone();
            let key = key.clone();
            fetches.spawn(async move { this.request(key, RefreshMode::Background).await });
        }

        let mut fetched = 0;
        while let Some(result) = fetches.join_next().await {
            match result {
                Ok(RefreshOutcome::Failed(reason)) => {
                    tracing::warn!(reason = %reason, "Background refresh failed");
                    fetched += 1;
                }
                Ok(_) => fetched += 1,
                Err(e) => tracing::error!(error = %e, "Background refresh task panicked"),
            }
        }
        fetched
    }

    pub fn spawn(self: Arc<Self>) -> RefresherHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Activation loads cover startup; the first pass runs one interval in.
            ticker.tick().await;
            tracing::info!(
                feeds = self.keys.len(),
                interval_secs = self.interval.as_secs(),
                "Background refresher started"
            );

            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        let fetched = self.run_once().await;
                        tracing::debug!(fetched, "Background refresh pass finished");
                    }
                }
            }
            tracing::info!("Background refresher stopped");
        });

        RefresherHandle { shutdown, task }
    }
}
