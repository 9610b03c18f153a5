use super::contracts::RemoteFetcher;
use super::model::{FeedKey, RefreshMode, RefreshOutcome};
use super::pending::PendingRequests;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

type Slot = (FeedKey, RefreshMode);

/// Single entry point for every fetch of every feed.
///
/// Fetches of one feed never overlap: each one reads the cache it is about to
/// overwrite, so a second writer would erase the first one's result.
/// - A background request joins whatever fetch of the feed is in flight.
/// - A forced request joins an in-flight forced fetch, otherwise it runs
///   after the current background fetch has been written.
///
/// Fetches run on their own task, so a caller giving up does not cancel the
/// fetch for the others waiting on it.
pub struct FetchCoordinator {
    inner: Arc<dyn RemoteFetcher>,
    pending: Arc<Mutex<PendingRequests<Slot, RefreshOutcome>>>,
    writers: Mutex<HashMap<FeedKey, Arc<AsyncMutex<()>>>>,
}

impl FetchCoordinator {
    pub fn new(inner: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            inner,
            pending: Arc::new(Mutex::new(PendingRequests::new())),
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_fetching(&self, key: &FeedKey) -> bool {
        let pending = self.pending.lock();
        [RefreshMode::Background, RefreshMode::ForcedUserRefresh]
            .into_iter()
            .any(|mode| pending.is_pending(&(key.clone(), mode)))
    }

    fn writer(&self, key: &FeedKey) -> Arc<AsyncMutex<()>> {
        self.writers.lock().entry(key.clone()).or_default().clone()
    }

    /// Registers `waiter` on a joinable fetch, or on a new one for `mode`.
    /// Returns the slot the caller has to start, if any.
    fn register(
        &self,
        key: &FeedKey,
        mode: RefreshMode,
        waiter: oneshot::Sender<RefreshOutcome>,
    ) -> Option<Slot> {
        let joinable: &[RefreshMode] = match mode {
            RefreshMode::ForcedUserRefresh => &[RefreshMode::ForcedUserRefresh],
            RefreshMode::Background => &[RefreshMode::ForcedUserRefresh, RefreshMode::Background],
        };

        let mut pending = self.pending.lock();
        if let Some(joined) = joinable
            .iter()
            .map(|m| (key.clone(), *m))
            .find(|slot| pending.is_pending(slot))
        {
            tracing::debug!(feed = %key, mode = ?mode, joined = ?joined.1, "Joining in-flight fetch");
            pending.register(joined, waiter);
            return None;
        }

        let slot = (key.clone(), mode);
        pending.register(slot.clone(), waiter);
        Some(slot)
    }
}

/// Completes the slot with a failure unless a real outcome was delivered.
struct CompleteOnDrop {
    pending: Arc<Mutex<PendingRequests<Slot, RefreshOutcome>>>,
    slot: Slot,
    outcome: Option<RefreshOutcome>,
}

impl Drop for CompleteOnDrop {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| RefreshOutcome::Failed("refresh interrupted".to_string()));
        self.pending.lock().complete(&self.slot, outcome);
    }
}

#[async_trait]
impl RemoteFetcher for FetchCoordinator {
    async fn fetch(&self, key: &FeedKey, mode: RefreshMode) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        if let Some(slot) = self.register(key, mode, tx) {
            let inner = self.inner.clone();
            let writer = self.writer(key);
            let completion = CompleteOnDrop {
                pending: self.pending.clone(),
                slot,
                outcome: None,
            };
            tokio::spawn(async move {
                let mut completion = completion;
                let _writing = writer.lock().await;
                let (key, mode) = completion.slot.clone();
                completion.outcome = Some(inner.fetch(&key, mode).await);
            });
        }

        rx.await
            .unwrap_or_else(|_| RefreshOutcome::Failed("refresh cancelled".to_string()))
    }
}
