use super::model::{FeedKey, RefreshOutcome};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Handle returned by [`OutcomeBus::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

/// Push-based notifications of finished fetches, keyed by feed.
///
/// Fetches started outside a repository (for example by the background
/// refresher) report here so every repository showing that feed can react.
#[derive(Debug, Default)]
pub struct OutcomeBus {
    listeners: Mutex<HashMap<FeedKey, HashMap<ListenerId, mpsc::UnboundedSender<RefreshOutcome>>>>,
}

impl OutcomeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: &FeedKey) -> (ListenerId, mpsc::UnboundedReceiver<RefreshOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ListenerId(Uuid::new_v4());
        self.listeners
            .lock()
            .entry(key.clone())
            .or_default()
            .insert(id, tx);

        tracing::debug!(feed = %key, "Outcome listener registered");
        (id, rx)
    }

    pub fn unregister(&self, key: &FeedKey, id: ListenerId) {
        let mut listeners = self.listeners.lock();
        if let Some(for_key) = listeners.get_mut(key) {
            for_key.remove(&id);
            if for_key.is_empty() {
                listeners.remove(key);
            }
        }
    }

    /// Delivers `outcome` to every live listener of `key`. Returns the number reached.
    pub fn publish(&self, key: &FeedKey, outcome: RefreshOutcome) -> usize {
        let mut listeners = self.listeners.lock();
        let Some(for_key) = listeners.get_mut(key) else {
            return 0;
        };

        for_key.retain(|_, tx| tx.send(outcome.clone()).is_ok());
        let delivered = for_key.len();
        if for_key.is_empty() {
            listeners.remove(key);
        }

        tracing::debug!(feed = %key, outcome = ?outcome, delivered, "Outcome published");
        delivered
    }

    pub fn listener_count(&self, key: &FeedKey) -> usize {
        self.listeners.lock().get(key).map_or(0, HashMap::len)
    }
}
