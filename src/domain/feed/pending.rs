use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::oneshot;

/// Waiters for in-flight requests, keyed by correlation key.
///
/// Completing a key fulfils every waiter registered under it exactly once and
/// forgets the key, so a later request starts a fresh round.
#[derive(Debug)]
pub struct PendingRequests<K, T> {
    waiters: HashMap<K, Vec<oneshot::Sender<T>>>,
}

impl<K: Eq + Hash, T: Clone> PendingRequests<K, T> {
    pub fn new() -> Self {
        Self {
            waiters: HashMap::new(),
        }
    }

    /// Registers a waiter. Returns `true` when it is the first one for `key`,
    /// meaning the caller has to start the underlying work.
    pub fn register(&mut self, key: K, waiter: oneshot::Sender<T>) -> bool {
        let entry = self.waiters.entry(key).or_default();
        entry.push(waiter);
        entry.len() == 1
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.waiters.contains_key(key)
    }

    /// Fulfils and removes all waiters of `key`. Returns how many were waiting.
    pub fn complete(&mut self, key: &K, value: T) -> usize {
        let Some(waiters) = self.waiters.remove(key) else {
            return 0;
        };

        let count = waiters.len();
        for waiter in waiters {
            // A waiter that gave up is not an error.
            let _ = waiter.send(value.clone());
        }
        count
    }

    /// Drops every waiter; their receivers observe cancellation.
    pub fn cancel_all(&mut self) {
        self.waiters.clear();
    }
}

impl<K: Eq + Hash, T: Clone> Default for PendingRequests<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
