use std::collections::BTreeMap;
use std::fmt::Debug;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

/// A partial state: `None` until the source has produced anything.
pub type PartialState<T> = watch::Receiver<Option<Vec<T>>>;

/// Combines independently updating partial states into one ordered list.
///
/// Each source owns a priority slot. The output is the concatenation of every
/// present source in priority order; sources that never produced a value are
/// left out, so the merged list grows as sources arrive.
pub struct AggregatingStateMerger<P, T> {
    sources: BTreeMap<P, PartialState<T>>,
}

impl<P, T> AggregatingStateMerger<P, T>
where
    P: Ord + Copy + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
        }
    }

    /// Adds a source. A second source for the same priority replaces the first.
    pub fn source(mut self, priority: P, state: PartialState<T>) -> Self {
        if self.sources.insert(priority, state).is_some() {
            tracing::warn!(priority = ?priority, "Replacing merger source with the same priority");
        }
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Starts merging. Updates stop when the returned handle is dropped.
    pub fn spawn(self) -> MergedState<T> {
        let mut tasks = JoinSet::new();
        let (update_tx, mut updates) = mpsc::unbounded_channel::<(P, Option<Vec<T>>)>();

        for (priority, mut state) in self.sources {
            let update_tx = update_tx.clone();
            tasks.spawn(async move {
                loop {
                    let snapshot = state.borrow_and_update().clone();
                    if update_tx.send((priority, snapshot)).is_err() {
                        return;
                    }
                    if state.changed().await.is_err() {
                        return;
                    }
                }
            });
        }
        drop(update_tx);

        let (merged_tx, merged_rx) = watch::channel(Vec::new());
        tasks.spawn(async move {
            let mut latest: BTreeMap<P, Vec<T>> = BTreeMap::new();
            while let Some((priority, snapshot)) = updates.recv().await {
                match snapshot {
                    Some(items) => {
                        latest.insert(priority, items);
                    }
                    None => {
                        if latest.remove(&priority).is_none() {
                            continue;
                        }
                    }
                }
                merged_tx.send_replace(merge_snapshots(&latest));
            }
        });

        MergedState {
            state: merged_rx,
            _tasks: tasks,
        }
    }
}

impl<P, T> Default for AggregatingStateMerger<P, T>
where
    P: Ord + Copy + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenates the snapshots in priority order.
pub fn merge_snapshots<P: Ord, T: Clone>(snapshots: &BTreeMap<P, Vec<T>>) -> Vec<T> {
    snapshots.values().flatten().cloned().collect()
}

/// Live output of a merger.
pub struct MergedState<T> {
    state: watch::Receiver<Vec<T>>,
    _tasks: JoinSet<()>,
}

impl<T: Clone> MergedState<T> {
    pub fn current(&self) -> Vec<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.state.clone()
    }

    /// Waits for the next merged list. `None` once every source has ended.
    pub async fn changed(&mut self) -> Option<Vec<T>> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&[T]) -> bool) -> Option<Vec<T>> {
        loop {
            let current = self.state.borrow_and_update().clone();
            if predicate(&current) {
                return Some(current);
            }
            self.state.changed().await.ok()?;
        }
    }
}
