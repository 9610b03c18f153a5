use super::contracts::{FeedStore, RemoteFetcher};
use super::model::{FeedItem, FeedKey, RefreshMode, RefreshOutcome};
use super::remote::{PostsApi, PostsQuery};
use crate::domain::refresh::ConnectivityMonitor;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Fetches a page from the remote API, diffs it against the cache and writes
/// the result back, so repositories only ever read from the cache.
///
/// A feed never holds more than `page_size` items.
pub struct StoreBackedFetcher {
    api: Arc<dyn PostsApi>,
    store: Arc<dyn FeedStore>,
    page_size: u32,
    connectivity: Option<Arc<ConnectivityMonitor>>,
}

impl StoreBackedFetcher {
    pub fn new(api: Arc<dyn PostsApi>, store: Arc<dyn FeedStore>, page_size: u32) -> Self {
        Self {
            api,
            store,
            page_size: page_size.max(1),
            connectivity: None,
        }
    }

    /// Reports transport failures and successes to `connectivity`.
    pub fn with_connectivity(mut self, connectivity: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    fn query_for(&self, cached: &[FeedItem], mode: RefreshMode) -> PostsQuery {
        let after = match mode {
            RefreshMode::Background => cached.iter().map(|i| i.payload.published_at).max(),
            RefreshMode::ForcedUserRefresh => None,
        };
        PostsQuery {
            number: self.page_size,
            after,
        }
    }
}

#[async_trait]
impl RemoteFetcher for StoreBackedFetcher {
    async fn fetch(&self, key: &FeedKey, mode: RefreshMode) -> RefreshOutcome {
        let cached = self.store.read(key).await;
        let query = self.query_for(cached.items(), mode);

        let posts = match self.api.fetch_posts(key, &query).await {
            Ok(posts) => {
                if let Some(connectivity) = &self.connectivity {
                    connectivity.record_success();
                }
                posts
            }
            Err(e) => {
                tracing::warn!(feed = %key, mode = ?mode, error = %e, "Remote fetch failed");
                if e.is_unreachable() {
                    if let Some(connectivity) = &self.connectivity {
                        connectivity.record_failure();
                    }
                }
                if mode == RefreshMode::ForcedUserRefresh {
                    // Retry on the next routine check even if the feed is not due yet.
                    if let Err(e) = self.store.mark_stale(key).await {
                        tracing::error!(feed = %key, error = %e, "Failed to mark feed stale");
                    }
                }
                return RefreshOutcome::Failed(e.to_string());
            }
        };

        let fetched: Vec<FeedItem> = posts
            .into_iter()
            .enumerate()
            .map(|(i, post)| post.into_item(i as i64))
            .collect();
        let mut merged = match mode {
            RefreshMode::Background => merge_newer(fetched, cached.items()),
            RefreshMode::ForcedUserRefresh => reposition(fetched),
        };
        merged.truncate(self.page_size as usize);

        let outcome = diff(cached.items(), &merged);
        let now = Utc::now();
        let written = match outcome {
            RefreshOutcome::Unchanged => self.store.touch(key, now).await,
            _ => self.store.replace_items(key, &merged, now).await,
        };

        if let Err(e) = written {
            tracing::error!(feed = %key, error = %e, "Failed to write fetched posts to cache");
            return RefreshOutcome::Failed(format!("cache write failed: {}", e));
        }

        tracing::info!(
            feed = %key,
            mode = ?mode,
            fetched = merged.len(),
            outcome = ?outcome,
            "Remote fetch completed"
        );
        outcome
    }
}

/// Newer posts go in front; cached posts they replace are dropped.
fn merge_newer(newer: Vec<FeedItem>, cached: &[FeedItem]) -> Vec<FeedItem> {
    let fresh_ids: HashSet<_> = newer.iter().map(|i| i.id).collect();
    let merged = newer
        .into_iter()
        .chain(cached.iter().filter(|i| !fresh_ids.contains(&i.id)).cloned())
        .collect();
    reposition(merged)
}

fn reposition(items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.id))
        .enumerate()
        .map(|(position, mut item)| {
            item.position = position as i64;
            item
        })
        .collect()
}

fn diff(cached: &[FeedItem], fetched: &[FeedItem]) -> RefreshOutcome {
    let before: HashMap<_, _> = cached.iter().map(|i| (i.id, i)).collect();

    let new_items = fetched.iter().filter(|i| !before.contains_key(&i.id)).count();
    if new_items > 0 {
        return RefreshOutcome::NewItems(new_items);
    }

    let fetched_ids: HashSet<_> = fetched.iter().map(|i| i.id).collect();
    let removed = cached.iter().filter(|i| !fetched_ids.contains(&i.id)).count();
    let changed = fetched
        .iter()
        .filter(|i| before.get(&i.id).is_some_and(|old| *old != *i))
        .count();

    match changed + removed {
        0 => RefreshOutcome::Unchanged,
        n => RefreshOutcome::ChangedItems(n),
    }
}
