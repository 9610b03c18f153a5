use crate::domain::feed::{
    CacheReader, FeedItem, FeedKey, FeedMetadata, FeedState, FeedStore, ItemId, StateOrigin,
};
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct CachedFeed {
    items: Vec<FeedItem>,
    metadata: FeedMetadata,
}

/// Feed cache kept in process memory; least recently used feeds are evicted
/// once `capacity` feeds are held.
pub struct MemoryFeedStore {
    feeds: Cache<FeedKey, Arc<CachedFeed>>,
}

impl MemoryFeedStore {
    pub fn new(capacity: u64) -> Self {
        Self {
            feeds: Cache::builder().max_capacity(capacity.max(1)).build(),
        }
    }

    async fn entry(&self, key: &FeedKey) -> CachedFeed {
        self.feeds
            .get(key)
            .await
            .map(|feed| feed.as_ref().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CacheReader for MemoryFeedStore {
    async fn read(&self, key: &FeedKey) -> FeedState {
        let feed = self.entry(key).await;
        FeedState::new(
            key.clone(),
            feed.items,
            feed.metadata.last_refreshed_at,
            StateOrigin::Cache,
        )
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn replace_items(
        &self,
        key: &FeedKey,
        items: &[FeedItem],
        refreshed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let feed = CachedFeed {
            items: items.to_vec(),
            metadata: FeedMetadata {
                last_refreshed_at: Some(refreshed_at),
                is_stale: false,
            },
        };
        self.feeds.insert(key.clone(), Arc::new(feed)).await;
        Ok(())
    }

    async fn metadata(&self, key: &FeedKey) -> AppResult<FeedMetadata> {
        Ok(self.entry(key).await.metadata)
    }

    async fn touch(&self, key: &FeedKey, refreshed_at: DateTime<Utc>) -> AppResult<()> {
        let mut feed = self.entry(key).await;
        feed.metadata.last_refreshed_at = Some(refreshed_at);
        feed.metadata.is_stale = false;
        self.feeds.insert(key.clone(), Arc::new(feed)).await;
        Ok(())
    }

    async fn mark_stale(&self, key: &FeedKey) -> AppResult<()> {
        let mut feed = self.entry(key).await;
        feed.metadata.is_stale = true;
        self.feeds.insert(key.clone(), Arc::new(feed)).await;
        Ok(())
    }

    async fn find_item(&self, id: ItemId) -> AppResult<Option<FeedItem>> {
        Ok(self
            .feeds
            .iter()
            .find_map(|(_, feed)| feed.items.iter().find(|item| item.id == id).cloned()))
    }

    async fn set_like(&self, id: ItemId, is_liked: bool, like_count: i64) -> AppResult<()> {
        let holding: Vec<(FeedKey, Arc<CachedFeed>)> = self
            .feeds
            .iter()
            .filter(|(_, feed)| feed.items.iter().any(|item| item.id == id))
            .map(|(key, feed)| (key.as_ref().clone(), feed))
            .collect();

        for (key, feed) in holding {
            let mut updated = feed.as_ref().clone();
            for item in updated.items.iter_mut().filter(|item| item.id == id) {
                *item = item.with_like(is_liked, like_count);
            }
            self.feeds.insert(key, Arc::new(updated)).await;
        }
        Ok(())
    }
}
